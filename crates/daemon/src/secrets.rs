// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret routing. The daemon core does not interpret secrets; it routes
//! reads and writes to an opaque backend behind [`SecretBackend`]. The
//! default backend is a 0600 JSON file under the state directory.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret already exists: {0}")]
    AlreadyExists(String),

    #[error("secret backend error: {0}")]
    Backend(String),
}

/// Write mode for `SetSecret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretMode {
    /// Fail if the name already exists.
    Create,
    /// Fail if the name does not exist.
    Update,
    #[default]
    Upsert,
}

/// Opaque secret storage the daemon routes to.
#[async_trait]
pub trait SecretBackend: Send + Sync + 'static {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError>;
    async fn set(&self, name: &str, value: &str, mode: SecretMode) -> Result<(), SecretError>;
    async fn delete(&self, name: &str) -> Result<(), SecretError>;
    /// Registered secret names (never values).
    async fn list(&self) -> Result<Vec<String>, SecretError>;
}

/// File-backed default backend. Keyring integration is a peripheral
/// concern; this keeps the routing contract testable.
pub struct FileSecretBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileSecretBackend {
    pub fn open(path: impl Into<PathBuf>) -> FileSecretBackend {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt secrets file, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        FileSecretBackend {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn persist(&self) -> Result<(), SecretError> {
        let snapshot = self.entries.lock().clone();
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| SecretError::Backend(e.to_string()))?;
        write_private(&self.path, &bytes).map_err(|e| SecretError::Backend(e.to_string()))
    }
}

#[async_trait]
impl SecretBackend for FileSecretBackend {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.entries.lock().get(name).cloned())
    }

    async fn set(&self, name: &str, value: &str, mode: SecretMode) -> Result<(), SecretError> {
        {
            let mut entries = self.entries.lock();
            let exists = entries.contains_key(name);
            match mode {
                SecretMode::Create if exists => {
                    return Err(SecretError::AlreadyExists(name.to_string()));
                }
                SecretMode::Update if !exists => {
                    return Err(SecretError::NotFound(name.to_string()));
                }
                _ => {}
            }
            entries.insert(name.to_string(), value.to_string());
        }
        self.persist()
    }

    async fn delete(&self, name: &str) -> Result<(), SecretError> {
        let removed = self.entries.lock().remove(name);
        if removed.is_none() {
            return Err(SecretError::NotFound(name.to_string()));
        }
        self.persist()
    }

    async fn list(&self) -> Result<Vec<String>, SecretError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// Write with owner-only permissions: temp file + rename, mode 0600.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
