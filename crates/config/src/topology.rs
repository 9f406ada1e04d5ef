// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loading and validating the `agents:` declaration file.

use herd_core::AgentDeclaration;
use indexmap::IndexMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("agent name must not be empty")]
    EmptyName,

    #[error("duplicate agent name: {0}")]
    DuplicateName(String),
}

/// Raw file shape: a top-level `agents:` list.
#[derive(Debug, Deserialize)]
struct TopologyFile {
    #[serde(default)]
    agents: Vec<AgentDeclaration>,
}

/// A parsed topology: declarations keyed by name, declared order preserved.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Directory of the config file; relative process roots resolve here.
    pub config_dir: PathBuf,
    agents: IndexMap<String, AgentDeclaration>,
    hash: String,
}

impl Topology {
    /// An empty topology rooted at `config_dir`, for daemons started
    /// before their config file exists.
    pub fn empty(config_dir: PathBuf) -> Topology {
        Topology {
            config_dir,
            ..Topology::default()
        }
    }

    /// Load and validate the declaration file at `path`.
    pub fn load(path: &Path) -> Result<Topology, TopologyError> {
        let content = std::fs::read_to_string(path).map_err(|source| TopologyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&content, config_dir, path)
    }

    /// Parse config content. `path` is only used in error messages.
    pub fn parse(
        content: &str,
        config_dir: PathBuf,
        path: &Path,
    ) -> Result<Topology, TopologyError> {
        let file: TopologyFile =
            serde_yaml::from_str(content).map_err(|source| TopologyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut agents = IndexMap::with_capacity(file.agents.len());
        for mut decl in file.agents {
            decl.name = decl.name.trim().to_string();
            if decl.name.is_empty() {
                return Err(TopologyError::EmptyName);
            }
            if agents.contains_key(&decl.name) {
                return Err(TopologyError::DuplicateName(decl.name));
            }
            agents.insert(decl.name.clone(), decl);
        }

        let hash = format!("{:x}", Sha256::digest(content.as_bytes()));

        Ok(Topology {
            config_dir,
            agents,
            hash,
        })
    }

    /// Declarations in declared order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentDeclaration> {
        self.agents.values()
    }

    pub fn get(&self, name: &str) -> Option<&AgentDeclaration> {
        self.agents.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Content hash of the file this topology was parsed from. Identical
    /// content means a reload is a no-op.
    pub fn content_hash(&self) -> &str {
        &self.hash
    }

    /// Resolve an agent's working directory: absolute process roots pass
    /// through, relative ones resolve against the config dir, and an
    /// absent root falls back to the config dir itself.
    pub fn resolve_process_root(&self, decl: &AgentDeclaration) -> PathBuf {
        match &decl.process_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => self.config_dir.join(root),
            None => self.config_dir.clone(),
        }
    }
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
