// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config-file watcher driving hot reload.
//!
//! Watches the directory containing the config file, not the file itself,
//! so atomic renames (editor saves) keep being observed. Events are
//! filtered to the target path, gated on a strictly-later modification
//! time, and debounced before the reload runs.

use crate::manager::Manager;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Debounce window between a file event and the reload.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Handle keeping the watcher alive; dropping it or calling `stop`
/// terminates the watch task.
pub struct ConfigWatcher {
    token: CancellationToken,
}

impl ConfigWatcher {
    /// Watch `config_path` and call `manager.reload_config()` on changes.
    pub fn spawn(
        manager: Arc<Manager>,
        config_path: PathBuf,
    ) -> Result<ConfigWatcher, notify::Error> {
        let (tx, rx) = mpsc::channel::<()>(8);

        let target = config_path.clone();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if event.paths.iter().any(|p| p == &target) {
                            // Runs on the notify thread; the channel bridges
                            // into the async reload task.
                            let _ = tx.blocking_send(());
                        }
                    }
                    Err(e) => warn!(error = %e, "config watch error"),
                }
            })?;

        let dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let token = CancellationToken::new();
        tokio::spawn(watch_loop(
            manager,
            config_path,
            rx,
            watcher,
            token.clone(),
        ));

        Ok(ConfigWatcher { token })
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn watch_loop(
    manager: Arc<Manager>,
    config_path: PathBuf,
    mut rx: mpsc::Receiver<()>,
    _watcher: RecommendedWatcher,
    token: CancellationToken,
) {
    let mut last_mtime = mtime(&config_path);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = rx.recv() => {
                if changed.is_none() {
                    break;
                }

                // Debounce, then swallow the burst an editor save produces.
                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                // Require a strictly later mtime so our own rewrites and
                // duplicate events do not re-trigger the reload.
                let now = mtime(&config_path);
                match (now, last_mtime) {
                    (Some(now), Some(prev)) if now <= prev => {
                        debug!("config event without newer mtime, skipping");
                        continue;
                    }
                    (None, _) => {
                        debug!("config file unreadable, skipping reload");
                        continue;
                    }
                    _ => {}
                }
                last_mtime = now;

                match manager.reload_config().await {
                    Ok(summary) => debug!(?summary, "config reloaded"),
                    Err(e) => warn!(error = %e, "config reload failed; topology preserved"),
                }
            }
        }
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
#[path = "config_watch_tests.rs"]
mod tests;
