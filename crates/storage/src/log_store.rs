// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent capped log files under `logs/<name>.log`.
//!
//! Each appended line is prefixed with a local-time timestamp. At most
//! [`MAX_LOG_LINES`] lines are retained per agent: appends go straight to
//! the file, and once the on-disk line count passes the cap an async
//! trimmer rewrites the file atomically with the newest lines.

use crate::util::write_atomic;
use chrono::Local;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Retention cap per agent.
pub const MAX_LOG_LINES: usize = 10_000;

struct AgentLog {
    /// Newest lines, bounded at [`MAX_LOG_LINES`]; serves reads without
    /// touching disk.
    lines: VecDeque<String>,
    /// Line count of the on-disk file, which may run ahead of the cap
    /// between trims.
    file_lines: usize,
    /// A trim is in flight; don't schedule another.
    trimming: bool,
}

/// Append-mostly log store with bounded retention.
pub struct LogStore {
    dir: PathBuf,
    agents: Arc<Mutex<HashMap<String, AgentLog>>>,
    cap: usize,
}

impl LogStore {
    pub fn open(dir: impl Into<PathBuf>) -> LogStore {
        LogStore {
            dir: dir.into(),
            agents: Arc::new(Mutex::new(HashMap::new())),
            cap: MAX_LOG_LINES,
        }
    }

    /// Store with a smaller cap, for tests.
    pub fn with_cap(dir: impl Into<PathBuf>, cap: usize) -> LogStore {
        LogStore {
            dir: dir.into(),
            agents: Arc::new(Mutex::new(HashMap::new())),
            cap,
        }
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.log"))
    }

    /// Append one line for `name`, timestamp-prefixed.
    pub fn append(&self, name: &str, line: &str) {
        let stamped = format!("{} {}", Local::now().format("%Y-%m-%d %H:%M:%S"), line);
        let path = self.log_path(name);

        let needs_trim = {
            let mut agents = self.agents.lock();
            let log = self.loaded_entry(&mut agents, name);

            log.lines.push_back(stamped.clone());
            while log.lines.len() > self.cap {
                log.lines.pop_front();
            }
            log.file_lines += 1;

            let over = log.file_lines > self.cap && !log.trimming;
            if over {
                log.trimming = true;
            }
            over
        };

        if let Err(e) = append_line(&path, &stamped) {
            warn!(agent = name, error = %e, "failed to append log line");
        }

        if needs_trim {
            self.spawn_trim(name.to_string(), path);
        }
    }

    /// Most recent `max_lines` lines for `name` (0 = all retained).
    pub fn logs(&self, name: &str, max_lines: usize) -> Vec<String> {
        let mut agents = self.agents.lock();
        let log = self.loaded_entry(&mut agents, name);
        let lines = &log.lines;
        let skip = if max_lines == 0 || max_lines >= lines.len() {
            0
        } else {
            lines.len() - max_lines
        };
        lines.iter().skip(skip).cloned().collect()
    }

    /// Drop an agent's retained lines and its file.
    pub fn delete(&self, name: &str) {
        self.agents.lock().remove(name);
        let path = self.log_path(name);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(agent = name, error = %e, "failed to remove log file");
            }
        }
    }

    /// Load the on-disk tail the first time an agent is touched.
    fn loaded_entry<'a>(
        &self,
        agents: &'a mut HashMap<String, AgentLog>,
        name: &str,
    ) -> &'a mut AgentLog {
        agents.entry(name.to_string()).or_insert_with(|| {
            let (lines, file_lines) = read_tail(&self.log_path(name), self.cap);
            AgentLog {
                lines,
                file_lines,
                trimming: false,
            }
        })
    }

    fn spawn_trim(&self, name: String, path: PathBuf) {
        let agents = Arc::clone(&self.agents);
        std::thread::spawn(move || {
            let snapshot: Vec<String> = {
                let agents = agents.lock();
                match agents.get(&name) {
                    Some(log) => log.lines.iter().cloned().collect(),
                    None => return,
                }
            };

            let mut content = snapshot.join("\n");
            if !content.is_empty() {
                content.push('\n');
            }
            if let Err(e) = write_atomic(&path, content.as_bytes()) {
                warn!(agent = %name, error = %e, "log trim failed");
            }

            let mut agents = agents.lock();
            if let Some(log) = agents.get_mut(&name) {
                // Appends that raced the rewrite stay in memory but may be
                // missing from the file until the next trim.
                log.file_lines = log.lines.len();
                log.trimming = false;
            }
        });
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}

fn read_tail(path: &Path, cap: usize) -> (VecDeque<String>, usize) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return (VecDeque::new(), 0),
    };
    let all: Vec<&str> = content.lines().collect();
    let total = all.len();
    let tail = all
        .iter()
        .skip(total.saturating_sub(cap))
        .map(|s| s.to_string())
        .collect();
    (tail, total)
}

#[cfg(test)]
#[path = "log_store_tests.rs"]
mod tests;
