// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent counters and the resume flag, backed by a single JSON
//! document (`agent_data.json`).
//!
//! Saves are asynchronous and best-effort: losing the most recent counter
//! update is acceptable, losing the document structure is not. The file is
//! only ever replaced atomically with a successfully marshalled document.

use crate::util::write_atomic;
use chrono::Utc;
use herd_core::PersistentAgentRecord;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// Store for persistent per-agent records.
pub struct AgentDataStore {
    path: PathBuf,
    records: Mutex<HashMap<String, PersistentAgentRecord>>,
    /// Monotonic start instants for currently-running agents, for live
    /// runtime accrual.
    live: Mutex<HashMap<String, Instant>>,
}

impl AgentDataStore {
    /// Open the store, loading any existing document. A corrupt document
    /// is logged and replaced by an empty one on the next save.
    pub fn open(path: impl Into<PathBuf>) -> AgentDataStore {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt agent data, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        AgentDataStore {
            path,
            records: Mutex::new(records),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Record a transition into `Running`.
    pub fn record_start(&self, name: &str) {
        {
            let mut records = self.records.lock();
            let rec = entry(&mut records, name);
            rec.last_started = Some(Utc::now());
            rec.was_running = true;
        }
        self.live.lock().insert(name.to_string(), Instant::now());
        self.save_async();
    }

    /// Record a graceful stop; clears the resume flag.
    pub fn record_stop(&self, name: &str) {
        self.finish(name, false, true);
    }

    /// Record a stop that keeps the resume flag, so the next daemon
    /// generation restarts this agent.
    pub fn record_stop_preserving(&self, name: &str) {
        self.finish(name, false, false);
    }

    /// Record a crash: runtime accrues and the crash counter increments.
    pub fn record_crash(&self, name: &str) {
        self.finish(name, true, false);
    }

    fn finish(&self, name: &str, crashed: bool, clear_was_running: bool) {
        let elapsed = self
            .live
            .lock()
            .remove(name)
            .map(|started| started.elapsed().as_secs());
        {
            let mut records = self.records.lock();
            let rec = entry(&mut records, name);
            rec.last_stopped = Some(Utc::now());
            if let Some(secs) = elapsed {
                rec.total_runtime_seconds += secs;
            }
            if crashed {
                rec.crash_count += 1;
            }
            if clear_was_running {
                rec.was_running = false;
            }
        }
        self.save_async();
    }

    /// Record a supervisor-initiated restart.
    pub fn record_restart(&self, name: &str) {
        {
            let mut records = self.records.lock();
            entry(&mut records, name).restart_count += 1;
        }
        self.save_async();
    }

    /// Set or clear the resume flag directly.
    pub fn record_running(&self, name: &str, running: bool) {
        {
            let mut records = self.records.lock();
            entry(&mut records, name).was_running = running;
        }
        self.save_async();
    }

    /// Capture the running set for resume-on-next-start: clears every
    /// resume flag, then sets the listed ones.
    pub fn snapshot_running_agents(&self, names: &[String]) {
        {
            let mut records = self.records.lock();
            for rec in records.values_mut() {
                rec.was_running = false;
            }
            for name in names {
                entry(&mut records, name).was_running = true;
            }
        }
        self.save_async();
    }

    pub fn agent_data(&self, name: &str) -> Option<PersistentAgentRecord> {
        self.records.lock().get(name).cloned()
    }

    /// Names flagged as running by the previous daemon generation.
    pub fn previously_running_agents(&self) -> Vec<String> {
        let records = self.records.lock();
        records
            .values()
            .filter(|r| r.was_running)
            .map(|r| r.name.clone())
            .collect()
    }

    /// Accrued runtime including the live delta for a currently-running
    /// agent.
    pub fn total_runtime(&self, name: &str) -> u64 {
        let base = self
            .records
            .lock()
            .get(name)
            .map(|r| r.total_runtime_seconds)
            .unwrap_or(0);
        let live = self
            .live
            .lock()
            .get(name)
            .map(|started| started.elapsed().as_secs())
            .unwrap_or(0);
        base + live
    }

    pub fn delete_agent_data(&self, name: &str) {
        self.records.lock().remove(name);
        self.live.lock().remove(name);
        self.save_async();
    }

    /// Flush the current document synchronously (used at shutdown).
    pub fn save(&self) {
        let snapshot = self.records.lock().clone();
        write_document(&self.path, &snapshot);
    }

    fn save_async(&self) {
        let snapshot = self.records.lock().clone();
        let path = self.path.clone();
        std::thread::spawn(move || {
            write_document(&path, &snapshot);
        });
    }
}

fn entry<'a>(
    records: &'a mut HashMap<String, PersistentAgentRecord>,
    name: &str,
) -> &'a mut PersistentAgentRecord {
    records
        .entry(name.to_string())
        .or_insert_with(|| PersistentAgentRecord::new(name))
}

fn write_document(path: &Path, records: &HashMap<String, PersistentAgentRecord>) {
    let bytes = match serde_json::to_vec_pretty(records) {
        Ok(bytes) => bytes,
        Err(e) => {
            // Never truncate the existing document over a marshal failure.
            warn!(error = %e, "failed to marshal agent data");
            return;
        }
    };
    if let Err(e) = write_atomic(path, &bytes) {
        warn!(path = %path.display(), error = %e, "failed to save agent data");
    }
}

#[cfg(test)]
#[path = "agent_data_tests.rs"]
mod tests;
