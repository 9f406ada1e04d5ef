// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable task records: the system of record for the task queue.
//!
//! Updates are appended to a JSONL record log (one full task per line,
//! last write wins on replay). The log is compacted to one line per task
//! with an atomic rewrite on open and on shutdown. A corrupt tail is
//! rotated to `.bak`, preserving the valid prefix.

use crate::util::{rotate_bak_path, write_atomic};
use crate::StoreError;
use herd_core::{Task, TaskId, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

struct TaskStoreInner {
    tasks: HashMap<TaskId, Task>,
    file: File,
}

/// Append-mostly store of task records.
pub struct TaskStore {
    path: PathBuf,
    inner: Mutex<TaskStoreInner>,
}

impl TaskStore {
    /// Open the store, replaying and compacting any existing log.
    pub fn open(path: impl Into<PathBuf>) -> Result<TaskStore, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tasks = replay(&path)?;
        compact_to_disk(&path, &tasks)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(TaskStore {
            path,
            inner: Mutex::new(TaskStoreInner { tasks, file }),
        })
    }

    /// Persist a task record (insert or update).
    pub fn put(&self, task: &Task) -> Result<(), StoreError> {
        let line = serde_json::to_vec(task)?;
        let mut inner = self.inner.lock();
        inner.tasks.insert(task.id.clone(), task.clone());
        inner.file.write_all(&line)?;
        inner.file.write_all(b"\n")?;
        inner.file.flush()?;
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(id).cloned()
    }

    /// All tasks, oldest first.
    pub fn all(&self) -> Vec<Task> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Ids of tasks in the given status, oldest first.
    pub fn ids_in_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.all()
            .into_iter()
            .filter(|t| t.status == status)
            .map(|t| t.id)
            .collect()
    }

    pub fn ids_by_call(&self, call_id: &str) -> Vec<TaskId> {
        self.ids_matching(|t| t.call_id == call_id)
    }

    pub fn ids_by_session(&self, session_id: &str) -> Vec<TaskId> {
        self.ids_matching(|t| t.session_id == session_id)
    }

    pub fn ids_by_agent(&self, agent_name: &str) -> Vec<TaskId> {
        self.ids_matching(|t| t.agent_name.as_deref() == Some(agent_name))
    }

    fn ids_matching(&self, pred: impl Fn(&Task) -> bool) -> Vec<TaskId> {
        self.all()
            .into_iter()
            .filter(|t| pred(t))
            .map(|t| t.id)
            .collect()
    }

    /// Rewrite the log to one line per task. Called at shutdown.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        compact_to_disk(&self.path, &inner.tasks)?;
        inner.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

/// Replay the record log; last write per id wins. On a corrupt line, the
/// file is rotated to `.bak` and the valid prefix is preserved.
fn replay(path: &Path) -> Result<HashMap<TaskId, Task>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Ok(HashMap::new()),
    };

    let mut tasks = HashMap::new();
    let mut corrupt_at = None;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Task>(&line) {
            Ok(task) => {
                tasks.insert(task.id.clone(), task);
            }
            Err(_) => {
                corrupt_at = Some(idx + 1);
                break;
            }
        }
    }

    if let Some(line) = corrupt_at {
        let bak = rotate_bak_path(path);
        warn!(
            path = %path.display(),
            bak = %bak.display(),
            line,
            "corrupt task record, rotating log and keeping valid prefix"
        );
        std::fs::rename(path, &bak)?;
    }

    Ok(tasks)
}

fn compact_to_disk(path: &Path, tasks: &HashMap<TaskId, Task>) -> Result<(), StoreError> {
    let mut ordered: Vec<&Task> = tasks.values().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut buf = Vec::new();
    for task in ordered {
        serde_json::to_writer(&mut buf, task)?;
        buf.push(b'\n');
    }
    write_atomic(path, &buf)?;
    Ok(())
}

#[cfg(test)]
#[path = "task_store_tests.rs"]
mod tests;
