// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task model for the asynchronous queue.
//!
//! Tasks are durably recorded units of work; their status moves one way
//! along `Pending → Running → {Completed | Failed | Deleted}` and progress
//! entries only ever append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Unique identifier for a task (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What kind of runner executes the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Tool,
    AgentCommand,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Deleted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Deleted
        )
    }

    /// Position along the monotonic status sequence. Terminal states share
    /// the highest rank; transitions may never decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Deleted => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// One appended progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// Opaque JSON-encoded metadata forwarded from the runner.
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Submission payload for a new task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub kind: Option<TaskKind>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub command_name: Option<String>,
    /// Opaque JSON text of the command arguments.
    #[serde(default)]
    pub command_args: Option<String>,
    /// Opaque JSON text of the tool arguments.
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub call_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl Default for TaskKind {
    fn default() -> Self {
        TaskKind::Tool
    }
}

/// A durably recorded asynchronous unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub command_name: Option<String>,
    #[serde(default)]
    pub command_args: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub call_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub origin: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Vec<ProgressEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a new `Pending` task from a submission.
    pub fn from_request(req: TaskRequest) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::generate(),
            kind: req.kind.unwrap_or_default(),
            tool_name: req.tool_name,
            agent_name: req.agent_name,
            command_name: req.command_name,
            command_args: req.command_args,
            args: req.args,
            working_dir: req.working_dir,
            session_id: req.session_id,
            call_id: req.call_id,
            client_id: req.client_id,
            origin: req.origin,
            status: TaskStatus::Pending,
            result: None,
            metadata: req.metadata,
            error: None,
            progress: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Transition to a new status. Backwards transitions are ignored so a
    /// late completion cannot resurrect a deleted task. `completed_at` is
    /// set exactly when the status becomes terminal.
    pub fn transition(&mut self, status: TaskStatus) -> bool {
        if status.rank() < self.status.rank() || (self.status.is_terminal() && status != self.status)
        {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(self.updated_at);
        }
        true
    }

    /// Append a progress entry, returning it for event emission.
    pub fn push_progress(
        &mut self,
        text: impl Into<String>,
        metadata: Option<String>,
        status: Option<String>,
    ) -> ProgressEntry {
        let entry = ProgressEntry {
            timestamp: Utc::now(),
            text: text.into(),
            metadata,
            status,
        };
        self.progress.push(entry.clone());
        self.updated_at = entry.timestamp;
        entry
    }
}

/// Events emitted by the task queue, totally ordered per task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Submitted { task: Task },
    /// Initial-state event sent to new per-task subscribers.
    Snapshot { task: Task },
    Running { task: Task },
    Progress { id: TaskId, entry: ProgressEntry },
    Completed { task: Task },
    Failed { task: Task },
    Deleted { task: Task },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Submitted { task }
            | TaskEvent::Snapshot { task }
            | TaskEvent::Running { task }
            | TaskEvent::Completed { task }
            | TaskEvent::Failed { task }
            | TaskEvent::Deleted { task } => &task.id,
            TaskEvent::Progress { id, .. } => id,
        }
    }

    /// Status implied by this event, used by subscribers replaying from a
    /// snapshot to drop stale mailbox entries.
    pub fn implied_status(&self) -> TaskStatus {
        match self {
            TaskEvent::Submitted { task }
            | TaskEvent::Snapshot { task }
            | TaskEvent::Running { task }
            | TaskEvent::Completed { task }
            | TaskEvent::Failed { task }
            | TaskEvent::Deleted { task } => task.status,
            TaskEvent::Progress { .. } => TaskStatus::Running,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
