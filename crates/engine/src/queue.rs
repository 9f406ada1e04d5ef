// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous task queue: a bounded worker pool over the durable task
//! store, streaming per-task events through a broker.
//!
//! Per task id, subscribers observe a total order:
//! `Submitted|Snapshot → Running? → Progress* → Completed|Failed|Deleted`.
//! No ordering holds across different tasks.

use crate::bus::Broker;
use crate::manager::Manager;
use crate::runner::{run_agent_command, ProgressSink, ToolRunner};
use herd_core::{Task, TaskEvent, TaskId, TaskKind, TaskRequest, TaskStatus};
use herd_storage::TaskStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("task queue is shut down")]
    ShutDown,

    #[error(transparent)]
    Store(#[from] herd_storage::StoreError),
}

/// Queue construction parameters.
pub struct TaskQueueConfig {
    pub workers: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        TaskQueueConfig {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Counters reported by `ToolTaskMetrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub deleted: usize,
    pub total: usize,
    pub workers: usize,
}

/// External sink for task events (in addition to broker subscribers).
pub type EventSink = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

struct QueueInner {
    pending: VecDeque<TaskId>,
    running: HashMap<TaskId, CancellationToken>,
    /// Running tasks whose deletion was requested; the worker turns the
    /// terminal state into `Deleted` when the runner returns.
    delete_requested: HashSet<TaskId>,
}

/// The task queue. Construct with [`TaskQueue::start`].
pub struct TaskQueue {
    store: Arc<TaskStore>,
    manager: Arc<Manager>,
    runner: Arc<dyn ToolRunner>,
    inner: Mutex<QueueInner>,
    work: Notify,
    events: Broker<TaskEvent>,
    sink: Mutex<Option<EventSink>>,
    shutdown: CancellationToken,
    workers: usize,
    self_weak: Weak<TaskQueue>,
}

impl TaskQueue {
    /// Build the queue, recover persisted tasks, and start the workers.
    ///
    /// Recovery: `Pending` tasks re-enqueue in creation order; tasks a
    /// dead daemon generation left `Running` are marked failed.
    pub fn start(
        store: Arc<TaskStore>,
        manager: Arc<Manager>,
        runner: Arc<dyn ToolRunner>,
        config: TaskQueueConfig,
    ) -> Arc<TaskQueue> {
        let queue = Arc::new_cyclic(|self_weak| TaskQueue {
            store,
            manager,
            runner,
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                running: HashMap::new(),
                delete_requested: HashSet::new(),
            }),
            work: Notify::new(),
            events: Broker::new(),
            sink: Mutex::new(None),
            shutdown: CancellationToken::new(),
            workers: config.workers.max(1),
            self_weak: self_weak.clone(),
        });

        queue.recover();

        for n in 0..queue.workers {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue.worker_loop(n).await;
            });
        }

        queue
    }

    fn recover(&self) {
        for id in self.store.ids_in_status(TaskStatus::Running) {
            if let Some(mut task) = self.store.get(&id) {
                task.error = Some("daemon restarted while task was running".to_string());
                task.transition(TaskStatus::Failed);
                if let Err(e) = self.store.put(&task) {
                    warn!(task = %id, error = %e, "failed to persist recovery failure");
                }
            }
        }

        let pending = self.store.ids_in_status(TaskStatus::Pending);
        if !pending.is_empty() {
            info!(count = pending.len(), "re-enqueueing persisted pending tasks");
            let mut inner = self.inner.lock();
            for id in pending {
                inner.pending.push_back(id);
            }
        }
    }

    /// Submit a task: persist as `Pending`, enqueue, emit `Submitted`.
    pub fn submit(&self, req: TaskRequest) -> Result<Task, QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::ShutDown);
        }
        let task = Task::from_request(req);
        self.store.put(&task)?;

        self.inner.lock().pending.push_back(task.id.clone());
        self.emit(TaskEvent::Submitted { task: task.clone() });
        self.work.notify_one();
        Ok(task)
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.store.get(id)
    }

    /// All known tasks, oldest first.
    pub fn list(&self) -> Vec<Task> {
        self.store.all()
    }

    /// Tasks currently pending or running.
    pub fn active_tasks(&self) -> Vec<Task> {
        self.list()
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .collect()
    }

    /// Subscribe to every task's events for the lifetime of `ctx`.
    pub fn subscribe(&self, ctx: &CancellationToken) -> mpsc::Receiver<TaskEvent> {
        self.events.subscribe(ctx)
    }

    /// Subscribe to a single task. Returns the current snapshot (if the
    /// task exists) plus the event stream; the caller emits the snapshot
    /// first and drops buffered events older than it.
    pub fn subscribe_task(
        &self,
        id: &TaskId,
        ctx: &CancellationToken,
    ) -> (Option<Task>, mpsc::Receiver<TaskEvent>) {
        let rx = self.events.subscribe(ctx);
        let snapshot = self.store.get(id);
        (snapshot, rx)
    }

    /// Delete a task.
    ///
    /// Pending tasks leave the queue and become `Deleted` immediately.
    /// Running tasks are cancelled best-effort: the terminal `Deleted`
    /// event arrives once the runner returns. Terminal tasks are
    /// re-marked `Deleted` so bulk cleanup converges.
    pub fn delete_task(&self, id: &TaskId) -> Result<(), QueueError> {
        let task = self
            .store
            .get(id)
            .ok_or_else(|| QueueError::UnknownTask(id.clone()))?;

        enum Mode {
            Pending,
            Running,
            Terminal,
            AlreadyDeleted,
        }

        let mode = {
            let mut inner = self.inner.lock();
            if let Some(pos) = inner.pending.iter().position(|p| p == id) {
                inner.pending.remove(pos);
                Mode::Pending
            } else if let Some(token) = inner.running.get(id).cloned() {
                inner.delete_requested.insert(id.clone());
                token.cancel();
                Mode::Running
            } else if task.status == TaskStatus::Deleted {
                Mode::AlreadyDeleted
            } else {
                Mode::Terminal
            }
        };

        match mode {
            Mode::Pending | Mode::Terminal => {
                let mut task = task;
                task.transition(TaskStatus::Deleted);
                self.store.put(&task)?;
                self.emit(TaskEvent::Deleted { task });
            }
            Mode::Running => {
                debug!(task = %id, "deletion requested for running task");
            }
            Mode::AlreadyDeleted => {}
        }
        Ok(())
    }

    pub fn delete_tasks_by_call(&self, call_id: &str) -> usize {
        self.delete_many(self.store.ids_by_call(call_id))
    }

    pub fn delete_tasks_by_session(&self, session_id: &str) -> usize {
        self.delete_many(self.store.ids_by_session(session_id))
    }

    pub fn delete_tasks_by_agent(&self, agent_name: &str) -> usize {
        self.delete_many(self.store.ids_by_agent(agent_name))
    }

    fn delete_many(&self, ids: Vec<TaskId>) -> usize {
        let mut deleted = 0;
        for id in ids {
            // Skip tasks already deleted so the count reflects new work.
            if self.store.get(&id).map(|t| t.status) == Some(TaskStatus::Deleted) {
                continue;
            }
            if self.delete_task(&id).is_ok() {
                deleted += 1;
            }
        }
        deleted
    }

    pub fn metrics_snapshot(&self) -> QueueMetrics {
        let mut metrics = QueueMetrics {
            workers: self.workers,
            ..Default::default()
        };
        for task in self.list() {
            metrics.total += 1;
            match task.status {
                TaskStatus::Pending => metrics.pending += 1,
                TaskStatus::Running => metrics.running += 1,
                TaskStatus::Completed => metrics.completed += 1,
                TaskStatus::Failed => metrics.failed += 1,
                TaskStatus::Deleted => metrics.deleted += 1,
            }
        }
        metrics
    }

    /// Install an external event sink (e.g. the control-plane broker).
    pub fn set_event_sink(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    /// Stop the workers, close subscriber channels, and compact the store.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        // Wake idle workers so they observe the shutdown.
        for _ in 0..self.workers {
            self.work.notify_one();
        }
        self.events.shutdown();
        if let Err(e) = self.store.compact() {
            warn!(error = %e, "task store compaction failed at shutdown");
        }
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(sink) = self.sink.lock().clone() {
            sink(&event);
        }
        self.events.publish(event);
    }

    async fn worker_loop(&self, worker: usize) {
        debug!(worker, "task worker started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let next = self.inner.lock().pending.pop_front();
            match next {
                Some(id) => self.run_task(id).await,
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.work.notified() => {}
                    }
                }
            }
        }
        debug!(worker, "task worker stopped");
    }

    async fn run_task(&self, id: TaskId) {
        // Register as running before re-reading the store, so a concurrent
        // delete lands in `delete_requested` instead of racing the status
        // writes below.
        let token = CancellationToken::new();
        self.inner
            .lock()
            .running
            .insert(id.clone(), token.clone());

        let task = self.store.get(&id).filter(|t| t.status == TaskStatus::Pending);
        let Some(mut task) = task else {
            let mut inner = self.inner.lock();
            inner.running.remove(&id);
            inner.delete_requested.remove(&id);
            return;
        };

        task.transition(TaskStatus::Running);
        if let Err(e) = self.store.put(&task) {
            warn!(task = %id, error = %e, "failed to persist running state");
        }
        self.emit(TaskEvent::Running { task: task.clone() });

        // The runner streams progress through this sink; entries append to
        // the shared task and fan out immediately.
        let shared = Arc::new(Mutex::new(task));
        let progress: ProgressSink = {
            let shared = Arc::clone(&shared);
            let id = id.clone();
            let queue = self.self_weak.clone();
            Arc::new(move |text, metadata, status| {
                let Some(queue) = queue.upgrade() else {
                    return;
                };
                let entry = {
                    let mut task = shared.lock();
                    let entry = task.push_progress(text, metadata, status);
                    if let Err(e) = queue.store.put(&task) {
                        warn!(task = %task.id, error = %e, "failed to persist progress");
                    }
                    entry
                };
                queue.emit(TaskEvent::Progress {
                    id: id.clone(),
                    entry,
                });
            })
        };

        let run_input = shared.lock().clone();
        let result = match run_input.kind {
            TaskKind::Tool => self.runner.run(&run_input, progress, &token).await,
            TaskKind::AgentCommand => {
                run_agent_command(&self.manager, &run_input, progress, &token).await
            }
        };

        let delete_requested = {
            let mut inner = self.inner.lock();
            inner.running.remove(&id);
            inner.delete_requested.remove(&id)
        };

        let mut task = shared.lock().clone();
        if delete_requested {
            task.transition(TaskStatus::Deleted);
            if let Err(e) = self.store.put(&task) {
                warn!(task = %id, error = %e, "failed to persist deletion");
            }
            self.emit(TaskEvent::Deleted { task });
            return;
        }

        match result {
            Ok(value) => {
                task.result = Some(value);
                task.transition(TaskStatus::Completed);
                if let Err(e) = self.store.put(&task) {
                    warn!(task = %id, error = %e, "failed to persist completion");
                }
                self.emit(TaskEvent::Completed { task });
            }
            Err(message) => {
                task.error = Some(message);
                task.transition(TaskStatus::Failed);
                if let Err(e) = self.store.put(&task) {
                    warn!(task = %id, error = %e, "failed to persist failure");
                }
                self.emit(TaskEvent::Failed { task });
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
