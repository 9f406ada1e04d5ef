// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime engine of the herd daemon: the per-agent supervisor, the
//! manager that reconciles the declared topology, the task queue, and the
//! pub/sub broker that fans live state out to subscribers.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bus;
mod config_watch;
mod manager;
mod queue;
mod runner;
mod supervisor;

pub use bus::Broker;
pub use config_watch::ConfigWatcher;
pub use manager::{Manager, ManagerError, ReloadSummary};
pub use queue::{EventSink, QueueError, QueueMetrics, TaskQueue, TaskQueueConfig};
pub use runner::{AgentToolRunner, ProgressSink, ToolRunner};
pub use supervisor::{StateCallback, Supervisor, SupervisorError};
