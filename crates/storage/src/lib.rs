// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence for the herd daemon: per-agent counters, capped log files,
//! and the durable task record store.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod agent_data;
mod log_store;
mod task_store;
mod util;

pub use agent_data::AgentDataStore;
pub use log_store::{LogStore, MAX_LOG_LINES};
pub use task_store::TaskStore;

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt record in {path} at line {line}")]
    Corrupt { path: PathBuf, line: usize },
}
