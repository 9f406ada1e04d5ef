// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent per-agent counters, kept across daemon generations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters and the resume flag persisted for one agent.
///
/// `was_running` captures the pre-shutdown running set so the next daemon
/// generation can auto-resume those agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentAgentRecord {
    pub name: String,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub total_runtime_seconds: u64,
    #[serde(default)]
    pub last_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_stopped: Option<DateTime<Utc>>,
    #[serde(default)]
    pub crash_count: u32,
    #[serde(default)]
    pub was_running: bool,
}

impl PersistentAgentRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
