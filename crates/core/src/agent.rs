// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent declaration and observable state types.
//!
//! A declaration is what the operator wrote in the config file; a snapshot
//! is what the supervisor currently observes about the running child.

use crate::command::CommandDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Restart bound applied when `auto_restart` is enabled but the declaration
/// leaves `max_restarts` at zero.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// A single agent entry from the topology config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDeclaration {
    /// Unique agent name (map key across the daemon).
    pub name: String,
    /// Command path or bare program name (resolved against PATH).
    #[serde(default)]
    pub command: String,
    /// Argument vector passed to the child.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory, resolved against the config file's directory
    /// when relative.
    #[serde(default)]
    pub process_root: Option<PathBuf>,
    /// Environment overlay; wins over the daemon's environment on collision.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default)]
    pub max_restarts: u32,
    #[serde(default)]
    pub start_with_daemon: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl AgentDeclaration {
    /// Restart bound the supervisor enforces for crash-triggered restarts.
    pub fn effective_max_restarts(&self) -> u32 {
        if self.auto_restart && self.max_restarts == 0 {
            DEFAULT_MAX_RESTARTS
        } else {
            self.max_restarts
        }
    }

    /// True when `other` differs only in metadata (description, color,
    /// system prompt). Structural fields require a process replacement;
    /// metadata can be updated in place.
    pub fn same_structure(&self, other: &AgentDeclaration) -> bool {
        self.name == other.name
            && self.command == other.command
            && self.args == other.args
            && self.process_root == other.process_root
            && self.env == other.env
            && self.auto_restart == other.auto_restart
            && self.max_restarts == other.max_restarts
            && self.start_with_daemon == other.start_with_daemon
    }

    /// True when metadata fields are identical.
    pub fn same_metadata(&self, other: &AgentDeclaration) -> bool {
        self.description == other.description
            && self.color == other.color
            && self.system_prompt == other.system_prompt
    }
}

/// Observable status of a supervised agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Stopped,
    Running,
    Stopping,
    Crashed,
}

impl AgentStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, AgentStatus::Running)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Stopping => write!(f, "stopping"),
            AgentStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// A custom sidebar section advertised by the child over the stdio protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub collapsed: bool,
}

/// Point-in-time view of one agent, as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub name: String,
    pub status: AgentStatus,
    /// Process id; valid only while status is `Running`.
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub registered_commands: Vec<CommandDescriptor>,
    #[serde(default)]
    pub custom_sections: Vec<SidebarSection>,
    #[serde(default)]
    pub last_invoke_dir: Option<PathBuf>,
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
