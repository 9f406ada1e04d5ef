// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-change events fanned out to control-plane subscribers.

use crate::agent::{AgentStatus, SidebarSection};
use crate::command::CommandDescriptor;
use serde::{Deserialize, Serialize};

/// One observable change on a supervised agent.
///
/// Serializes as `{"kind": "status", ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentStateEvent {
    /// The agent's status changed.
    Status {
        name: String,
        status: AgentStatus,
        #[serde(default)]
        pid: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Declared metadata changed without a restart.
    Metadata {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
    },
    /// The child advertised a new command registry.
    Commands {
        name: String,
        commands: Vec<CommandDescriptor>,
    },
    /// The child updated its custom sidebar sections.
    Sections {
        name: String,
        sections: Vec<SidebarSection>,
    },
    /// A named event emitted by the child over the stdio protocol.
    Event {
        name: String,
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    /// An agent was added to the topology at runtime.
    Added { name: String },
    /// An agent was removed from the topology.
    Removed { name: String },
}

impl AgentStateEvent {
    pub fn agent_name(&self) -> &str {
        match self {
            AgentStateEvent::Status { name, .. }
            | AgentStateEvent::Metadata { name, .. }
            | AgentStateEvent::Commands { name, .. }
            | AgentStateEvent::Sections { name, .. }
            | AgentStateEvent::Event { name, .. }
            | AgentStateEvent::Added { name }
            | AgentStateEvent::Removed { name } => name,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
