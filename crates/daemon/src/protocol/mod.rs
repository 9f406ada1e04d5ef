// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane protocol for daemon communication.
//!
//! Wire format: newline-delimited UTF-8 JSON. One request object per line
//! from the client, one response envelope per line from the server.
//! Streaming upgrades send one success envelope followed by a sequence of
//! event objects on the same connection.

mod types;
mod wire;

pub use types::{
    AgentCommands, AgentSummary, AgentsPayload, CommandResultPayload, CommandsPayload,
    ConfigPayload, DeletedPayload, LogsPayload, MetricsPayload, ReloadPayload, SecretPayload,
    SecretsPayload, SectionsPayload, StatusPayload, TaskPayload, TasksPayload,
};
pub use wire::{read_line, write_line, WireError, MAX_LINE_BYTES};

use crate::secrets::SecretMode;
use herd_core::{AgentDeclaration, TaskRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version (from Cargo.toml).
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default timeout for blocking `Command` requests.
pub const COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping.
    Ping,

    /// List every agent with its observable state.
    ListAgents,

    StartAgent {
        name: String,
    },

    StopAgent {
        name: String,
    },

    RestartAgent {
        name: String,
    },

    /// Stop every agent, clearing resume flags.
    StopAll,

    /// Re-read the config file and reconcile the running topology.
    ReloadConfig,

    /// Captured log lines for one agent.
    GetLogs {
        name: String,
        /// Most recent lines to return (0 = all retained).
        #[serde(default)]
        lines: usize,
    },

    /// The agent's child-advertised sidebar sections.
    GetCustomSections {
        name: String,
    },

    /// The agent's declaration as currently loaded.
    GetAgentConfig {
        name: String,
    },

    /// Register an agent at runtime.
    AddAgent {
        agent: AgentDeclaration,
    },

    /// Unregister an agent (stops it first).
    RemoveAgent {
        name: String,
    },

    /// Forward a lifecycle event to an agent's child process.
    LifecycleEvent {
        name: String,
        event: String,
        #[serde(default)]
        data: Option<Value>,
    },

    /// Invoke a command synchronously (10 s default timeout).
    Command {
        agent: String,
        command: String,
        #[serde(default)]
        args: Option<Value>,
        #[serde(default)]
        working_dir: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Every agent's registered commands.
    ListCommands,

    /// Submit an asynchronous task.
    SubmitToolTask {
        #[serde(flatten)]
        request: TaskRequest,
    },

    GetToolTask {
        id: String,
    },

    ListToolTasks,

    /// Delete tasks by task id, call id, session id, or agent name.
    DeleteToolTask {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        agent: Option<String>,
    },

    ToolTaskMetrics,

    GetSecret {
        name: String,
    },

    SetSecret {
        name: String,
        value: String,
        #[serde(default)]
        mode: SecretMode,
    },

    DeleteSecret {
        name: String,
    },

    ListSecrets,

    /// Upgrade the connection to a stream of agent state events.
    WatchAgentState,

    /// Upgrade the connection to a stream of all task events.
    WatchAllTasks,

    /// Upgrade the connection to a stream of one task's events.
    WatchToolTask {
        id: String,
    },

    /// Request daemon shutdown.
    Shutdown,
}

impl Request {
    /// Requests that switch the connection into streaming mode.
    pub fn is_watch(&self) -> bool {
        matches!(
            self,
            Request::WatchAgentState | Request::WatchAllTasks | Request::WatchToolTask { .. }
        )
    }
}

/// Response envelope: `{success, error?, ...payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn ok() -> Envelope {
        Envelope {
            success: true,
            error: None,
            data: None,
        }
    }

    /// Success with a payload merged into the envelope object.
    pub fn with(payload: impl Serialize) -> Envelope {
        match serde_json::to_value(payload) {
            Ok(data) => Envelope {
                success: true,
                error: None,
                data: Some(data),
            },
            Err(e) => Envelope::err(format!("failed to encode response: {e}")),
        }
    }

    pub fn err(message: impl Into<String>) -> Envelope {
        Envelope {
            success: false,
            error: Some(message.into()),
            data: None,
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
