// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed payloads merged into response envelopes.

use herd_core::{AgentDeclaration, AgentSnapshot, CommandDescriptor, SidebarSection, Task};
use herd_engine::{QueueMetrics, ReloadSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One agent in a `ListAgents` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    #[serde(flatten)]
    pub snapshot: AgentSnapshot,
    pub total_runtime_seconds: u64,
    pub crash_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsPayload {
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsPayload {
    pub name: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionsPayload {
    pub sections: Vec<SidebarSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub agent: AgentDeclaration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommands {
    pub agent: String,
    pub commands: Vec<CommandDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsPayload {
    pub commands: Vec<AgentCommands>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksPayload {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedPayload {
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub metrics: QueueMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadPayload {
    pub reload: ReloadSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsPayload {
    pub names: Vec<String>,
}

/// `Ping` response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub version: String,
    pub agents: usize,
    pub uptime_secs: u64,
}
