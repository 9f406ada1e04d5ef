// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire message kinds for the child stdio protocol.

use herd_core::{CommandDescriptor, SidebarSection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single framed message, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FramedMessage {
    /// Handshake from the child; SHOULD be its first line.
    Ready {
        #[serde(default)]
        pid: u32,
        #[serde(default)]
        version: String,
    },

    /// Structured log line from the child.
    Log {
        #[serde(default)]
        level: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        fields: Option<Value>,
    },

    /// Free-form named event.
    Event {
        #[serde(default)]
        name: String,
        #[serde(default)]
        data: Option<Value>,
    },

    /// Child-reported error outside any command.
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        code: Option<i64>,
    },

    /// Daemon → child command request.
    Command {
        id: String,
        name: String,
        #[serde(default)]
        args: Option<Value>,
        #[serde(default)]
        working_dir: String,
    },

    /// Child → daemon response, correlated by `id`.
    Response {
        id: String,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Intermediate progress for a command, correlated by `id`.
    Progress {
        id: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        metadata: Option<Value>,
        #[serde(default)]
        status: Option<String>,
    },

    /// Child advertises its system prompt.
    SystemPrompt {
        #[serde(default)]
        text: String,
    },

    /// Child advertises a description override.
    Description {
        #[serde(default)]
        text: String,
    },

    /// Child publishes or updates a custom sidebar section.
    SidebarSection {
        #[serde(flatten)]
        section: SidebarSection,
    },

    /// Child advertises its command registry.
    CommandRegistry {
        #[serde(default)]
        commands: Vec<CommandDescriptor>,
    },

    /// Daemon → child lifecycle notification.
    Lifecycle {
        event: String,
        #[serde(default)]
        data: Option<Value>,
    },
}

impl FramedMessage {
    /// Correlation id for request-scoped messages.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            FramedMessage::Command { id, .. }
            | FramedMessage::Response { id, .. }
            | FramedMessage::Progress { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
