// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command descriptors advertised by children over the registry message,
//! and the normalization applied before they are cached or exposed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Surfaces a command can be exposed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposeAs {
    AgentTool,
    SlashCommand,
}

/// Scope of a derived slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashScope {
    #[default]
    Local,
    Global,
}

/// JSON-schema-ish argument type. Unknown strings collapse to `Unknown`
/// and are treated as `String` during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Unknown,
}

impl<'de> Deserialize<'de> for ArgumentType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Invalid type names must not fail the whole registry message.
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "string" => ArgumentType::String,
            "integer" => ArgumentType::Integer,
            "number" => ArgumentType::Number,
            "boolean" => ArgumentType::Boolean,
            "array" => ArgumentType::Array,
            "object" => ArgumentType::Object,
            _ => ArgumentType::Unknown,
        })
    }
}

/// A single declared command argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandArgument {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ArgumentType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<serde_json::Value>>,
    /// Item schema for array arguments (opaque).
    #[serde(default)]
    pub items: Option<serde_json::Value>,
    /// Property schema for object arguments (opaque).
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
}

/// A command a child advertises via the `command_registry` message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expose_as: Vec<ExposeAs>,
    #[serde(default)]
    pub slash_command: Option<String>,
    #[serde(default)]
    pub slash_scope: SlashScope,
    #[serde(default)]
    pub argument_hint: Option<String>,
    #[serde(default)]
    pub argument_required: bool,
    #[serde(default)]
    pub arguments: Vec<CommandArgument>,
    #[serde(rename = "async", default)]
    pub is_async: bool,
    #[serde(default)]
    pub progress_label: Option<String>,
}

impl CommandDescriptor {
    /// Normalize a raw descriptor. Returns `None` when the name is empty
    /// after trimming.
    pub fn normalize(mut self) -> Option<CommandDescriptor> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return None;
        }

        if self.title.trim().is_empty() {
            self.title = title_from_name(&self.name);
        } else {
            self.title = self.title.trim().to_string();
        }

        if self.expose_as.contains(&ExposeAs::SlashCommand) {
            let source = self
                .slash_command
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&self.name);
            self.slash_command = Some(slashify(source));
        } else {
            self.slash_command = None;
        }

        // Duplicate argument names are discarded, first declaration wins.
        let mut seen = HashSet::new();
        self.arguments.retain_mut(|arg| {
            arg.name = arg.name.trim().to_string();
            if arg.name.is_empty() || !seen.insert(arg.name.clone()) {
                return false;
            }
            if arg.kind == ArgumentType::Unknown {
                arg.kind = ArgumentType::String;
            }
            true
        });

        Some(self)
    }
}

/// Normalize a full registry advertisement. Empty names drop out and
/// duplicate command names keep their first occurrence.
pub fn normalize_registry(commands: Vec<CommandDescriptor>) -> Vec<CommandDescriptor> {
    let mut seen = HashSet::new();
    commands
        .into_iter()
        .filter_map(CommandDescriptor::normalize)
        .filter(|c| seen.insert(c.name.clone()))
        .collect()
}

/// Derive a display title from a command name: separators become spaces
/// and each word is capitalized.
fn title_from_name(name: &str) -> String {
    name.split(['-', '_', ' ', '.'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case a name and substitute `_` for separators to form a slash
/// command identifier.
fn slashify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' | '/' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
