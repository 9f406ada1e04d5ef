// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task runners: how the queue's workers execute a task.
//!
//! Tool tasks resolve their tool name against commands agents expose as
//! agent tools; agent-command tasks address an agent and command directly.

use crate::manager::Manager;
use async_trait::async_trait;
use herd_core::{ExposeAs, Task};
use herd_proto::{ProgressFn, ProgressUpdate};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sink for task progress: `(text, metadata, status)`. Appends to the
/// task's progress log and fans out a progress event.
pub type ProgressSink = Arc<dyn Fn(String, Option<String>, Option<String>) + Send + Sync>;

/// Executes `kind = Tool` tasks.
#[async_trait]
pub trait ToolRunner: Send + Sync + 'static {
    async fn run(
        &self,
        task: &Task,
        progress: ProgressSink,
        ctx: &CancellationToken,
    ) -> Result<Value, String>;
}

/// Tool runner that routes tool names to agent commands exposed as
/// [`ExposeAs::AgentTool`]. Accepts `<agent>__<command>` or a bare
/// command name unique across agents.
pub struct AgentToolRunner {
    manager: Arc<Manager>,
}

impl AgentToolRunner {
    pub fn new(manager: Arc<Manager>) -> AgentToolRunner {
        AgentToolRunner { manager }
    }

    /// Resolve a tool name to `(agent, command)`.
    fn resolve(&self, tool: &str) -> Result<(String, String), String> {
        if let Some((agent, command)) = tool.split_once("__") {
            return Ok((agent.to_string(), command.to_string()));
        }

        let mut matches = Vec::new();
        for (agent, commands) in self.manager.list_commands() {
            for cmd in commands {
                if cmd.name == tool && cmd.expose_as.contains(&ExposeAs::AgentTool) {
                    matches.push((agent.clone(), cmd.name.clone()));
                }
            }
        }
        match matches.len() {
            0 => Err(format!("unknown tool: {tool}")),
            1 => Ok(matches.remove(0)),
            n => Err(format!("tool {tool} is ambiguous across {n} agents")),
        }
    }
}

#[async_trait]
impl ToolRunner for AgentToolRunner {
    async fn run(
        &self,
        task: &Task,
        progress: ProgressSink,
        ctx: &CancellationToken,
    ) -> Result<Value, String> {
        let tool = task
            .tool_name
            .as_deref()
            .ok_or_else(|| "tool task without tool name".to_string())?;
        let (agent, command) = self.resolve(tool)?;

        let args = parse_args(task.args.as_deref())?;
        let working_dir = working_dir_of(task);

        invoke(
            &self.manager,
            &agent,
            &command,
            args,
            &working_dir,
            progress,
            ctx,
        )
        .await
    }
}

/// Execute a `kind = AgentCommand` task against the manager.
pub(crate) async fn run_agent_command(
    manager: &Arc<Manager>,
    task: &Task,
    progress: ProgressSink,
    ctx: &CancellationToken,
) -> Result<Value, String> {
    let agent = task
        .agent_name
        .as_deref()
        .ok_or_else(|| "agent command task without agent name".to_string())?;
    let command = task
        .command_name
        .as_deref()
        .ok_or_else(|| "agent command task without command name".to_string())?;

    let args = parse_args(task.command_args.as_deref())?;
    let working_dir = working_dir_of(task);

    invoke(manager, agent, command, args, &working_dir, progress, ctx).await
}

async fn invoke(
    manager: &Arc<Manager>,
    agent: &str,
    command: &str,
    args: Option<Value>,
    working_dir: &str,
    progress: ProgressSink,
    ctx: &CancellationToken,
) -> Result<Value, String> {
    // Map protocol progress into task progress: trim the text, carry the
    // metadata as JSON text, forward the status.
    let on_progress: ProgressFn = Arc::new(move |update: ProgressUpdate| {
        progress(
            update.text.trim().to_string(),
            update.metadata.map(|m| m.to_string()),
            update.status,
        );
    });

    let resp = manager
        .invoke_command_async(agent, command, args, working_dir, None, ctx, Some(on_progress))
        .await
        .map_err(|e| e.to_string())?;

    if resp.success {
        Ok(resp.result.unwrap_or(Value::Null))
    } else {
        Err(resp
            .error
            .unwrap_or_else(|| "command failed without error text".to_string()))
    }
}

/// Opaque JSON argument text → value. Empty text means no arguments.
fn parse_args(raw: Option<&str>) -> Result<Option<Value>, String> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| format!("invalid argument JSON: {e}")),
    }
}

fn working_dir_of(task: &Task) -> String {
    task.working_dir
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
