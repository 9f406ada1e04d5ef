// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent control and command-routing request handlers.

use super::ListenCtx;
use crate::protocol::{
    AgentCommands, AgentSummary, AgentsPayload, CommandResultPayload, CommandsPayload,
    ConfigPayload, Envelope, LogsPayload, ReloadPayload, SectionsPayload, COMMAND_TIMEOUT_MS,
};
use herd_core::AgentDeclaration;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub(super) fn list_agents(ctx: &Arc<ListenCtx>) -> Envelope {
    let agents = ctx
        .manager
        .all_agents()
        .iter()
        .map(|sup| {
            let snapshot = sup.snapshot();
            let record = ctx.store.agent_data(&snapshot.name).unwrap_or_default();
            AgentSummary {
                total_runtime_seconds: ctx.store.total_runtime(&snapshot.name),
                crash_count: record.crash_count,
                snapshot,
            }
        })
        .collect();
    Envelope::with(AgentsPayload { agents })
}

pub(super) async fn start_agent(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.manager.start_agent(name).await {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn stop_agent(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.manager.stop_agent(name).await {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn restart_agent(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.manager.restart_agent(name).await {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn stop_all(ctx: &Arc<ListenCtx>) -> Envelope {
    ctx.manager.stop_all().await;
    Envelope::ok()
}

pub(super) async fn reload_config(ctx: &Arc<ListenCtx>) -> Envelope {
    match ctx.manager.reload_config().await {
        Ok(summary) => Envelope::with(ReloadPayload { reload: summary }),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) fn get_logs(ctx: &Arc<ListenCtx>, name: &str, lines: usize) -> Envelope {
    match ctx.manager.get_agent(name) {
        Some(sup) => Envelope::with(LogsPayload {
            name: name.to_string(),
            lines: sup.logs(lines),
        }),
        None => Envelope::err(format!("unknown agent: {name}")),
    }
}

pub(super) fn get_custom_sections(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.manager.get_agent(name) {
        Some(sup) => Envelope::with(SectionsPayload {
            sections: sup.custom_sections(),
        }),
        None => Envelope::err(format!("unknown agent: {name}")),
    }
}

pub(super) fn get_agent_config(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.manager.get_agent(name) {
        Some(sup) => Envelope::with(ConfigPayload {
            agent: sup.declaration(),
        }),
        None => Envelope::err(format!("unknown agent: {name}")),
    }
}

pub(super) fn add_agent(ctx: &Arc<ListenCtx>, agent: AgentDeclaration) -> Envelope {
    match ctx.manager.add_agent(agent) {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn remove_agent(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.manager.remove_agent(name).await {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn lifecycle_event(
    ctx: &Arc<ListenCtx>,
    name: &str,
    event: &str,
    data: Option<Value>,
) -> Envelope {
    let Some(sup) = ctx.manager.get_agent(name) else {
        return Envelope::err(format!("unknown agent: {name}"));
    };
    match sup.send_lifecycle_event(event, data).await {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn command(
    ctx: &Arc<ListenCtx>,
    agent: &str,
    command: &str,
    args: Option<Value>,
    working_dir: &str,
    timeout_ms: Option<u64>,
) -> Envelope {
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(COMMAND_TIMEOUT_MS));
    match ctx
        .manager
        .invoke_command(agent, command, args, working_dir, Some(timeout))
        .await
    {
        Ok(resp) => {
            let mut envelope = Envelope::with(CommandResultPayload {
                result: resp.result,
            });
            envelope.success = resp.success;
            envelope.error = resp.error;
            envelope
        }
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) fn list_commands(ctx: &Arc<ListenCtx>) -> Envelope {
    let commands = ctx
        .manager
        .list_commands()
        .into_iter()
        .map(|(agent, commands)| AgentCommands { agent, commands })
        .collect();
    Envelope::with(CommandsPayload { commands })
}
