// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-control request handlers.

use super::ListenCtx;
use crate::protocol::{DeletedPayload, Envelope, MetricsPayload, TaskPayload, TasksPayload};
use herd_core::{TaskId, TaskRequest};
use std::sync::Arc;

pub(super) fn submit(ctx: &Arc<ListenCtx>, request: TaskRequest) -> Envelope {
    match ctx.queue.submit(request) {
        Ok(task) => Envelope::with(TaskPayload { task }),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) fn get(ctx: &Arc<ListenCtx>, id: &str) -> Envelope {
    match ctx.queue.get(&TaskId::from(id)) {
        Some(task) => Envelope::with(TaskPayload { task }),
        None => Envelope::err(format!("unknown task: {id}")),
    }
}

pub(super) fn list(ctx: &Arc<ListenCtx>) -> Envelope {
    Envelope::with(TasksPayload {
        tasks: ctx.queue.list(),
    })
}

/// Deletion addresses exactly one of task id, call id, session id, or
/// agent name.
pub(super) fn delete(
    ctx: &Arc<ListenCtx>,
    id: Option<String>,
    call_id: Option<String>,
    session_id: Option<String>,
    agent: Option<String>,
) -> Envelope {
    if let Some(id) = id {
        return match ctx.queue.delete_task(&TaskId::from(id)) {
            Ok(()) => Envelope::with(DeletedPayload { deleted: 1 }),
            Err(e) => Envelope::err(e.to_string()),
        };
    }
    if let Some(call_id) = call_id {
        return Envelope::with(DeletedPayload {
            deleted: ctx.queue.delete_tasks_by_call(&call_id),
        });
    }
    if let Some(session_id) = session_id {
        return Envelope::with(DeletedPayload {
            deleted: ctx.queue.delete_tasks_by_session(&session_id),
        });
    }
    if let Some(agent) = agent {
        return Envelope::with(DeletedPayload {
            deleted: ctx.queue.delete_tasks_by_agent(&agent),
        });
    }
    Envelope::err("delete requires one of: id, call_id, session_id, agent")
}

pub(super) fn metrics(ctx: &Arc<ListenCtx>) -> Envelope {
    Envelope::with(MetricsPayload {
        metrics: ctx.queue.metrics_snapshot(),
    })
}
