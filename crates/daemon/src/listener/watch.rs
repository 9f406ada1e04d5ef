// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming upgrades: after one success envelope, the connection carries
//! JSON-encoded events until the client closes it. Closing cancels the
//! underlying broker subscription via its context token.

use super::ListenCtx;
use crate::protocol::{self, Envelope, Request};
use herd_core::{AgentStateEvent, TaskEvent, TaskId};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(super) async fn handle_watch<S>(
    request: Request,
    reader: BufReader<S>,
    ctx: &Arc<ListenCtx>,
) -> Result<(), protocol::WireError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let stream = reader.into_inner();
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    let token = CancellationToken::new();
    // Cancel the subscription no matter how this function returns.
    let _guard = token.clone().drop_guard();

    match request {
        Request::WatchAgentState => {
            let rx = ctx.agent_events.subscribe(&token);
            protocol::write_line(&mut write_half, &Envelope::ok()).await?;

            // Initial state: one status event per agent.
            for snapshot in ctx.manager.snapshots() {
                let event = AgentStateEvent::Status {
                    name: snapshot.name.clone(),
                    status: snapshot.status,
                    pid: snapshot.pid,
                    error: None,
                };
                protocol::write_line(&mut write_half, &event).await?;
            }

            stream_events(rx, &mut reader, &mut buf, &mut write_half, |_| true).await
        }

        Request::WatchAllTasks => {
            let rx = ctx.queue.subscribe(&token);
            protocol::write_line(&mut write_half, &Envelope::ok()).await?;
            stream_events(rx, &mut reader, &mut buf, &mut write_half, |_| true).await
        }

        Request::WatchToolTask { id } => {
            let task_id = TaskId::from(id);
            let (snapshot, rx) = ctx.queue.subscribe_task(&task_id, &token);

            let Some(snapshot) = snapshot else {
                let resp = Envelope::err(format!("unknown task: {task_id}"));
                return protocol::write_line(&mut write_half, &resp).await;
            };

            protocol::write_line(&mut write_half, &Envelope::ok()).await?;

            // Snapshot first; then drop buffered events that predate it so
            // the observed status sequence stays monotonic.
            let snapshot_rank = snapshot.status.rank();
            let snapshot_event = TaskEvent::Snapshot {
                task: snapshot.clone(),
            };
            protocol::write_line(&mut write_half, &snapshot_event).await?;

            let wanted = move |event: &TaskEvent| {
                event.task_id() == &task_id && event.implied_status().rank() >= snapshot_rank
            };
            stream_events(rx, &mut reader, &mut buf, &mut write_half, wanted).await
        }

        _ => {
            let resp = Envelope::err("not a watch request");
            protocol::write_line(&mut write_half, &resp).await
        }
    }
}

/// Forward filtered events until the subscription closes or the client
/// hangs up.
async fn stream_events<E, R, W, F>(
    mut rx: mpsc::Receiver<E>,
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
    writer: &mut W,
    wanted: F,
) -> Result<(), protocol::WireError>
where
    E: serde::Serialize,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Fn(&E) -> bool,
{
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) if wanted(&event) => {
                        protocol::write_line(writer, &event).await?;
                    }
                    Some(_) => {}
                    None => return Ok(()),
                }
            }
            line = protocol::read_line(reader, buf) => {
                match line {
                    // Clients do not speak during a stream; any read
                    // completion means the connection is done.
                    Ok(None) | Err(_) => {
                        debug!("watch client disconnected");
                        return Ok(());
                    }
                    Ok(Some(_)) => {}
                }
            }
        }
    }
}
