// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener for control-plane connections.
//!
//! Each accepted connection runs in its own task and serves requests
//! until the client closes it. Request-shape errors are answered on the
//! same connection; only IO errors end it. Watch requests switch the
//! connection into streaming mode for the rest of its life.

mod agents;
mod secrets;
mod tasks;
mod watch;

use crate::protocol::{self, Envelope, Request, StatusPayload, PROTOCOL_VERSION};
use crate::secrets::SecretBackend;
use herd_core::AgentStateEvent;
use herd_engine::{Broker, Manager, TaskQueue};
use herd_storage::AgentDataStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub manager: Arc<Manager>,
    pub queue: Arc<TaskQueue>,
    pub agent_events: Arc<Broker<AgentStateEvent>>,
    pub store: Arc<AgentDataStore>,
    pub secrets: Arc<dyn SecretBackend>,
    pub shutdown: Arc<Notify>,
    pub start_time: Instant,
}

/// Accept loop over the Unix socket.
pub struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Listener {
        Listener { socket, ctx }
    }

    /// Run until the socket is closed, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    // Transient accept errors (fd exhaustion) back off
                    // instead of spinning.
                    error!(error = %e, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Accept loop over TCP. Requires a shared-secret `AUTH <token>` line as
/// the first client message.
pub struct TcpListenerTask {
    socket: TcpListener,
    token: String,
    ctx: Arc<ListenCtx>,
}

impl TcpListenerTask {
    pub fn new(socket: TcpListener, token: String, ctx: Arc<ListenCtx>) -> TcpListenerTask {
        TcpListenerTask { socket, token, ctx }
    }

    pub async fn run(self) {
        info!("TCP control plane listening");
        loop {
            match self.socket.accept().await {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&self.ctx);
                    let token = self.token.clone();
                    tokio::spawn(async move {
                        match authenticate(stream, &token).await {
                            Ok(stream) => {
                                if let Err(e) = handle_connection(stream, &ctx).await {
                                    debug!(error = %e, "tcp connection ended with error");
                                }
                            }
                            Err(e) => {
                                warn!(%peer, error = %e, "tcp auth failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "tcp accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Consume the `AUTH <token>` line; answer `OK` or `ERR <reason>`.
async fn authenticate<S>(stream: S, token: &str) -> Result<BufReader<S>, protocol::WireError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let line = protocol::read_line(&mut reader, &mut buf).await?;

    let authorized = matches!(
        line.as_deref().map(str::trim),
        Some(line) if line.strip_prefix("AUTH ").map(str::trim) == Some(token)
    );

    if authorized {
        reader.get_mut().write_all(b"OK\n").await?;
        reader.get_mut().flush().await?;
        Ok(reader)
    } else {
        reader.get_mut().write_all(b"ERR invalid token\n").await?;
        reader.get_mut().flush().await?;
        Err(protocol::WireError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "auth token mismatch",
        )))
    }
}

/// Serve one connection until the client closes it.
async fn handle_connection<S>(stream: S, ctx: &Arc<ListenCtx>) -> Result<(), protocol::WireError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        let line = match protocol::read_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(protocol::WireError::LineTooLong { max }) => {
                let resp = Envelope::err(format!("request exceeds {max} bytes"));
                protocol::write_line(reader.get_mut(), &resp).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                // Shape errors stay on the connection.
                let resp = Envelope::err(format!("invalid request: {e}"));
                protocol::write_line(reader.get_mut(), &resp).await?;
                continue;
            }
        };

        debug!(?request, "received request");

        if request.is_watch() {
            // Streaming mode consumes the connection.
            return watch::handle_watch(request, reader, ctx).await;
        }

        let response = dispatch(request, ctx).await;
        protocol::write_line(reader.get_mut(), &response).await?;
    }
}

/// Handle a single non-streaming request.
async fn dispatch(request: Request, ctx: &Arc<ListenCtx>) -> Envelope {
    match request {
        Request::Ping => Envelope::with(StatusPayload {
            version: PROTOCOL_VERSION.to_string(),
            agents: ctx.manager.all_agents().len(),
            uptime_secs: ctx.start_time.elapsed().as_secs(),
        }),

        Request::ListAgents => agents::list_agents(ctx),
        Request::StartAgent { name } => agents::start_agent(ctx, &name).await,
        Request::StopAgent { name } => agents::stop_agent(ctx, &name).await,
        Request::RestartAgent { name } => agents::restart_agent(ctx, &name).await,
        Request::StopAll => agents::stop_all(ctx).await,
        Request::ReloadConfig => agents::reload_config(ctx).await,
        Request::GetLogs { name, lines } => agents::get_logs(ctx, &name, lines),
        Request::GetCustomSections { name } => agents::get_custom_sections(ctx, &name),
        Request::GetAgentConfig { name } => agents::get_agent_config(ctx, &name),
        Request::AddAgent { agent } => agents::add_agent(ctx, agent),
        Request::RemoveAgent { name } => agents::remove_agent(ctx, &name).await,
        Request::LifecycleEvent { name, event, data } => {
            agents::lifecycle_event(ctx, &name, &event, data).await
        }
        Request::Command {
            agent,
            command,
            args,
            working_dir,
            timeout_ms,
        } => agents::command(ctx, &agent, &command, args, &working_dir, timeout_ms).await,
        Request::ListCommands => agents::list_commands(ctx),

        Request::SubmitToolTask { request } => tasks::submit(ctx, request),
        Request::GetToolTask { id } => tasks::get(ctx, &id),
        Request::ListToolTasks => tasks::list(ctx),
        Request::DeleteToolTask {
            id,
            call_id,
            session_id,
            agent,
        } => tasks::delete(ctx, id, call_id, session_id, agent),
        Request::ToolTaskMetrics => tasks::metrics(ctx),

        Request::GetSecret { name } => secrets::get(ctx, &name).await,
        Request::SetSecret { name, value, mode } => secrets::set(ctx, &name, &value, mode).await,
        Request::DeleteSecret { name } => secrets::delete(ctx, &name).await,
        Request::ListSecrets => secrets::list(ctx).await,

        Request::Shutdown => {
            info!("shutdown requested via control plane");
            ctx.shutdown.notify_one();
            Envelope::ok()
        }

        // Watch kinds are intercepted before dispatch.
        Request::WatchAgentState | Request::WatchAllTasks | Request::WatchToolTask { .. } => {
            Envelope::err("watch requests cannot be dispatched")
        }
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
