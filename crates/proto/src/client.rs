// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol client: attaches to a child's pipes, dispatches inbound frames
//! to a handler, and correlates daemon-issued commands with their responses.

use crate::codec::{decode_line, encode_frame, Decoded, FrameReader};
use crate::message::FramedMessage;
use crate::ProtocolError;
use herd_core::{normalize_registry, CommandDescriptor, SidebarSection};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Callbacks for unsolicited messages from the child.
///
/// Default implementations drop the message, so implementors wire only
/// what they observe.
pub trait ProtocolHandler: Send + Sync + 'static {
    fn on_ready(&self, _pid: u32, _version: &str) {}
    fn on_log(&self, _level: &str, _message: &str, _fields: Option<&Value>) {}
    fn on_event(&self, _name: &str, _data: Option<&Value>) {}
    fn on_error(&self, _message: &str, _code: Option<i64>) {}
    fn on_system_prompt(&self, _text: &str) {}
    fn on_description(&self, _text: &str) {}
    fn on_sidebar_section(&self, _section: SidebarSection) {}
    fn on_command_registry(&self, _commands: &[CommandDescriptor]) {}
    /// Stdout bytes that were not protocol framing.
    fn on_raw_output(&self, _line: &str) {}
}

/// Progress update delivered while a command is in flight. Callbacks run
/// on the protocol's reader task, not the caller's.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub text: String,
    pub metadata: Option<Value>,
    pub status: Option<String>,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Terminal outcome of a command request.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

struct PendingRequest {
    slot: oneshot::Sender<CommandResponse>,
    on_progress: Option<ProgressFn>,
}

type WriterSlot = tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>;

/// One protocol instance, attached to a single child's pipes for the
/// lifetime of that child.
pub struct Protocol {
    writer: WriterSlot,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    registry: Arc<Mutex<Vec<CommandDescriptor>>>,
    next_id: AtomicU64,
    stopped: CancellationToken,
}

impl Protocol {
    /// Attach to the child's stdout/stdin and start the reader task.
    pub fn start<R, W>(stdout: R, stdin: W, handler: Arc<dyn ProtocolHandler>) -> Arc<Protocol>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let proto = Arc::new(Protocol {
            writer: tokio::sync::Mutex::new(Some(Box::new(stdin) as Box<dyn AsyncWrite + Send + Unpin>)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            stopped: CancellationToken::new(),
        });

        let pending = Arc::clone(&proto.pending);
        let registry = Arc::clone(&proto.registry);
        let stopped = proto.stopped.clone();
        tokio::spawn(async move {
            read_loop(stdout, handler, pending, registry, stopped).await;
        });

        proto
    }

    /// Send a command and wait for its response.
    ///
    /// Exactly one of response, cancellation, timeout, or protocol
    /// termination resolves the request; a response arriving after
    /// resolution is discarded without invoking any callback.
    pub async fn send_command(
        &self,
        ctx: &CancellationToken,
        name: &str,
        args: Option<Value>,
        working_dir: &str,
        timeout: Option<Duration>,
        on_progress: Option<ProgressFn>,
    ) -> Result<CommandResponse, ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();

        self.pending.lock().insert(
            id.clone(),
            PendingRequest {
                slot: tx,
                on_progress,
            },
        );

        let frame = FramedMessage::Command {
            id: id.clone(),
            name: name.to_string(),
            args,
            working_dir: working_dir.to_string(),
        };
        if let Err(e) = self.write_frame(&frame).await {
            // Release the id so a stray reply cannot resolve a dead slot.
            self.pending.lock().remove(&id);
            return Err(e);
        }

        // No timeout means the request is bounded only by ctx or termination.
        let deadline: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
            match timeout {
                Some(d) => Box::pin(tokio::time::sleep(d)),
                None => Box::pin(std::future::pending()),
            };

        tokio::select! {
            resp = rx => match resp {
                Ok(resp) => Ok(resp),
                Err(_) => Err(ProtocolError::Terminated { id }),
            },
            _ = ctx.cancelled() => {
                self.pending.lock().remove(&id);
                Err(ProtocolError::Cancelled { id })
            }
            _ = deadline => {
                self.pending.lock().remove(&id);
                Err(ProtocolError::TimedOut { id })
            }
        }
    }

    /// Send a lifecycle notification to the child.
    pub async fn send_lifecycle_event(
        &self,
        event: &str,
        data: Option<Value>,
    ) -> Result<(), ProtocolError> {
        self.write_frame(&FramedMessage::Lifecycle {
            event: event.to_string(),
            data,
        })
        .await
    }

    /// Copy of the most recently advertised, normalized command registry.
    pub fn registered_commands(&self) -> Vec<CommandDescriptor> {
        self.registry.lock().clone()
    }

    /// Stop the protocol: close the child's stdin and resolve every
    /// pending request with a terminated error.
    pub async fn stop(&self) {
        self.stopped.cancel();

        let mut writer = self.writer.lock().await;
        if let Some(mut w) = writer.take() {
            let _ = w.shutdown().await;
        }
        drop(writer);

        fail_pending(&self.pending);
    }

    async fn write_frame(&self, frame: &FramedMessage) -> Result<(), ProtocolError> {
        let bytes = encode_frame(frame)?;
        let mut writer = self.writer.lock().await;
        let w = writer.as_mut().ok_or(ProtocolError::NotAttached)?;
        w.write_all(&bytes).await?;
        w.flush().await?;
        Ok(())
    }
}

/// Drop every pending slot; receivers observe `Terminated`.
fn fail_pending(pending: &Mutex<HashMap<String, PendingRequest>>) {
    let drained: Vec<_> = pending.lock().drain().collect();
    for (id, _req) in drained {
        debug!(%id, "pending request terminated with protocol");
    }
}

async fn read_loop<R>(
    stdout: R,
    handler: Arc<dyn ProtocolHandler>,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    registry: Arc<Mutex<Vec<CommandDescriptor>>>,
    stopped: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = FrameReader::new(stdout);

    loop {
        let line = tokio::select! {
            _ = stopped.cancelled() => break,
            line = reader.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                dispatch(&line, &handler, &pending, &registry);
            }
            Ok(None) => break,
            Err(ProtocolError::LineTooLong { max }) => {
                warn!(max, "dropping oversized child line");
            }
            Err(e) => {
                // Decoder errors do not terminate the protocol.
                warn!(error = %e, "error reading child stdout");
                break;
            }
        }
    }

    fail_pending(&pending);
}

fn dispatch(
    line: &str,
    handler: &Arc<dyn ProtocolHandler>,
    pending: &Mutex<HashMap<String, PendingRequest>>,
    registry: &Mutex<Vec<CommandDescriptor>>,
) {
    let msg = match decode_line(line) {
        Decoded::Message(msg) => *msg,
        Decoded::Unknown { kind } => {
            debug!(%kind, "discarding unknown frame kind");
            return;
        }
        Decoded::Raw => {
            handler.on_raw_output(line);
            return;
        }
    };

    match msg {
        FramedMessage::Ready { pid, version } => handler.on_ready(pid, &version),
        FramedMessage::Log {
            level,
            message,
            fields,
        } => handler.on_log(&level, &message, fields.as_ref()),
        FramedMessage::Event { name, data } => handler.on_event(&name, data.as_ref()),
        FramedMessage::Error { message, code } => handler.on_error(&message, code),
        FramedMessage::SystemPrompt { text } => handler.on_system_prompt(&text),
        FramedMessage::Description { text } => handler.on_description(&text),
        FramedMessage::SidebarSection { section } => handler.on_sidebar_section(section),
        FramedMessage::CommandRegistry { commands } => {
            let normalized = normalize_registry(commands);
            *registry.lock() = normalized.clone();
            handler.on_command_registry(&normalized);
        }
        FramedMessage::Response {
            id,
            success,
            result,
            error,
        } => {
            let entry = pending.lock().remove(&id);
            match entry {
                Some(req) => {
                    let _ = req.slot.send(CommandResponse {
                        success,
                        result,
                        error,
                    });
                }
                None => debug!(%id, "dropping late response for resolved command"),
            }
        }
        FramedMessage::Progress {
            id,
            text,
            metadata,
            status,
        } => {
            // Clone the callback out so the lock is not held across it.
            let cb = pending
                .lock()
                .get(&id)
                .and_then(|req| req.on_progress.clone());
            match cb {
                Some(cb) => cb(ProgressUpdate {
                    text,
                    metadata,
                    status,
                }),
                None => debug!(%id, "progress for unknown or progress-less command"),
            }
        }
        FramedMessage::Command { .. } | FramedMessage::Lifecycle { .. } => {
            // Daemon-originated kinds are not valid on child stdout.
            debug!("discarding daemon-only frame from child");
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
