// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed stdio protocol between the daemon and a child agent.
//!
//! Children speak newline-delimited JSON on stdout; the daemon writes
//! newline-delimited JSON to stdin. Every object carries a `type` field
//! naming the message kind. Lines that do not parse as frames fall through
//! to a raw-output handler so nothing is silently dropped.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod codec;
mod message;

pub use client::{CommandResponse, ProgressFn, ProgressUpdate, Protocol, ProtocolHandler};
pub use codec::{Decoded, FrameReader, MAX_LINE_BYTES};
pub use message::FramedMessage;

use thiserror::Error;

/// Errors surfaced by the protocol client.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line exceeds {max} bytes; larger payloads must be chunked by the child")]
    LineTooLong { max: usize },

    #[error("protocol is not attached to a child")]
    NotAttached,

    #[error("command {id} cancelled")]
    Cancelled { id: String },

    #[error("command {id} timed out")]
    TimedOut { id: String },

    #[error("protocol terminated before command {id} resolved")]
    Terminated { id: String },
}
