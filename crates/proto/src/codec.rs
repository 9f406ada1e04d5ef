// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line framing and decode for child stdout.
//!
//! Lines are capped at [`MAX_LINE_BYTES`]; an oversized line is consumed
//! to its terminating newline and reported as an error so the stream can
//! continue with the next frame.

use crate::message::FramedMessage;
use crate::ProtocolError;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Maximum bytes in a single frame line. Children with larger payloads
/// must chunk them across multiple messages.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Outcome of decoding one stdout line.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed frame.
    Message(Box<FramedMessage>),
    /// A JSON object with an unrecognized or malformed `type`; logged and
    /// discarded by the caller.
    Unknown { kind: String },
    /// Not protocol framing at all; forwarded to the raw-output handler.
    Raw,
}

/// Decode a single line of child stdout.
pub fn decode_line(line: &str) -> Decoded {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return Decoded::Raw,
    };

    let kind = match value.get("type").and_then(|t| t.as_str()) {
        Some(kind) => kind.to_string(),
        None => return Decoded::Raw,
    };

    match serde_json::from_value::<FramedMessage>(value) {
        Ok(msg) => Decoded::Message(Box::new(msg)),
        Err(_) => Decoded::Unknown { kind },
    }
}

/// Buffered line reader with a hard per-line size cap.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::with_capacity(4096),
        }
    }

    /// Read the next line, without its terminator. Returns `Ok(None)` at
    /// end of stream and `Err(LineTooLong)` for an oversized line (which
    /// is discarded up to its newline).
    pub async fn next_line(&mut self) -> Result<Option<String>, ProtocolError> {
        self.buf.clear();

        // Bound the read so a runaway line cannot exhaust memory. The +1
        // leaves room to observe the newline of a line at exactly the cap.
        let mut limited = (&mut self.inner).take(MAX_LINE_BYTES as u64 + 1);
        let n = limited.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        let terminated = self.buf.last() == Some(&b'\n');
        if terminated {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }

        if self.buf.len() > MAX_LINE_BYTES {
            // Discard the remainder of the oversized line.
            if !terminated {
                self.skip_to_newline().await?;
            }
            return Err(ProtocolError::LineTooLong {
                max: MAX_LINE_BYTES,
            });
        }

        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    async fn skip_to_newline(&mut self) -> Result<(), ProtocolError> {
        let mut scratch = Vec::with_capacity(4096);
        loop {
            scratch.clear();
            let mut limited = (&mut self.inner).take(4096);
            let n = limited.read_until(b'\n', &mut scratch).await?;
            if n == 0 || scratch.last() == Some(&b'\n') {
                return Ok(());
            }
        }
    }
}

/// Encode a frame as a single JSON line (with trailing newline).
pub fn encode_frame(msg: &FramedMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
