// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line framing for the control plane.
//!
//! One JSON object per line in each direction. Oversized lines are
//! consumed to their newline and rejected without dropping the
//! connection.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum bytes in one request or response line.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },
}

/// Read one line (without terminator). `Ok(None)` at end of stream.
pub async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> Result<Option<String>, WireError> {
    buf.clear();

    let mut limited = (&mut *reader).take(MAX_LINE_BYTES as u64 + 1);
    let n = limited.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }

    let terminated = buf.last() == Some(&b'\n');
    if terminated {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    if buf.len() > MAX_LINE_BYTES {
        if !terminated {
            skip_to_newline(reader).await?;
        }
        return Err(WireError::LineTooLong {
            max: MAX_LINE_BYTES,
        });
    }

    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

async fn skip_to_newline<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<(), WireError> {
    let mut scratch = Vec::with_capacity(4096);
    loop {
        scratch.clear();
        let mut limited = (&mut *reader).take(4096);
        let n = limited.read_until(b'\n', &mut scratch).await?;
        if n == 0 || scratch.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}

/// Write one value as a JSON line and flush.
pub async fn write_line<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), WireError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
