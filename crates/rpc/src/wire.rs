// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format encoding/decoding for the transport.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

use crate::error::{RpcError, RpcErrorKind};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum frame size (8 MiB)
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Default timeout for single-frame control exchanges
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Encode a message to JSON bytes (without length prefix)
///
/// Use with [`write_frame`] which handles the length-prefix wire format.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, RpcError> {
    let json = serde_json::to_vec(msg)?;

    if json.len() > MAX_FRAME_SIZE {
        return Err(RpcError::new(
            RpcErrorKind::Protocol,
            format!("frame too large: {} bytes (max {})", json.len(), MAX_FRAME_SIZE),
        ));
    }

    Ok(json)
}

/// Decode a message from wire format
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a length-prefixed frame from an async reader
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, RpcError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(RpcError::new(RpcErrorKind::Reset, "connection closed"));
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(RpcError::new(
            RpcErrorKind::Protocol,
            format!("frame too large: {} bytes (max {})", len, MAX_FRAME_SIZE),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a length-prefixed frame to an async writer
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), RpcError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(RpcError::new(
            RpcErrorKind::Protocol,
            format!("frame too large: {} bytes (max {})", data.len(), MAX_FRAME_SIZE),
        ));
    }

    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode a frame with a deadline
pub async fn read_message<R, T>(reader: &mut R, timeout: Duration) -> Result<T, RpcError>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let bytes = tokio::time::timeout(timeout, read_frame(reader))
        .await
        .map_err(|_| RpcError::timeout("frame read"))??;
    decode(&bytes)
}

/// Encode and write a frame with a deadline
pub async fn write_message<W, T>(writer: &mut W, msg: &T, timeout: Duration) -> Result<(), RpcError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let data = encode(msg)?;
    tokio::time::timeout(timeout, write_frame(writer, &data))
        .await
        .map_err(|_| RpcError::timeout("frame write"))?
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
