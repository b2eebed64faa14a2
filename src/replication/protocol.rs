//! Replication wire protocol.
//!
//! Messages travel as length-prefixed frames over any reliable byte
//! stream: a `u32` big-endian payload length followed by the
//! bincode-encoded message. The encoding is stable: WAL entries cross
//! the wire exactly as they are stored, checksum included, so a peer
//! verifies integrity end to end.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{ReplicationError, Result};
use crate::wal::WalEntry;

/// Upper bound on a single frame; anything larger is a protocol error.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Historical catch-up batch ceiling.
pub const MAX_BATCH: usize = 100;

/// Client → server messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncRequest {
    /// Opens a subscription for one tenant from a watermark.
    Subscribe {
        /// Tenant whose WAL to stream.
        tenant: String,
        /// Identifier of the subscribing node or device.
        device_id: String,
        /// Highest sequence the subscriber has durably applied.
        watermark: u64,
        /// Shared-secret token; checked when the server requires one.
        auth_token: Option<String>,
    },

    /// Acknowledges entries up to a sequence (informational).
    Ack {
        /// Highest applied sequence.
        seq: u64,
    },

    /// Pushes locally originated entries upstream (edge devices).
    PushOps {
        /// Entries in ascending sequence order.
        batch: Vec<WalEntry>,
    },
}

/// Server → client messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncResponse {
    /// Subscription accepted; the server's current head sequence.
    Connected {
        /// Highest committed sequence at subscribe time.
        current_seq: u64,
    },

    /// A catch-up batch of historical entries (`seq > watermark`).
    HistoricalBatch {
        /// Entries in ascending sequence order, at most [`MAX_BATCH`].
        ops: Vec<WalEntry>,
        /// First sequence in the batch.
        batch_start: u64,
        /// Last sequence in the batch.
        batch_end: u64,
    },

    /// One live entry, streamed as it is appended.
    Operation {
        /// The committed entry.
        entry: WalEntry,
    },

    /// Terminal failure; the stream closes after this message.
    Error {
        /// Machine-readable failure class.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
}

/// Failure classes a server reports before closing a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Bad or missing auth token.
    Unauthorized,
    /// The live tail lost entries; re-subscribe from a lower watermark.
    Lagged,
    /// The first frame was not a Subscribe.
    BadHandshake,
    /// Unexpected server-side failure.
    Internal,
}

/// Writes one framed message.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(message)
        .map_err(|e| ReplicationError::Protocol(format!("encode failed: {}", e)))?;
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(ReplicationError::Protocol("frame too large".to_string()).into());
    }
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .map_err(connection_err)?;
    writer.write_all(&payload).await.map_err(connection_err)?;
    writer.flush().await.map_err(connection_err)?;
    Ok(())
}

/// Reads one framed message. `Ok(None)` means the peer closed cleanly
/// between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(connection_err(e).into()),
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(ReplicationError::Protocol(format!("oversized frame: {} bytes", len)).into());
    }
    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(connection_err)?;
    let message = bincode::deserialize(&payload)
        .map_err(|e| ReplicationError::Protocol(format!("decode failed: {}", e)))?;
    Ok(Some(message))
}

fn connection_err(e: std::io::Error) -> ReplicationError {
    ReplicationError::Connection(e.to_string())
}
