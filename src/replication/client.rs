//! Replication client: subscribes to a peer and applies its WAL.
//!
//! One session covers one `(peer, tenant)` pair. The client resumes from
//! its durably persisted watermark, verifies every entry's checksum,
//! enforces sequence density, applies through the engine's
//! last-write-wins path, and checkpoints after each applied entry. Any
//! integrity failure tears the stream down; the next session resumes
//! from the checkpoint.

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

use super::protocol::{read_frame, write_frame, SyncRequest, SyncResponse};
use crate::db::{RemDb, TenantShard};
use crate::error::{RemError, ReplicationError, Result};
use crate::wal::WalEntry;

/// A peer this node replicates a tenant from.
#[derive(Clone, Debug)]
pub struct Peer {
    /// Stable peer identifier (the checkpoint key).
    pub id: String,
    /// `host:port` of the peer's replication listener.
    pub addr: String,
}

impl Peer {
    /// Creates a peer descriptor.
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
        }
    }
}

/// Subscribes once and applies history until caught up to the peer's
/// head at subscribe time, then disconnects.
///
/// Returns the watermark reached. This is the catch-up primitive;
/// [`replicate_from`] wraps it with live streaming and reconnects.
#[instrument(skip(db), fields(tenant, peer = %peer.id))]
pub async fn sync_once(db: &Arc<RemDb>, tenant: &str, peer: &Peer) -> Result<u64> {
    let shard = db.shard(tenant)?;
    let mut session = Session::connect(db, &shard, tenant, peer).await?;
    while session.watermark < session.peer_head {
        let Some(frame) = read_frame::<_, SyncResponse>(&mut session.reader).await? else {
            return Err(ReplicationError::Connection(
                "peer closed before catch-up completed".to_string(),
            )
            .into());
        };
        session.handle(frame).await?;
    }
    info!(watermark = session.watermark, "catch-up complete");
    Ok(session.watermark)
}

/// Continuously replicates a tenant from a peer: catch-up, live tail,
/// reconnect with exponential backoff on any failure.
///
/// Runs until the task is aborted. Spawn it on the host runtime:
///
/// ```rust,ignore
/// let handle = tokio::spawn(replicate_from(db, "acme".into(), peer));
/// ```
pub async fn replicate_from(db: Arc<RemDb>, tenant: String, peer: Peer) {
    let mut backoff = db.config().replication.reconnect_backoff;
    let max_backoff = db.config().replication.max_reconnect_backoff;

    loop {
        match run_live_session(&db, &tenant, &peer).await {
            Ok(()) => {
                // Peer closed cleanly; retry at base cadence.
                backoff = db.config().replication.reconnect_backoff;
            }
            Err(e) => {
                warn!(tenant, peer = %peer.id, error = %e, "replication session failed");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn run_live_session(db: &Arc<RemDb>, tenant: &str, peer: &Peer) -> Result<()> {
    let shard = db.shard(tenant)?;
    let mut session = Session::connect(db, &shard, tenant, peer).await?;
    loop {
        let Some(frame) = read_frame::<_, SyncResponse>(&mut session.reader).await? else {
            return Ok(());
        };
        session.handle(frame).await?;
    }
}

/// One subscribed connection.
struct Session {
    shard: Arc<TenantShard>,
    peer_id: String,
    reader: tokio::net::tcp::OwnedReadHalf,
    writer: tokio::net::tcp::OwnedWriteHalf,
    /// Highest sequence durably applied from this peer.
    watermark: u64,
    /// Peer head at subscribe time (catch-up target).
    peer_head: u64,
}

impl Session {
    async fn connect(
        db: &Arc<RemDb>,
        shard: &Arc<TenantShard>,
        tenant: &str,
        peer: &Peer,
    ) -> Result<Self> {
        let watermark = shard.peer_watermark(&peer.id)?;
        let stream = TcpStream::connect(&peer.addr)
            .await
            .map_err(|e| ReplicationError::Connection(e.to_string()))?;
        let (reader, mut writer) = stream.into_split();

        write_frame(
            &mut writer,
            &SyncRequest::Subscribe {
                tenant: tenant.to_string(),
                device_id: db.config().node_id.clone(),
                watermark,
                auth_token: db.config().replication.auth_token.clone(),
            },
        )
        .await?;

        let mut session = Self {
            shard: Arc::clone(shard),
            peer_id: peer.id.clone(),
            reader,
            writer,
            watermark,
            peer_head: watermark,
        };

        match read_frame::<_, SyncResponse>(&mut session.reader).await? {
            Some(SyncResponse::Connected { current_seq }) => {
                debug!(watermark, current_seq, "subscribed");
                session.peer_head = current_seq;
                Ok(session)
            }
            Some(SyncResponse::Error { code, message }) => {
                Err(ReplicationError::Rejected(format!("{:?}: {}", code, message)).into())
            }
            Some(other) => Err(ReplicationError::Protocol(format!(
                "expected Connected, got {:?}",
                other
            ))
            .into()),
            None => Err(ReplicationError::Connection(
                "peer closed during handshake".to_string(),
            )
            .into()),
        }
    }

    async fn handle(&mut self, frame: SyncResponse) -> Result<()> {
        match frame {
            SyncResponse::HistoricalBatch { ops, batch_end, .. } => {
                for entry in ops {
                    self.apply(entry)?;
                }
                write_frame(&mut self.writer, &SyncRequest::Ack { seq: batch_end }).await?;
                Ok(())
            }
            SyncResponse::Operation { entry } => {
                let seq = entry.seq;
                self.apply(entry)?;
                write_frame(&mut self.writer, &SyncRequest::Ack { seq }).await?;
                Ok(())
            }
            SyncResponse::Error { code, message } => {
                Err(ReplicationError::Rejected(format!("{:?}: {}", code, message)).into())
            }
            SyncResponse::Connected { .. } => Err(ReplicationError::Protocol(
                "unexpected Connected after handshake".to_string(),
            )
            .into()),
        }
    }

    /// Verifies and applies one entry, advancing the durable watermark.
    fn apply(&mut self, entry: WalEntry) -> Result<()> {
        entry.verify_or_err()?;

        if entry.seq <= self.watermark {
            // Replay overlap after a reconnect; already applied.
            return Ok(());
        }
        if entry.seq != self.watermark + 1 {
            // A gap means this stream lost data; fail it and let the
            // next subscribe catch up from the durable watermark.
            return Err(RemError::Replication(ReplicationError::SequenceGap {
                expected: self.watermark + 1,
                got: entry.seq,
            }));
        }

        self.shard.apply_remote(&entry)?;
        self.watermark = entry.seq;
        self.shard.set_peer_watermark(&self.peer_id, self.watermark)?;
        Ok(())
    }
}
