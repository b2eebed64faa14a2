//! Replication server: accepts peer subscriptions and streams the WAL.
//!
//! Each connection subscribes to one tenant. The server first streams
//! historical entries past the subscriber's watermark in batches, then
//! switches to live mode, forwarding entries as they commit. If the
//! live tail falls behind the broadcast buffer, the server reports
//! `Lagged` style recovery by re-entering catch-up from the last
//! sequence it sent, so the client never sees a gap.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::protocol::{read_frame, write_frame, ErrorCode, SyncRequest, SyncResponse, MAX_BATCH};
use crate::db::RemDb;
use crate::error::{ReplicationError, Result};

/// A running replication listener.
///
/// Dropping the handle aborts the accept loop; open connections close on
/// their next I/O.
pub struct ReplicationServer {
    local_addr: SocketAddr,
    accept_task: tokio::task::JoinHandle<()>,
}

impl ReplicationServer {
    /// Binds a listener and starts accepting subscriptions.
    ///
    /// Bind to port 0 to let the OS choose (tests do).
    #[instrument(skip(db))]
    pub async fn bind(db: Arc<RemDb>, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ReplicationError::Connection(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ReplicationError::Connection(e.to_string()))?;
        info!(%local_addr, "replication server listening");

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "replication peer connected");
                        let db = Arc::clone(&db);
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(db, stream).await {
                                debug!(%peer, error = %e, "replication connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    /// The bound address (useful after binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ReplicationServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(db: Arc<RemDb>, stream: TcpStream) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    // Handshake: the first frame must be a Subscribe.
    let Some(request) = read_frame::<_, SyncRequest>(&mut reader).await? else {
        return Ok(());
    };
    let SyncRequest::Subscribe {
        tenant,
        device_id,
        watermark,
        auth_token,
    } = request
    else {
        send_error(&mut writer, ErrorCode::BadHandshake, "expected Subscribe").await;
        return Ok(());
    };

    if let Some(required) = &db.config().replication.auth_token {
        if auth_token.as_deref() != Some(required.as_str()) {
            send_error(&mut writer, ErrorCode::Unauthorized, "bad auth token").await;
            return Ok(());
        }
    }

    let shard = match db.shard(&tenant) {
        Ok(shard) => shard,
        Err(e) => {
            send_error(&mut writer, ErrorCode::Internal, &e.to_string()).await;
            return Ok(());
        }
    };

    // Subscribe to the live tail before catch-up so nothing committed in
    // between is missed; duplicates are filtered by sequence below.
    let mut live = shard.entities.subscribe_wal();
    let current_seq = shard.entities.current_seq();
    write_frame(&mut writer, &SyncResponse::Connected { current_seq }).await?;
    info!(tenant, device_id, watermark, current_seq, "subscription accepted");

    // Client frames flow through a channel: mpsc recv is safe to race
    // against the broadcast in select!, a raw frame read is not (dropping
    // it mid-read would desync the stream).
    let (frame_tx, mut frames) = tokio::sync::mpsc::channel::<SyncRequest>(32);
    let pump = tokio::spawn(async move {
        loop {
            match read_frame::<_, SyncRequest>(&mut reader).await {
                Ok(Some(frame)) => {
                    if frame_tx.send(frame).await.is_err() {
                        return;
                    }
                }
                Ok(None) | Err(_) => return,
            }
        }
    });
    // The pump owns the read half; abort it when the connection ends.
    let _pump_guard = AbortOnDrop(pump);

    let batch_size = db.config().replication.batch_size.clamp(1, MAX_BATCH);
    let mut last_sent = watermark;
    loop {
        // Catch-up: stream history until the store has nothing newer.
        loop {
            let ops = shard.entities.wal_entries_after(last_sent, batch_size)?;
            let Some(last) = ops.last() else {
                break;
            };
            let batch = SyncResponse::HistoricalBatch {
                batch_start: ops[0].seq,
                batch_end: last.seq,
                ops: ops.clone(),
            };
            last_sent = last.seq;
            write_frame(&mut writer, &batch).await?;
        }

        // Live mode: forward fresh commits, service client frames.
        let resync =
            live_loop(&shard, &mut frames, &mut writer, &mut live, &mut last_sent).await?;
        if !resync {
            return Ok(());
        }
        // A lagged tail falls back to catch-up from last_sent.
    }
}

/// Aborts a task when the owning connection handler returns.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs live forwarding until the client disconnects (`Ok(false)`) or the
/// tail needs a catch-up pass (`Ok(true)`).
async fn live_loop(
    shard: &Arc<crate::db::TenantShard>,
    frames: &mut tokio::sync::mpsc::Receiver<SyncRequest>,
    writer: &mut OwnedWriteHalf,
    live: &mut broadcast::Receiver<crate::wal::WalEntry>,
    last_sent: &mut u64,
) -> Result<bool> {
    loop {
        tokio::select! {
            received = live.recv() => {
                match received {
                    Ok(entry) => {
                        if entry.seq <= *last_sent {
                            continue; // already sent during catch-up
                        }
                        if entry.seq != *last_sent + 1 {
                            return Ok(true); // hole: refill from storage
                        }
                        *last_sent = entry.seq;
                        write_frame(writer, &SyncResponse::Operation { entry }).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "live tail lagged; re-entering catch-up");
                        return Ok(true);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Ok(false);
                    }
                }
            }
            frame = frames.recv() => {
                match frame {
                    None => return Ok(false),
                    Some(SyncRequest::Ack { seq }) => {
                        debug!(seq, "peer acknowledged");
                    }
                    Some(SyncRequest::PushOps { batch }) => {
                        // Edge devices push their writes over the same
                        // stream; each entry goes through the normal
                        // verified apply path.
                        for entry in batch {
                            entry.verify_or_err()?;
                            if let Err(e) = shard.apply_remote(&entry) {
                                warn!(error = %e, "push apply failed");
                                send_error(writer, ErrorCode::Internal, &e.to_string()).await;
                                return Ok(false);
                            }
                        }
                    }
                    Some(SyncRequest::Subscribe { .. }) => {
                        send_error(writer, ErrorCode::BadHandshake, "already subscribed").await;
                        return Ok(false);
                    }
                }
            }
        }
    }
}

async fn send_error(writer: &mut OwnedWriteHalf, code: ErrorCode, message: &str) {
    let _ = write_frame(
        writer,
        &SyncResponse::Error {
            code,
            message: message.to_string(),
        },
    )
    .await;
}
