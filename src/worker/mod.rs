//! Background worker.
//!
//! One long-running task loop owns everything slow: embedding
//! generation, vector-index persistence, WAL flushes, and compaction.
//! The loop is single-threaded by design — it sequences embedding writes
//! against index snapshots, so an `upsert` can never race a `snapshot`.
//!
//! The queue is a bounded mpsc channel. A full queue never blocks a
//! writer: the task is persisted as a pending record instead and
//! re-enqueued when the tenant next opens.
//!
//! # Shutdown
//!
//! `shutdown()` closes the queue and drains it up to a grace deadline;
//! whatever remains is persisted as pending-task records (in the WAL
//! namespace, outside the replicated entry range) and re-enqueued on the
//! next open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::db::TenantShard;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::storage::{keys, Namespace};
use crate::types::EntityId;
use crate::vector::VectorSlot;

/// A unit of background work.
pub(crate) enum Task {
    /// Call the embedder and install the vector in record and index.
    GenerateEmbedding {
        shard: Arc<TenantShard>,
        id: EntityId,
        slot: VectorSlot,
        text: String,
    },
    /// Serialize one HNSW index to its snapshot file.
    SaveIndex {
        shard: Arc<TenantShard>,
        entity_type: String,
        slot: VectorSlot,
    },
    /// Load one HNSW snapshot file into the catalog.
    LoadIndex {
        shard: Arc<TenantShard>,
        entity_type: String,
        slot: VectorSlot,
    },
    /// Force the tenant's store to sync.
    FlushWal { shard: Arc<TenantShard> },
    /// Hard-remove expired tombstones.
    Compact { shard: Arc<TenantShard> },
}

impl Task {
    fn shard(&self) -> &Arc<TenantShard> {
        match self {
            Task::GenerateEmbedding { shard, .. }
            | Task::SaveIndex { shard, .. }
            | Task::LoadIndex { shard, .. }
            | Task::FlushWal { shard }
            | Task::Compact { shard } => shard,
        }
    }
}

/// Serializable form of a task, for crash-safe requeueing.
///
/// The shard is implied by the row's tenant; `LoadIndex` and `FlushWal`
/// are cheap and idempotent enough that they are simply dropped at
/// shutdown instead of persisted.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum PendingTask {
    GenerateEmbedding {
        id: EntityId,
        slot_tag: u8,
        text: String,
    },
    SaveIndex {
        entity_type: String,
        slot_tag: u8,
    },
    Compact,
}

impl PendingTask {
    fn from_task(task: &Task) -> Option<Self> {
        match task {
            Task::GenerateEmbedding { id, slot, text, .. } => Some(PendingTask::GenerateEmbedding {
                id: *id,
                slot_tag: slot.tag(),
                text: text.clone(),
            }),
            Task::SaveIndex {
                entity_type, slot, ..
            } => Some(PendingTask::SaveIndex {
                entity_type: entity_type.clone(),
                slot_tag: slot.tag(),
            }),
            Task::Compact { .. } => Some(PendingTask::Compact),
            Task::LoadIndex { .. } | Task::FlushWal { .. } => None,
        }
    }

    /// Rehydrates into a live task against the given shard.
    pub(crate) fn into_task(self, shard: Arc<TenantShard>) -> Option<Task> {
        match self {
            PendingTask::GenerateEmbedding { id, slot_tag, text } => {
                VectorSlot::from_tag(slot_tag).map(|slot| Task::GenerateEmbedding {
                    shard,
                    id,
                    slot,
                    text,
                })
            }
            PendingTask::SaveIndex {
                entity_type,
                slot_tag,
            } => VectorSlot::from_tag(slot_tag).map(|slot| Task::SaveIndex {
                shard,
                entity_type,
                slot,
            }),
            PendingTask::Compact => Some(Task::Compact { shard }),
        }
    }
}

/// Handle to the worker thread.
pub(crate) struct Worker {
    tx: mpsc::Sender<Task>,
    shutdown_tx: watch::Sender<Option<Instant>>,
    handle: Option<std::thread::JoinHandle<()>>,
    grace: Duration,
}

impl Worker {
    /// Spawns the worker thread with its own current-thread runtime.
    pub(crate) fn spawn(embedder: Arc<dyn Embedder>, config: WorkerConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel(config.queue_depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let grace = config.shutdown_grace;

        let handle = std::thread::Builder::new()
            .name("remdb-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(error = %e, "worker runtime failed to start");
                        return;
                    }
                };
                runtime.block_on(run_loop(rx, shutdown_rx, embedder, config));
            })?;

        Ok(Self {
            tx,
            shutdown_tx,
            handle: Some(handle),
            grace,
        })
    }

    /// Enqueues a task without blocking the write path.
    ///
    /// A full queue spills the task to its pending record; a closed queue
    /// (shutdown already started) does the same.
    pub(crate) fn enqueue(&self, task: Task) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task))
            | Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!("worker queue unavailable; persisting task as pending");
                persist_pending(&task);
            }
        }
    }

    /// Closes the queue, waits out the drain grace, and joins the thread.
    pub(crate) fn shutdown(mut self) {
        let deadline = Instant::now() + self.grace;
        let _ = self.shutdown_tx.send(Some(deadline));
        drop(self.tx);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("worker thread panicked during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

async fn run_loop(
    mut rx: mpsc::Receiver<Task>,
    shutdown_rx: watch::Receiver<Option<Instant>>,
    embedder: Arc<dyn Embedder>,
    config: WorkerConfig,
) {
    info!("worker started");
    while let Some(task) = rx.recv().await {
        // Past the drain deadline, everything left is persisted instead
        // of processed.
        let deadline = *shutdown_rx.borrow();
        if deadline.is_some_and(|d| Instant::now() >= d) {
            persist_pending(&task);
            while let Ok(task) = rx.try_recv() {
                persist_pending(&task);
            }
            break;
        }
        process(task, embedder.as_ref(), &config).await;
    }
    info!("worker stopped");
}

async fn process(task: Task, embedder: &dyn Embedder, config: &WorkerConfig) {
    match task {
        Task::GenerateEmbedding {
            shard,
            id,
            slot,
            text,
        } => {
            generate_embedding(&shard, id, slot, &text, embedder, config).await;
        }
        Task::SaveIndex {
            shard,
            entity_type,
            slot,
        } => {
            // No retry: the store is the source of truth, a stale snapshot
            // only costs rebuild time on the next open.
            if let Err(e) = shard.vectors.save(&entity_type, slot) {
                warn!(
                    tenant = %shard.tenant,
                    entity_type,
                    error = %e,
                    "index snapshot failed"
                );
            }
        }
        Task::LoadIndex {
            shard,
            entity_type,
            slot,
        } => {
            let metric = shard
                .registry
                .try_get(&entity_type)
                .ok()
                .flatten()
                .map(|s| s.def.metric)
                .unwrap_or_default();
            if let Err(e) = shard.vectors.load(&entity_type, slot, metric) {
                // An unreadable snapshot means searches run against an
                // empty index until vectors are rewritten; nothing else
                // can be salvaged here.
                error!(
                    tenant = %shard.tenant,
                    entity_type,
                    error = %e,
                    "index snapshot unreadable"
                );
            }
        }
        Task::FlushWal { shard } => {
            if let Err(e) = shard.entities.kv().flush() {
                warn!(tenant = %shard.tenant, error = %e, "WAL flush failed");
            }
        }
        Task::Compact { shard } => {
            match shard.compact_now() {
                Ok(removed) => {
                    if removed > 0 {
                        debug!(tenant = %shard.tenant, removed, "compaction pass finished");
                    }
                }
                Err(e) => warn!(tenant = %shard.tenant, error = %e, "compaction failed"),
            }
        }
    }
}

/// Embedding generation with bounded retries and exponential backoff.
///
/// After the final failure the task is dropped: the entity stays without
/// a vector and remains reachable by id, predicate, and lookup queries.
async fn generate_embedding(
    shard: &Arc<TenantShard>,
    id: EntityId,
    slot: VectorSlot,
    text: &str,
    embedder: &dyn Embedder,
    config: &WorkerConfig,
) {
    let mut attempt = 0u32;
    let vector = loop {
        match embedder.embed(text).await {
            Ok(vector) => break Some(vector),
            Err(e) if attempt < config.embed_retries => {
                let delay = config.retry_base_delay * 2u32.saturating_pow(attempt);
                debug!(
                    tenant = %shard.tenant,
                    %id,
                    attempt,
                    error = %e,
                    "embedding attempt failed; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    tenant = %shard.tenant,
                    %id,
                    error = %e,
                    "embedding dropped after retries"
                );
                break None;
            }
        }
    };

    if let Some(vector) = vector {
        if let Err(e) = shard.install_embedding(id, slot, vector) {
            if e.is_not_found() {
                // Deleted while the embedding was in flight; nothing to do.
                debug!(tenant = %shard.tenant, %id, "entity gone before embedding landed");
            } else {
                warn!(tenant = %shard.tenant, %id, error = %e, "embedding install failed");
            }
        }
    }

    // Clear the pending marker either way; a dropped task is dropped.
    let pending_key = keys::vector_pending(&shard.tenant, id, slot.tag());
    if let Err(e) = shard.entities.kv().delete(Namespace::VectorMeta, &pending_key) {
        warn!(tenant = %shard.tenant, %id, error = %e, "pending marker cleanup failed");
    }
}

/// Persists a task as a pending record for requeue on next open.
fn persist_pending(task: &Task) {
    let Some(pending) = PendingTask::from_task(task) else {
        return;
    };
    let shard = task.shard();
    if let Err(e) = shard.persist_pending_task(&pending) {
        warn!(tenant = %shard.tenant, error = %e, "failed to persist pending task");
    }
}
