//! RemDb main struct and lifecycle operations.
//!
//! [`RemDb`] is the primary interface for interacting with the engine:
//!
//! - Opening and closing the store directory
//! - Schema registration and retrieval
//! - Entity and edge CRUD, fuzzy lookup, graph traversal
//! - The SQL-like [`query`](RemDb::query) surface
//! - Replication entry points
//!
//! # Tenancy
//!
//! Every operation takes a `tenant` identifier. The first touch of a
//! tenant lazily opens its shard: a subdirectory with its own store
//! file, schema cache, vector catalog, and WAL sequence. No operation
//! can cross tenants; keys carry the tenant prefix end to end.
//!
//! # Thread Safety
//!
//! `RemDb` is `Send + Sync` and can be shared across threads with `Arc`.
//! Writes within a tenant are serialized; reads run concurrently against
//! MVCC snapshots.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::config::{is_identifier, Config};
use crate::embedding::Embedder;
use crate::entity::{lookup, Direction, Edge, Entity, EntityStore};
use crate::error::{RemError, Result, StorageError, ValidationError};
use crate::graph::{self, TraversalOrder};
use crate::query::exec::ExecContext;
use crate::query::{parse, QueryResult};
use crate::schema::{SchemaCategory, SchemaDefinition, SchemaRecord, SchemaRegistry};
use crate::storage::{keys, open_storage, BatchOp, KvStore, Namespace};
use crate::types::{EntityId, Timestamp, Value};
use crate::vector::{VectorCatalog, VectorSlot};
use crate::wal::{WalEntry, WalOp};
use crate::worker::{PendingTask, Task, Worker};

/// One tenant's stores, opened lazily on first use.
pub(crate) struct TenantShard {
    /// Tenant identifier.
    pub(crate) tenant: String,

    /// Entity/edge storage and the WAL.
    pub(crate) entities: EntityStore,

    /// Compiled schema cache.
    pub(crate) registry: SchemaRegistry,

    /// Per-(type, slot) HNSW indexes.
    pub(crate) vectors: VectorCatalog,

    /// Retention window for compaction, from the engine config.
    retention_millis: i64,
}

impl TenantShard {
    /// Installs a worker-computed vector: record write, index upsert.
    pub(crate) fn install_embedding(
        &self,
        id: EntityId,
        slot: VectorSlot,
        vector: Vec<f32>,
    ) -> Result<()> {
        let entity = self.entities.set_embedding(id, slot, vector.clone())?;
        let schema = self.registry.try_get(&entity.entity_type)?;
        let (dimension, metric) = match &schema {
            Some(record) => (
                record.def.dimension_for_slot(slot).unwrap_or(vector.len()),
                record.def.metric,
            ),
            None => (vector.len(), Default::default()),
        };
        let index =
            self.vectors
                .get_or_create(&entity.entity_type, slot, dimension, metric)?;
        index.upsert(id, vector)?;
        Ok(())
    }

    /// Runs one compaction pass over expired tombstones.
    pub(crate) fn compact_now(&self) -> Result<usize> {
        let cutoff = Timestamp::from_millis(
            Timestamp::now().as_millis().saturating_sub(self.retention_millis),
        );
        let removed = self.entities.compact(cutoff)?;
        for (entity_type, id) in &removed {
            self.vectors.remove_entity(entity_type, *id)?;
        }
        Ok(removed.len())
    }

    /// Appends a pending-task record for requeue on next open.
    pub(crate) fn persist_pending_task(&self, pending: &PendingTask) -> Result<()> {
        let prefix = keys::wal_pending_prefix(&self.tenant);
        let rows = self.entities.kv().prefix_iter(Namespace::Wal, &prefix)?;
        let next = rows
            .last()
            .and_then(|(key, _)| keys::wal_seq_from_key(key, prefix.len()))
            .map_or(0, |n| n + 1);
        let value =
            bincode::serialize(pending).map_err(StorageError::from)?;
        self.entities
            .kv()
            .put(Namespace::Wal, &keys::wal_pending(&self.tenant, next), &value)
    }

    /// Drains persisted pending-task records.
    fn take_pending_tasks(&self) -> Result<Vec<PendingTask>> {
        let prefix = keys::wal_pending_prefix(&self.tenant);
        let rows = self.entities.kv().prefix_iter(Namespace::Wal, &prefix)?;
        let mut pending = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            match bincode::deserialize(&value) {
                Ok(task) => pending.push(task),
                Err(e) => warn!(tenant = %self.tenant, error = %e, "undecodable pending task dropped"),
            }
            self.entities.kv().delete(Namespace::Wal, &key)?;
        }
        Ok(pending)
    }

    /// Replication watermark persisted for a peer.
    pub(crate) fn peer_watermark(&self, peer_id: &str) -> Result<u64> {
        let key = keys::wal_peer_checkpoint(&self.tenant, peer_id);
        Ok(match self.entities.kv().get(Namespace::Wal, &key)? {
            Some(bytes) => crate::wal::decode_seq(&bytes)?,
            None => 0,
        })
    }

    /// Durably records the watermark for a peer.
    pub(crate) fn set_peer_watermark(&self, peer_id: &str, seq: u64) -> Result<()> {
        let key = keys::wal_peer_checkpoint(&self.tenant, peer_id);
        self.entities
            .kv()
            .put(Namespace::Wal, &key, &crate::wal::encode_seq(seq))
    }

    /// Applies one verified entry from a replication stream.
    ///
    /// Returns false when the entry was suppressed: an echo of a record
    /// this node already holds, or a loser under last-write-wins
    /// `(modified_at desc, origin asc)`. Applied entries are re-logged
    /// locally so downstream peers converge too.
    pub(crate) fn apply_remote(&self, entry: &WalEntry) -> Result<bool> {
        match entry.ns {
            Namespace::Default => self.apply_remote_entity(entry),
            Namespace::Edges => self.apply_remote_edge(entry),
            // Replicated streams only carry record namespaces.
            _ => Ok(false),
        }
    }

    fn apply_remote_entity(&self, entry: &WalEntry) -> Result<bool> {
        let existing_bytes = self.entities.kv().get(Namespace::Default, &entry.key)?;
        let existing = existing_bytes
            .as_ref()
            .map(|bytes| Entity::decode(bytes))
            .transpose()?;

        let Some(value) = &entry.value else {
            // Hard delete (remote compaction).
            if existing.is_none() {
                return Ok(false);
            }
            let mut derived = Vec::new();
            if let Some(old) = &existing {
                derived.push(BatchOp::delete(
                    Namespace::Indexes,
                    keys::id_directory(&self.tenant, old.id),
                ));
                self.vectors.remove_entity(&old.entity_type, old.id)?;
            }
            self.entities.apply_foreign(
                WalOp::Delete,
                Namespace::Default,
                entry.key.clone(),
                None,
                derived,
            )?;
            return Ok(true);
        };

        // Echo: byte-identical state already present; never re-logged,
        // which is what terminates replication loops.
        if existing_bytes.as_deref() == Some(value.as_slice()) {
            return Ok(false);
        }

        let incoming = Entity::decode(value)?;

        if let Some(old) = &existing {
            // Last-write-wins: newer modified_at wins; timestamp ties go
            // to the smaller origin node id. An equal (time, origin) pair
            // with different bytes is the same writer enriching its own
            // record (an embedding landing), so it applies.
            let incoming_wins = incoming.modified_at > old.modified_at
                || (incoming.modified_at == old.modified_at && incoming.origin <= old.origin);
            if !incoming_wins {
                return Ok(false);
            }
        }

        // Schema records refresh the registry cache as they land.
        if incoming.entity_type == keys::SCHEMA_TYPE {
            match serde_json::from_value::<SchemaDefinition>(incoming.properties.to_json()) {
                Ok(def) => {
                    if let Err(e) = self.registry.install(def) {
                        warn!(tenant = %self.tenant, error = %e, "replicated schema does not compile");
                    }
                }
                Err(e) => {
                    warn!(tenant = %self.tenant, error = %e, "replicated schema entity undecodable")
                }
            }
        }

        // Derived rows are recomputed locally; they are never streamed.
        let schema = self.registry.try_get(&incoming.entity_type)?;
        let mut derived = vec![BatchOp::put(
            Namespace::Indexes,
            keys::id_directory(&self.tenant, incoming.id),
            incoming.entity_type.clone().into_bytes(),
        )];
        let key_field = schema.as_ref().and_then(|s| s.def.key_field.clone());
        let old_key_string = existing
            .as_ref()
            .filter(|old| !old.is_deleted())
            .and_then(|old| old.key_string(key_field.as_deref()));
        let new_key_string = if incoming.is_deleted() {
            None
        } else {
            incoming.key_string(key_field.as_deref())
        };
        derived.extend(lookup::key_rows_diff(
            self.entities.kv().as_ref(),
            &self.tenant,
            &incoming.entity_type,
            old_key_string.as_deref(),
            new_key_string.as_deref(),
            incoming.id,
        )?);
        if let Some(schema) = &schema {
            if let Some(old) = existing.as_ref().filter(|old| !old.is_deleted()) {
                for op in self.entities.index_rows_put(&schema.def, old) {
                    if let BatchOp::Put { ns, key, .. } = op {
                        derived.push(BatchOp::delete(ns, key));
                    }
                }
            }
            if !incoming.is_deleted() {
                derived.extend(self.entities.index_rows_put(&schema.def, &incoming));
            }
        }

        self.entities.apply_foreign(
            WalOp::Put,
            Namespace::Default,
            entry.key.clone(),
            Some(value.clone()),
            derived,
        )?;

        // Vector state follows the record.
        if incoming.is_deleted() {
            self.vectors.remove_entity(&incoming.entity_type, incoming.id)?;
        } else {
            for slot in [VectorSlot::Default, VectorSlot::Alt] {
                if let Some(vector) = incoming.vector(slot) {
                    let (dimension, metric) = match &schema {
                        Some(record) => (
                            record.def.dimension_for_slot(slot).unwrap_or(vector.len()),
                            record.def.metric,
                        ),
                        None => (vector.len(), Default::default()),
                    };
                    let index = self.vectors.get_or_create(
                        &incoming.entity_type,
                        slot,
                        dimension,
                        metric,
                    )?;
                    index.upsert(incoming.id, vector.clone())?;
                }
            }
        }

        Ok(true)
    }

    fn apply_remote_edge(&self, entry: &WalEntry) -> Result<bool> {
        let existing = self.entities.kv().get(Namespace::Edges, &entry.key)?;
        match &entry.value {
            Some(value) => {
                if existing.as_deref() == Some(value.as_slice()) {
                    return Ok(false);
                }
                // Endpoint existence is not re-checked on replay; the
                // origin validated at write time and record order may
                // interleave across entities.
                self.entities.apply_foreign(
                    WalOp::Put,
                    Namespace::Edges,
                    entry.key.clone(),
                    Some(value.clone()),
                    Vec::new(),
                )?;
                Ok(true)
            }
            None => {
                if existing.is_none() {
                    return Ok(false);
                }
                self.entities.apply_foreign(
                    WalOp::Delete,
                    Namespace::Edges,
                    entry.key.clone(),
                    None,
                    Vec::new(),
                )?;
                Ok(true)
            }
        }
    }
}

impl std::fmt::Debug for TenantShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantShard")
            .field("tenant", &self.tenant)
            .field("seq", &self.entities.current_seq())
            .finish_non_exhaustive()
    }
}

/// The embedded REM storage engine.
///
/// # Ownership
///
/// `RemDb` owns its shards, worker, and embedder. [`close`](Self::close)
/// consumes the handle, drains the worker, and snapshots vector indexes.
/// For replication servers, wrap the handle in `Arc` and let drop do the
/// flushing (the store is durable on every commit regardless).
pub struct RemDb {
    root: PathBuf,
    config: Config,
    embedder: Arc<dyn Embedder>,
    worker: Option<Worker>,
    shards: RwLock<HashMap<String, Arc<TenantShard>>>,
}

impl RemDb {
    /// Opens or creates an engine rooted at `root`.
    ///
    /// Tenants materialize lazily as subdirectories on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the root
    /// directory cannot be created.
    #[instrument(skip(config, embedder), fields(root = %root.as_ref().display()))]
    pub fn open(
        root: impl AsRef<Path>,
        config: Config,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let worker = Worker::spawn(Arc::clone(&embedder), config.worker.clone())?;

        info!(node_id = %config.node_id, "remdb opened");
        Ok(Self {
            root,
            config,
            embedder,
            worker: Some(worker),
            shards: RwLock::new(HashMap::new()),
        })
    }

    /// Closes the engine: drains the worker, snapshots every vector
    /// index, and releases the stores.
    #[instrument(skip(self))]
    pub fn close(mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        let shards = self
            .shards
            .read()
            .map_err(|_| RemError::config("shard map lock poisoned"))?;
        for shard in shards.values() {
            shard.vectors.save_all();
        }
        drop(shards);
        info!("remdb closed");
        Ok(())
    }

    /// Engine configuration.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Root data directory.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========================================================================
    // Shard lifecycle
    // ========================================================================

    /// Returns the shard for a tenant, opening it on first use.
    pub(crate) fn shard(&self, tenant: &str) -> Result<Arc<TenantShard>> {
        if !is_identifier(tenant) {
            return Err(ValidationError::invalid_field(
                "tenant",
                "must be a valid identifier",
            )
            .into());
        }

        if let Some(shard) = self
            .shards
            .read()
            .map_err(|_| RemError::config("shard map lock poisoned"))?
            .get(tenant)
        {
            return Ok(Arc::clone(shard));
        }

        let mut shards = self
            .shards
            .write()
            .map_err(|_| RemError::config("shard map lock poisoned"))?;
        if let Some(shard) = shards.get(tenant) {
            return Ok(Arc::clone(shard));
        }

        let shard = Arc::new(self.open_shard(tenant)?);
        shards.insert(tenant.to_string(), Arc::clone(&shard));
        drop(shards);

        self.requeue_pending(&shard)?;
        Ok(shard)
    }

    #[instrument(skip(self))]
    fn open_shard(&self, tenant: &str) -> Result<TenantShard> {
        let dir = self.root.join(tenant);
        let kv: Arc<dyn KvStore> = Arc::from(open_storage(dir.join("data.redb"))?);
        let entities = EntityStore::open(
            tenant.to_string(),
            self.config.node_id.clone(),
            Arc::clone(&kv),
        )?;

        // Warm the schema cache from persisted schema entities.
        let registry = SchemaRegistry::new();
        for def in entities.load_schema_entities()? {
            let name = def.name.clone();
            if let Err(e) = registry.install(def) {
                warn!(tenant, schema = %name, error = %e, "stored schema does not compile; skipped");
            }
        }

        let vectors = VectorCatalog::new(dir.join("vector_meta"), self.config.hnsw.clone());

        let shard = TenantShard {
            tenant: tenant.to_string(),
            entities,
            registry,
            vectors,
            retention_millis: self.config.compaction.retention.as_millis() as i64,
        };

        // Vector indexes: snapshot first, then top up from records (the
        // store is the source of truth; the snapshot only saves rebuild
        // time).
        for type_name in shard.registry.type_names()? {
            let Some(record) = shard.registry.try_get(&type_name)? else {
                continue;
            };
            for slot in [VectorSlot::Default, VectorSlot::Alt] {
                if record.def.dimension_for_slot(slot).is_none() {
                    continue;
                }
                if let Err(e) = shard.vectors.load(&type_name, slot, record.def.metric) {
                    warn!(tenant, entity_type = %type_name, error = %e, "snapshot unreadable; rebuilding");
                }
            }
            self.rebuild_vectors_from_records(&shard, &record)?;
        }

        info!(tenant, seq = shard.entities.current_seq(), "tenant shard opened");
        Ok(shard)
    }

    /// Upserts any stored vector missing from the in-memory indexes.
    fn rebuild_vectors_from_records(
        &self,
        shard: &TenantShard,
        record: &Arc<SchemaRecord>,
    ) -> Result<()> {
        let entities = shard.entities.scan_type(&record.def.name)?;
        for entity in entities {
            for slot in [VectorSlot::Default, VectorSlot::Alt] {
                let Some(vector) = entity.vector(slot) else {
                    continue;
                };
                let Some(dimension) = record.def.dimension_for_slot(slot) else {
                    continue;
                };
                let index = shard.vectors.get_or_create(
                    &record.def.name,
                    slot,
                    dimension,
                    record.def.metric,
                )?;
                if !index.contains(entity.id) {
                    index.upsert(entity.id, vector.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Re-enqueues work persisted at the last shutdown.
    fn requeue_pending(&self, shard: &Arc<TenantShard>) -> Result<()> {
        let Some(worker) = &self.worker else {
            return Ok(());
        };

        let mut requeued: HashSet<(EntityId, u8)> = HashSet::new();
        for pending in shard.take_pending_tasks()? {
            if let PendingTask::GenerateEmbedding { id, slot_tag, .. } = &pending {
                requeued.insert((*id, *slot_tag));
            }
            if let Some(task) = pending.into_task(Arc::clone(shard)) {
                worker.enqueue(task);
            }
        }

        // Embedding markers written at insert time cover tasks that never
        // reached the shutdown drain (crash), minus those just requeued.
        let prefix = keys::vector_pending_prefix(&shard.tenant);
        let rows = shard.entities.kv().prefix_iter(Namespace::VectorMeta, &prefix)?;
        for (key, value) in rows {
            let tail = &key[prefix.len()..];
            if tail.len() != 17 {
                continue;
            }
            let id = EntityId::from_bytes(tail[..16].try_into().unwrap_or_default());
            let slot_tag = tail[16];
            if requeued.contains(&(id, slot_tag)) {
                continue;
            }
            let (Some(slot), Ok(text)) = (
                VectorSlot::from_tag(slot_tag),
                String::from_utf8(value.clone()),
            ) else {
                continue;
            };
            worker.enqueue(Task::GenerateEmbedding {
                shard: Arc::clone(shard),
                id,
                slot,
                text,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    /// Registers a schema for a tenant, persisting it as an entity.
    ///
    /// Re-registration requires a strictly higher version.
    #[instrument(skip(self, def), fields(tenant, schema = %def.name))]
    pub fn register_schema(&self, tenant: &str, def: SchemaDefinition) -> Result<()> {
        let shard = self.shard(tenant)?;
        shard.registry.register(def.clone())?;
        shard.entities.put_schema_entity(&def)?;
        debug!(schema = %def.name, version = def.version, "schema registered");
        Ok(())
    }

    /// Retrieves a registered schema definition.
    pub fn get_schema(&self, tenant: &str, name: &str) -> Result<SchemaDefinition> {
        let shard = self.shard(tenant)?;
        Ok(shard.registry.get(name)?.def.clone())
    }

    /// Lists schemas in a category, sorted by name.
    pub fn list_schemas_by_category(
        &self,
        tenant: &str,
        category: SchemaCategory,
    ) -> Result<Vec<SchemaDefinition>> {
        let shard = self.shard(tenant)?;
        Ok(shard
            .registry
            .list_by_category(category)?
            .into_iter()
            .map(|r| r.def.clone())
            .collect())
    }

    // ========================================================================
    // Entity CRUD
    // ========================================================================

    /// Inserts an entity, durably, and enqueues its embedding work.
    pub fn insert(
        &self,
        tenant: &str,
        entity_type: &str,
        properties: serde_json::Value,
    ) -> Result<EntityId> {
        let shard = self.shard(tenant)?;
        let schema = shard.registry.get(entity_type)?;
        let entity = shard.entities.insert(&schema, properties)?;
        self.enqueue_embeddings(&shard, &schema, &entity);
        Ok(entity.id)
    }

    /// Rewrites an entity's properties.
    pub fn update(
        &self,
        tenant: &str,
        id: EntityId,
        properties: serde_json::Value,
    ) -> Result<()> {
        let shard = self.shard(tenant)?;
        let current = shard.entities.get(id)?;
        let schema = shard.registry.get(&current.entity_type)?;
        let updated = shard.entities.update(&schema, id, properties)?;
        // Embeddable text may have changed; recompute affected slots.
        self.enqueue_embeddings(&shard, &schema, &updated);
        Ok(())
    }

    /// Soft-deletes an entity.
    pub fn delete(&self, tenant: &str, id: EntityId) -> Result<()> {
        let shard = self.shard(tenant)?;
        let current = shard.entities.get(id)?;
        let schema = shard.registry.get(&current.entity_type)?;
        let deleted = shard.entities.delete(&schema, id)?;
        shard.vectors.remove_entity(&deleted.entity_type, id)?;
        Ok(())
    }

    /// Fetches a live entity by id.
    pub fn get(&self, tenant: &str, id: EntityId) -> Result<Entity> {
        self.shard(tenant)?.entities.get(id)
    }

    /// Global fuzzy lookup across all of a tenant's types.
    ///
    /// Runs the exact → prefix → BM25 cascade; see
    /// [`lookup`](crate::entity::lookup) for tier semantics.
    pub fn lookup_entity(&self, tenant: &str, query: &str) -> Result<Vec<Entity>> {
        let shard = self.shard(tenant)?;
        let types = shard.registry.type_names()?;
        Ok(
            lookup::lookup(&shard.entities, &types, query, &self.config.bm25)?
                .into_iter()
                .map(|hit| hit.entity)
                .collect(),
        )
    }

    fn enqueue_embeddings(
        &self,
        shard: &Arc<TenantShard>,
        schema: &Arc<SchemaRecord>,
        entity: &Entity,
    ) {
        let Some(worker) = &self.worker else {
            return;
        };
        for (i, field) in schema.def.embedding_fields.iter().take(2).enumerate() {
            let slot = if i == 0 {
                VectorSlot::Default
            } else {
                VectorSlot::Alt
            };
            let Some(text) = entity
                .properties
                .get_path(field)
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
            else {
                continue;
            };

            // Marker first: a crash between commit and queue still gets
            // the embedding on next open.
            let marker = keys::vector_pending(&shard.tenant, entity.id, slot.tag());
            if let Err(e) =
                shard
                    .entities
                    .kv()
                    .put(Namespace::VectorMeta, &marker, text.as_bytes())
            {
                warn!(tenant = %shard.tenant, id = %entity.id, error = %e, "pending marker write failed");
            }
            worker.enqueue(Task::GenerateEmbedding {
                shard: Arc::clone(shard),
                id: entity.id,
                slot,
                text: text.to_string(),
            });
        }
    }

    // ========================================================================
    // Edges and traversal
    // ========================================================================

    /// Inserts a directed, typed edge between two live entities.
    pub fn insert_edge(
        &self,
        tenant: &str,
        src: EntityId,
        dst: EntityId,
        edge_type: &str,
        properties: serde_json::Value,
    ) -> Result<()> {
        self.shard(tenant)?
            .entities
            .insert_edge(src, dst, edge_type, properties)?;
        Ok(())
    }

    /// Fetches the edges incident to an entity.
    pub fn get_edges(
        &self,
        tenant: &str,
        id: EntityId,
        direction: Direction,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>> {
        self.shard(tenant)?.entities.get_edges(id, direction, edge_type)
    }

    /// Walks the graph from `start` (BFS by default; see
    /// [`TraversalOrder`]).
    pub fn traverse(
        &self,
        tenant: &str,
        start: EntityId,
        depth: usize,
        direction: Direction,
        edge_type: Option<&str>,
        order: TraversalOrder,
    ) -> Result<Vec<Entity>> {
        let shard = self.shard(tenant)?;
        graph::traverse(&shard.entities, start, depth, direction, edge_type, order, None)
    }

    // ========================================================================
    // Vector search
    // ========================================================================

    /// Direct vector search over a type's default embedding.
    ///
    /// Embeds `text`, probes the HNSW index, and returns
    /// `(entity, score)` pairs, best first. Recently inserted entities
    /// may be missing until the worker finishes their embedding task.
    pub async fn search(
        &self,
        tenant: &str,
        entity_type: &str,
        text: &str,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<(Entity, f32)>> {
        let shard = self.shard(tenant)?;
        let Some(index) = shard.vectors.try_get(entity_type, VectorSlot::Default)? else {
            return Ok(Vec::new());
        };
        let query = self.embedder.embed(text).await?;
        let hits = index.search(&query, top_k, min_score)?;
        let mut out = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            match shard.entities.get(id) {
                Ok(entity) => out.push((entity, score)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Query surface
    // ========================================================================

    /// Executes one statement of the query dialect.
    ///
    /// Async because vector-first plans await the embedder; all other
    /// plans complete without suspending.
    pub async fn query(&self, tenant: &str, sql: &str) -> Result<QueryResult> {
        self.query_inner(tenant, sql, None).await
    }

    /// Executes a statement with a deadline.
    ///
    /// Expiry surfaces `DeadlineExceeded` and leaves no partial state.
    pub async fn query_with_deadline(
        &self,
        tenant: &str,
        sql: &str,
        deadline: Instant,
    ) -> Result<QueryResult> {
        self.query_inner(tenant, sql, Some(deadline)).await
    }

    async fn query_inner(
        &self,
        tenant: &str,
        sql: &str,
        deadline: Option<Instant>,
    ) -> Result<QueryResult> {
        let statement = parse(sql)?;
        let shard = self.shard(tenant)?;
        let context = ExecContext {
            store: &shard.entities,
            registry: &shard.registry,
            vectors: &shard.vectors,
            embedder: self.embedder.as_ref(),
            bm25: &self.config.bm25,
            deadline,
        };
        context.execute(statement).await
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Queues a WAL flush for a tenant.
    pub fn flush_wal(&self, tenant: &str) -> Result<()> {
        let shard = self.shard(tenant)?;
        if let Some(worker) = &self.worker {
            worker.enqueue(Task::FlushWal { shard });
        }
        Ok(())
    }

    /// Queues a compaction pass for a tenant.
    pub fn compact(&self, tenant: &str) -> Result<()> {
        let shard = self.shard(tenant)?;
        if let Some(worker) = &self.worker {
            worker.enqueue(Task::Compact { shard });
        }
        Ok(())
    }

    /// Runs a compaction pass synchronously, returning the number of
    /// entities removed.
    pub fn compact_now(&self, tenant: &str) -> Result<usize> {
        self.shard(tenant)?.compact_now()
    }

    /// Queues a vector-index snapshot for a type.
    pub fn save_index(&self, tenant: &str, entity_type: &str) -> Result<()> {
        let shard = self.shard(tenant)?;
        if let Some(worker) = &self.worker {
            for slot in [VectorSlot::Default, VectorSlot::Alt] {
                worker.enqueue(Task::SaveIndex {
                    shard: Arc::clone(&shard),
                    entity_type: entity_type.to_string(),
                    slot,
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Test Helpers
    // ========================================================================

    /// Current WAL head sequence for a tenant.
    #[doc(hidden)]
    pub fn current_seq(&self, tenant: &str) -> Result<u64> {
        Ok(self.shard(tenant)?.entities.current_seq())
    }

    /// Reads WAL entries after a sequence, for integration tests and
    /// replication verification.
    #[doc(hidden)]
    pub fn wal_entries(&self, tenant: &str, after: u64, limit: usize) -> Result<Vec<WalEntry>> {
        self.shard(tenant)?.entities.wal_entries_after(after, limit)
    }

    /// Fetches a record even if tombstoned.
    #[doc(hidden)]
    pub fn get_any(&self, tenant: &str, id: EntityId) -> Result<Option<Entity>> {
        self.shard(tenant)?.entities.get_any(id)
    }
}

impl std::fmt::Debug for RemDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shard_count = self.shards.read().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("RemDb")
            .field("root", &self.root)
            .field("node_id", &self.config.node_id)
            .field("tenants", &shard_count)
            .finish_non_exhaustive()
    }
}
