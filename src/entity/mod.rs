//! Entity and edge storage.
//!
//! The [`EntityStore`] owns the write path for one tenant: every
//! insert/update/delete validates against the registered schema, builds a
//! single atomic batch (record, secondary-index rows, fuzzy key-index
//! rows, id directory), allocates the next WAL sequence inside the same
//! batch, and commits. Durability holds before the call returns;
//! embedding generation is enqueued afterwards by the facade.
//!
//! # Write algorithm
//!
//! 1. Validate properties against the schema (reject on failure).
//! 2. Compute the new record; stamp `created_at`/`modified_at`.
//! 3. Enqueue writes: record key, secondary-index rows for
//!    `indexed_fields`, fuzzy key-index updates, the id directory row.
//! 4. Append the WAL entry with the next sequence number and checksum.
//! 5. Commit the batch.
//!
//! Secondary-index and fuzzy rows are derived state: they are rebuilt
//! from the record on replication apply and never logged themselves.

pub mod lookup;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::error::{NotFoundError, Result, StorageError, ValidationError};
use crate::schema::{SchemaDefinition, SchemaRecord};
use crate::storage::{keys, BatchOp, KvStore, Namespace};
use crate::types::{Embedding, EntityId, Timestamp, Value};
use crate::vector::VectorSlot;
use crate::wal::{decode_seq, encode_seq, WalEntry, WalOp};

/// Capacity of the per-tenant live WAL broadcast channel.
const WAL_CHANNEL_CAPACITY: usize = 1024;

/// The unit of storage. Every stored object is an entity addressed by
/// `(tenant, type, id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique id.
    pub id: EntityId,

    /// Owning isolation scope.
    pub tenant_id: String,

    /// Schema name governing this entity.
    pub entity_type: String,

    /// Display label, also fed to the fuzzy key index when the schema
    /// declares no key field.
    pub name: String,

    /// Schemaless nested property map.
    pub properties: Value,

    /// Default vector, filled asynchronously by the worker.
    pub embedding: Option<Embedding>,

    /// Alternate vector with independent dimension.
    pub embedding_alt: Option<Embedding>,

    /// Creation time.
    pub created_at: Timestamp,

    /// Last mutation time; the last-write-wins comparand.
    pub modified_at: Timestamp,

    /// Soft-delete tombstone. Set ⇒ invisible to queries, retained for
    /// replication until compaction.
    pub deleted_at: Option<Timestamp>,

    /// Node that originated the last write; last-write-wins tie-break.
    pub origin: String,
}

impl Entity {
    /// Serializes the record for storage.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self).map_err(StorageError::from)?)
    }

    /// Deserializes a stored record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)
            .map_err(|e| StorageError::corrupted(format!("undecodable entity: {}", e)))?)
    }

    /// Returns true if this record carries a tombstone.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The string this entity contributes to the fuzzy key index: the
    /// schema's key field value, falling back to `name`.
    pub fn key_string(&self, key_field: Option<&str>) -> Option<String> {
        if let Some(field) = key_field {
            if let Some(value) = self.properties.get_path(field).and_then(Value::index_repr) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        if self.name.is_empty() {
            None
        } else {
            Some(self.name.clone())
        }
    }

    /// Returns the vector stored in the given slot.
    pub fn vector(&self, slot: VectorSlot) -> Option<&Embedding> {
        match slot {
            VectorSlot::Default => self.embedding.as_ref(),
            VectorSlot::Alt => self.embedding_alt.as_ref(),
        }
    }

    /// The storage key of this record.
    pub fn record_key(&self) -> Vec<u8> {
        if self.entity_type == keys::SCHEMA_TYPE {
            keys::schema_entity(&self.tenant_id, &self.name)
        } else {
            keys::entity(&self.tenant_id, &self.entity_type, self.id)
        }
    }
}

/// A directed, typed relationship between two entities.
///
/// Addressed by `(tenant, src, dst, edge_type)`, so two entities may be
/// linked by multiple edges of different types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source entity.
    pub src_id: EntityId,

    /// Destination entity.
    pub dst_id: EntityId,

    /// Relationship type ("knows", "references", ...).
    pub edge_type: String,

    /// Optional edge payload.
    pub properties: Value,

    /// Creation time.
    pub created_at: Timestamp,
}

impl Edge {
    /// Serializes the edge for storage.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self).map_err(StorageError::from)?)
    }

    /// Deserializes a stored edge.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)
            .map_err(|e| StorageError::corrupted(format!("undecodable edge: {}", e)))?)
    }
}

/// Which edges of an entity to follow or fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Outbound edges (`src == entity`).
    Out,
    /// Inbound edges (`dst == entity`).
    In,
    /// Both directions.
    Both,
}

/// One logical WAL-bound mutation inside a commit.
pub(crate) struct RecordMutation {
    pub op: WalOp,
    pub ns: Namespace,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// CRUD and index maintenance for one tenant.
///
/// Writers are serialized by an internal lock (one writer per tenant, as
/// the concurrency model requires); reads go straight to the store's
/// MVCC snapshots.
pub struct EntityStore {
    tenant: String,
    node_id: String,
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
    /// In-memory mirror of `wal:{tenant}:seq`, maintained under the lock.
    seq: AtomicU64,
    wal_tx: broadcast::Sender<WalEntry>,
}

impl EntityStore {
    /// Opens the store for a tenant, loading the WAL sequence counter.
    pub fn open(tenant: String, node_id: String, kv: Arc<dyn KvStore>) -> Result<Self> {
        let seq = match kv.get(Namespace::Wal, &keys::wal_seq(&tenant))? {
            Some(bytes) => decode_seq(&bytes)?,
            None => 0,
        };
        let (wal_tx, _) = broadcast::channel(WAL_CHANNEL_CAPACITY);
        Ok(Self {
            tenant,
            node_id,
            kv,
            write_lock: Mutex::new(()),
            seq: AtomicU64::new(seq),
            wal_tx,
        })
    }

    /// Tenant this store belongs to.
    #[inline]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Highest committed WAL sequence.
    #[inline]
    pub fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Subscribes to live WAL entries (replication server tail).
    pub fn subscribe_wal(&self) -> broadcast::Receiver<WalEntry> {
        self.wal_tx.subscribe()
    }

    /// The underlying KV store.
    #[inline]
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Inserts a new entity of the schema's type.
    ///
    /// Properties are validated against the schema first; the committed
    /// record is returned. Embedding enqueue is the caller's concern.
    #[instrument(skip(self, schema, properties), fields(tenant = %self.tenant, entity_type = %schema.def.name))]
    pub fn insert(
        &self,
        schema: &SchemaRecord,
        properties: serde_json::Value,
    ) -> Result<Entity> {
        self.insert_with_id(schema, EntityId::new(), properties)
    }

    /// Inserts a new entity under a caller-chosen id.
    ///
    /// Fails `DuplicateId` if any record (live or tombstoned) already
    /// uses the id.
    pub fn insert_with_id(
        &self,
        schema: &SchemaRecord,
        id: EntityId,
        properties: serde_json::Value,
    ) -> Result<Entity> {
        schema.validate_payload(&properties)?;

        if self
            .kv
            .get(Namespace::Indexes, &keys::id_directory(&self.tenant, id))?
            .is_some()
        {
            return Err(ValidationError::DuplicateId(id.to_string()).into());
        }

        let now = Timestamp::now();
        let name = properties
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let entity = Entity {
            id,
            tenant_id: self.tenant.clone(),
            entity_type: schema.def.name.clone(),
            name,
            properties: Value::from_json(properties),
            embedding: None,
            embedding_alt: None,
            created_at: now,
            modified_at: now,
            deleted_at: None,
            origin: self.node_id.clone(),
        };

        let mut derived = vec![BatchOp::put(
            Namespace::Indexes,
            keys::id_directory(&self.tenant, id),
            entity.entity_type.clone().into_bytes(),
        )];
        derived.extend(self.index_rows_put(&schema.def, &entity));
        derived.extend(self.key_rows_put(&schema.def, &entity)?);

        self.commit(
            derived,
            vec![RecordMutation {
                op: WalOp::Put,
                ns: Namespace::Default,
                key: entity.record_key(),
                value: Some(entity.encode()?),
            }],
        )?;

        debug!(id = %entity.id, "entity inserted");
        Ok(entity)
    }

    /// Rewrites an entity's properties, refreshing every derived row.
    ///
    /// Stored vectors are preserved; the facade re-enqueues embedding
    /// tasks when embeddable text changed.
    #[instrument(skip(self, schema, properties), fields(tenant = %self.tenant, id = %id))]
    pub fn update(
        &self,
        schema: &SchemaRecord,
        id: EntityId,
        properties: serde_json::Value,
    ) -> Result<Entity> {
        schema.validate_payload(&properties)?;

        let old = self.get(id)?;
        let name = properties
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&old.name)
            .to_string();
        let entity = Entity {
            name,
            properties: Value::from_json(properties),
            modified_at: Timestamp::now(),
            origin: self.node_id.clone(),
            ..old.clone()
        };

        let mut derived = Vec::new();
        derived.extend(self.index_rows_delete(&schema.def, &old));
        derived.extend(self.index_rows_put(&schema.def, &entity));
        // One diff call so document frequencies move by the net delta.
        derived.extend(lookup::key_rows_diff(
            self.kv.as_ref(),
            &self.tenant,
            &entity.entity_type,
            old.key_string(schema.def.key_field.as_deref()).as_deref(),
            entity.key_string(schema.def.key_field.as_deref()).as_deref(),
            entity.id,
        )?);

        self.commit(
            derived,
            vec![RecordMutation {
                op: WalOp::Put,
                ns: Namespace::Default,
                key: entity.record_key(),
                value: Some(entity.encode()?),
            }],
        )?;

        Ok(entity)
    }

    /// Soft-deletes an entity: the record stays (tombstoned) for
    /// replication until compaction, but every derived row is dropped so
    /// the entity disappears from queries immediately.
    #[instrument(skip(self, schema), fields(tenant = %self.tenant, id = %id))]
    pub fn delete(&self, schema: &SchemaRecord, id: EntityId) -> Result<Entity> {
        let old = self.get(id)?;
        let entity = Entity {
            deleted_at: Some(Timestamp::now()),
            modified_at: Timestamp::now(),
            origin: self.node_id.clone(),
            ..old.clone()
        };

        let mut derived = Vec::new();
        derived.extend(self.index_rows_delete(&schema.def, &old));
        derived.extend(self.key_rows_delete(&schema.def, &old)?);

        self.commit(
            derived,
            vec![RecordMutation {
                op: WalOp::Put,
                ns: Namespace::Default,
                key: entity.record_key(),
                value: Some(entity.encode()?),
            }],
        )?;

        Ok(entity)
    }

    /// Fetches a live entity by id.
    pub fn get(&self, id: EntityId) -> Result<Entity> {
        match self.get_any(id)? {
            Some(entity) if !entity.is_deleted() => Ok(entity),
            _ => Err(NotFoundError::entity(id).into()),
        }
    }

    /// Fetches a record by id, tombstoned ones included.
    pub fn get_any(&self, id: EntityId) -> Result<Option<Entity>> {
        let Some(type_bytes) = self
            .kv
            .get(Namespace::Indexes, &keys::id_directory(&self.tenant, id))?
        else {
            return Ok(None);
        };
        let entity_type = String::from_utf8(type_bytes)
            .map_err(|_| StorageError::corrupted("non-utf8 id directory row"))?;
        let key = keys::entity(&self.tenant, &entity_type, id);
        match self.kv.get(Namespace::Default, &key)? {
            Some(bytes) => Ok(Some(Entity::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetches the live entities whose key-field value matches exactly
    /// (case-folded). Usually zero or one, but case-folded collisions are
    /// possible; residual predicates re-check the exact form.
    pub fn get_by_key(&self, entity_type: &str, key_value: &str) -> Result<Vec<Entity>> {
        let prefix =
            keys::keyidx_value_exact_prefix(&self.tenant, entity_type, &keys::fold(key_value));
        let rows = self.kv.prefix_iter(Namespace::Indexes, &prefix)?;
        let mut out = Vec::new();
        for (key, _) in rows {
            if let Some(id) = keys::entity_id_from_key(&key, prefix.len()) {
                if let Some(entity) = self.get_any(id)? {
                    if !entity.is_deleted() {
                        out.push(entity);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Scans all live entities of a type, ascending by id.
    pub fn scan_type(&self, entity_type: &str) -> Result<Vec<Entity>> {
        let prefix = keys::entity_type_prefix(&self.tenant, entity_type);
        let rows = self.kv.prefix_iter(Namespace::Default, &prefix)?;
        let mut out = Vec::with_capacity(rows.len());
        for (_, bytes) in rows {
            let entity = Entity::decode(&bytes)?;
            if !entity.is_deleted() {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Ids of live entities with `field == value`, via the secondary index.
    pub fn index_lookup(
        &self,
        entity_type: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<EntityId>> {
        let prefix = keys::index_value_prefix(&self.tenant, entity_type, field, value);
        let rows = self.kv.prefix_iter(Namespace::Indexes, &prefix)?;
        Ok(rows
            .iter()
            .filter_map(|(key, _)| keys::entity_id_from_key(key, prefix.len()))
            .collect())
    }

    // ========================================================================
    // Schema persistence
    // ========================================================================

    /// Persists a schema definition as an entity of type `"schema"`.
    pub fn put_schema_entity(&self, def: &SchemaDefinition) -> Result<Entity> {
        let now = Timestamp::now();
        let entity = Entity {
            id: EntityId::new(),
            tenant_id: self.tenant.clone(),
            entity_type: keys::SCHEMA_TYPE.to_string(),
            name: def.name.clone(),
            properties: Value::from_json(
                serde_json::to_value(def).map_err(|e| StorageError::serialization(e.to_string()))?,
            ),
            embedding: None,
            embedding_alt: None,
            created_at: now,
            modified_at: now,
            deleted_at: None,
            origin: self.node_id.clone(),
        };

        self.commit(
            Vec::new(),
            vec![RecordMutation {
                op: WalOp::Put,
                ns: Namespace::Default,
                key: entity.record_key(),
                value: Some(entity.encode()?),
            }],
        )?;
        Ok(entity)
    }

    /// Loads every persisted schema definition (registry warm-up on open).
    pub fn load_schema_entities(&self) -> Result<Vec<SchemaDefinition>> {
        let prefix = keys::entity_type_prefix(&self.tenant, keys::SCHEMA_TYPE);
        let rows = self.kv.prefix_iter(Namespace::Default, &prefix)?;
        let mut defs = Vec::with_capacity(rows.len());
        for (_, bytes) in rows {
            let entity = Entity::decode(&bytes)?;
            if entity.is_deleted() {
                continue;
            }
            let def: SchemaDefinition = serde_json::from_value(entity.properties.to_json())
                .map_err(|e| {
                    StorageError::corrupted(format!("undecodable schema entity: {}", e))
                })?;
            defs.push(def);
        }
        Ok(defs)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Inserts a directed, typed edge. Both endpoints must exist and be
    /// live.
    #[instrument(skip(self, properties), fields(tenant = %self.tenant, src = %src, dst = %dst, edge_type))]
    pub fn insert_edge(
        &self,
        src: EntityId,
        dst: EntityId,
        edge_type: &str,
        properties: serde_json::Value,
    ) -> Result<Edge> {
        if !crate::config::is_identifier(edge_type) {
            return Err(ValidationError::invalid_field(
                "edge_type",
                "must be a valid identifier",
            )
            .into());
        }
        // Endpoint existence check; replication replay bypasses this.
        self.get(src)?;
        self.get(dst)?;

        let edge = Edge {
            src_id: src,
            dst_id: dst,
            edge_type: edge_type.to_string(),
            properties: Value::from_json(properties),
            created_at: Timestamp::now(),
        };

        let derived = vec![BatchOp::put(
            Namespace::Edges,
            keys::edge_reverse(&self.tenant, src, dst, edge_type),
            Vec::new(),
        )];
        self.commit(
            derived,
            vec![RecordMutation {
                op: WalOp::Put,
                ns: Namespace::Edges,
                key: keys::edge(&self.tenant, src, dst, edge_type),
                value: Some(edge.encode()?),
            }],
        )?;
        Ok(edge)
    }

    /// Fetches the edges incident to an entity.
    ///
    /// `edge_type` filters when set. Inbound edges resolve through the
    /// reverse index and are returned as stored (src → dst).
    pub fn get_edges(
        &self,
        id: EntityId,
        direction: Direction,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>> {
        let mut out = Vec::new();

        if matches!(direction, Direction::Out | Direction::Both) {
            let prefix = keys::edge_src_prefix(&self.tenant, id);
            for (_, bytes) in self.kv.prefix_iter(Namespace::Edges, &prefix)? {
                let edge = Edge::decode(&bytes)?;
                if edge_type.is_none_or(|t| t == edge.edge_type) {
                    out.push(edge);
                }
            }
        }

        if matches!(direction, Direction::In | Direction::Both) {
            let prefix = keys::edge_dst_prefix(&self.tenant, id);
            for (key, _) in self.kv.prefix_iter(Namespace::Edges, &prefix)? {
                let Some((src, found_type)) = keys::edge_key_parts(&key, prefix.len()) else {
                    continue;
                };
                if edge_type.is_some_and(|t| t != found_type) {
                    continue;
                }
                let forward = keys::edge(&self.tenant, src, id, &found_type);
                if let Some(bytes) = self.kv.get(Namespace::Edges, &forward)? {
                    out.push(Edge::decode(&bytes)?);
                }
            }
        }

        Ok(out)
    }

    // ========================================================================
    // Embedding writes (worker)
    // ========================================================================

    /// Writes a computed vector into the record.
    ///
    /// Index rows are untouched and `modified_at` is preserved: filling a
    /// vector is not a content change, so it never wins a last-write-wins
    /// race against a real edit.
    pub fn set_embedding(
        &self,
        id: EntityId,
        slot: VectorSlot,
        vector: Embedding,
    ) -> Result<Entity> {
        let mut entity = self.get(id)?;
        match slot {
            VectorSlot::Default => entity.embedding = Some(vector),
            VectorSlot::Alt => entity.embedding_alt = Some(vector),
        }
        self.commit(
            Vec::new(),
            vec![RecordMutation {
                op: WalOp::Put,
                ns: Namespace::Default,
                key: entity.record_key(),
                value: Some(entity.encode()?),
            }],
        )?;
        Ok(entity)
    }

    // ========================================================================
    // Compaction
    // ========================================================================

    /// Physically removes tombstoned entities older than `cutoff`.
    ///
    /// For each expired entity the pass removes the record, its id
    /// directory row, its edges (both directions), and logs WAL DELETEs
    /// so replicas converge. Index rows were already dropped at
    /// soft-delete time. Returns `(type, id)` pairs for vector cleanup.
    #[instrument(skip(self), fields(tenant = %self.tenant))]
    pub fn compact(&self, cutoff: Timestamp) -> Result<Vec<(String, EntityId)>> {
        let prefix = keys::entity_tenant_prefix(&self.tenant);
        let rows = self.kv.prefix_iter(Namespace::Default, &prefix)?;

        let mut removed = Vec::new();
        for (_, bytes) in rows {
            let entity = Entity::decode(&bytes)?;
            let Some(deleted_at) = entity.deleted_at else {
                continue;
            };
            if deleted_at >= cutoff {
                continue;
            }

            let mut derived = vec![BatchOp::delete(
                Namespace::Indexes,
                keys::id_directory(&self.tenant, entity.id),
            )];
            let mut mutations = vec![RecordMutation {
                op: WalOp::Delete,
                ns: Namespace::Default,
                key: entity.record_key(),
                value: None,
            }];

            // Drop incident edges, logging the forward key of each.
            for edge in self.get_edges(entity.id, Direction::Both, None)? {
                mutations.push(RecordMutation {
                    op: WalOp::Delete,
                    ns: Namespace::Edges,
                    key: keys::edge(&self.tenant, edge.src_id, edge.dst_id, &edge.edge_type),
                    value: None,
                });
                derived.push(BatchOp::delete(
                    Namespace::Edges,
                    keys::edge_reverse(&self.tenant, edge.src_id, edge.dst_id, &edge.edge_type),
                ));
            }

            self.commit(derived, mutations)?;
            removed.push((entity.entity_type.clone(), entity.id));
        }

        if !removed.is_empty() {
            debug!(count = removed.len(), "compaction removed expired tombstones");
        }
        Ok(removed)
    }

    // ========================================================================
    // WAL access
    // ========================================================================

    /// Reads WAL entries with `seq > after`, at most `limit`, ascending.
    pub fn wal_entries_after(&self, after: u64, limit: usize) -> Result<Vec<WalEntry>> {
        let prefix = keys::wal_entry_prefix(&self.tenant);
        let start = keys::wal_entry(&self.tenant, after.saturating_add(1));
        let rows = self.kv.scan_from(Namespace::Wal, &start, limit)?;
        let mut out = Vec::new();
        for (key, bytes) in rows {
            if !key.starts_with(&prefix) {
                break;
            }
            out.push(WalEntry::decode(&bytes)?);
        }
        Ok(out)
    }

    /// Applies a mutation that originated on a peer.
    ///
    /// The raw key/value is written exactly as serialized (no schema
    /// validation), derived rows are recomputed, and the entry is
    /// re-logged under a fresh local sequence so chained peers converge.
    pub(crate) fn apply_foreign(
        &self,
        op: WalOp,
        ns: Namespace,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        mut derived: Vec<BatchOp>,
    ) -> Result<()> {
        // The forward edge's reverse row is derived here rather than by
        // the caller so every apply path stays consistent.
        if ns == Namespace::Edges {
            match (&value, op) {
                (Some(bytes), WalOp::Put) => {
                    let edge = Edge::decode(bytes)?;
                    derived.push(BatchOp::put(
                        Namespace::Edges,
                        keys::edge_reverse(&self.tenant, edge.src_id, edge.dst_id, &edge.edge_type),
                        Vec::new(),
                    ));
                }
                _ => {
                    if let Some((src, dst, edge_type)) =
                        keys::edge_forward_parts(&key, &self.tenant)
                    {
                        derived.push(BatchOp::delete(
                            Namespace::Edges,
                            keys::edge_reverse(&self.tenant, src, dst, &edge_type),
                        ));
                    }
                }
            }
        }
        self.commit(derived, vec![RecordMutation { op, ns, key, value }])?;
        Ok(())
    }

    // ========================================================================
    // Commit path
    // ========================================================================

    /// Commits derived rows plus WAL-bound mutations in one atomic batch.
    ///
    /// Consecutive sequence numbers are allocated under the write lock and
    /// the counter row is rewritten inside the same batch, so sequences
    /// are dense even across crashes. Committed entries are published to
    /// the live replication channel.
    pub(crate) fn commit(
        &self,
        derived: Vec<BatchOp>,
        mutations: Vec<RecordMutation>,
    ) -> Result<Vec<WalEntry>> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::transaction("write lock poisoned"))?;

        let mut seq = self.seq.load(Ordering::Acquire);
        let mut ops = derived;
        let mut entries = Vec::with_capacity(mutations.len());

        for m in mutations {
            seq += 1;
            let entry = WalEntry::new(seq, m.op, m.ns, m.key.clone(), m.value.clone());
            ops.push(match m.op {
                WalOp::Put => BatchOp::put(m.ns, m.key, m.value.unwrap_or_default()),
                WalOp::Delete => BatchOp::delete(m.ns, m.key),
            });
            ops.push(BatchOp::put(
                Namespace::Wal,
                keys::wal_entry(&self.tenant, seq),
                entry.encode()?,
            ));
            entries.push(entry);
        }

        ops.push(BatchOp::put(
            Namespace::Wal,
            keys::wal_seq(&self.tenant),
            encode_seq(seq).to_vec(),
        ));

        self.kv.batch(ops)?;
        self.seq.store(seq, Ordering::Release);

        for entry in &entries {
            // No receiver just means no live replication stream.
            let _ = self.wal_tx.send(entry.clone());
        }
        Ok(entries)
    }

    // ========================================================================
    // Derived rows
    // ========================================================================

    /// Secondary-index rows for every indexed field with a scalar value.
    pub(crate) fn index_rows_put(&self, def: &SchemaDefinition, entity: &Entity) -> Vec<BatchOp> {
        def.indexed_fields
            .iter()
            .filter_map(|field| {
                entity
                    .properties
                    .get_path(field)
                    .and_then(Value::index_repr)
                    .map(|repr| {
                        BatchOp::put(
                            Namespace::Indexes,
                            keys::index_entry(&self.tenant, &entity.entity_type, field, &repr, entity.id),
                            Vec::new(),
                        )
                    })
            })
            .collect()
    }

    fn index_rows_delete(&self, def: &SchemaDefinition, entity: &Entity) -> Vec<BatchOp> {
        def.indexed_fields
            .iter()
            .filter_map(|field| {
                entity
                    .properties
                    .get_path(field)
                    .and_then(Value::index_repr)
                    .map(|repr| {
                        BatchOp::delete(
                            Namespace::Indexes,
                            keys::index_entry(&self.tenant, &entity.entity_type, field, &repr, entity.id),
                        )
                    })
            })
            .collect()
    }

    /// Fuzzy key-index rows (value row, postings, df, corpus stats).
    pub(crate) fn key_rows_put(
        &self,
        def: &SchemaDefinition,
        entity: &Entity,
    ) -> Result<Vec<BatchOp>> {
        let Some(key_string) = entity.key_string(def.key_field.as_deref()) else {
            return Ok(Vec::new());
        };
        lookup::key_rows_put(
            self.kv.as_ref(),
            &self.tenant,
            &entity.entity_type,
            &key_string,
            entity.id,
        )
    }

    fn key_rows_delete(
        &self,
        def: &SchemaDefinition,
        entity: &Entity,
    ) -> Result<Vec<BatchOp>> {
        let Some(key_string) = entity.key_string(def.key_field.as_deref()) else {
            return Ok(Vec::new());
        };
        lookup::key_rows_delete(
            self.kv.as_ref(),
            &self.tenant,
            &entity.entity_type,
            &key_string,
            entity.id,
        )
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("tenant", &self.tenant)
            .field("seq", &self.current_seq())
            .finish_non_exhaustive()
    }
}
