//! On-disk key codec.
//!
//! Every key the engine writes is built here, so the layout lives in one
//! place. Keys are byte vectors with fixed segments joined by `:`.
//!
//! # Key Layout
//!
//! ```text
//! entity:{tenant}:{type}:{uuid16}          entity record       (default)
//! entity:{tenant}:schema:{name}            schema record       (default)
//! edge:{tenant}:{src16}:{dst16}:{type}     edge record         (edges)
//! edgerev:{tenant}:{dst16}:{src16}:{type}  reverse edge index  (edges)
//! idx:{tenant}:{type}:{field}:{value}\0{uuid16}      secondary index  (indexes)
//! keyidx:{tenant}:{type}:val:{key}\0{uuid16}         lookup value row (indexes)
//! keyidx:{tenant}:{type}:term:{token}\0{uuid16}      posting row      (indexes)
//! keyidx:{tenant}:{type}:df:{token}                  doc frequency    (indexes)
//! keyidx:{tenant}:{type}:meta:count|len              corpus stats     (indexes)
//! idmap:{tenant}:{uuid16}                  uuid -> type directory     (indexes)
//! wal:{tenant}:seq                         sequence counter    (wal)
//! wal:{tenant}:entry:{seq8}                WAL entry           (wal)
//! wal:{tenant}:pending:{n8}                persisted worker task (wal)
//! wal:{tenant}:peer:{peer_id}              replication watermark (wal)
//! vpending:{tenant}:{uuid16}{slot}         queued embedding    (vector_meta)
//! ```
//!
//! Tenant, type, and field segments are validated identifiers (see
//! [`crate::config::is_identifier`]), so the `:` delimiter cannot occur
//! inside them. Arbitrary value segments are NUL-terminated rather than
//! length-prefixed: prefix scans over the textual value (the lookup
//! cascade's prefix tier) need the value bytes contiguous. NUL bytes are
//! stripped when values are folded. UUIDs are 16 raw bytes in fixed tail
//! position; sequence numbers are big-endian u64 so lexicographic order
//! is numeric order.

use crate::types::EntityId;

/// Reserved type name under which schema records are stored.
pub const SCHEMA_TYPE: &str = "schema";

/// Separator between a variable-length value segment and the trailing uuid.
pub const VALUE_TERMINATOR: u8 = 0;

// ============================================================================
// Entity keys
// ============================================================================

/// Key for an entity record: `entity:{tenant}:{type}:{uuid16}`.
pub fn entity(tenant: &str, entity_type: &str, id: EntityId) -> Vec<u8> {
    let mut key = entity_type_prefix(tenant, entity_type);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Key for a schema record: `entity:{tenant}:schema:{name}`.
///
/// Schemas are name-addressed so peers registering the same schema
/// converge on a single key.
pub fn schema_entity(tenant: &str, name: &str) -> Vec<u8> {
    let mut key = entity_type_prefix(tenant, SCHEMA_TYPE);
    key.extend_from_slice(name.as_bytes());
    key
}

/// Prefix covering all entities of one type: `entity:{tenant}:{type}:`.
pub fn entity_type_prefix(tenant: &str, entity_type: &str) -> Vec<u8> {
    format!("entity:{}:{}:", tenant, entity_type).into_bytes()
}

/// Prefix covering every entity of a tenant: `entity:{tenant}:`.
pub fn entity_tenant_prefix(tenant: &str) -> Vec<u8> {
    format!("entity:{}:", tenant).into_bytes()
}

/// Extracts the trailing uuid from an entity key, given its type prefix.
pub fn entity_id_from_key(key: &[u8], prefix_len: usize) -> Option<EntityId> {
    let tail = key.get(prefix_len..)?;
    let bytes: [u8; 16] = tail.try_into().ok()?;
    Some(EntityId::from_bytes(bytes))
}

// ============================================================================
// Edge keys
// ============================================================================

/// Key for an edge record: `edge:{tenant}:{src16}:{dst16}:{edge_type}`.
pub fn edge(tenant: &str, src: EntityId, dst: EntityId, edge_type: &str) -> Vec<u8> {
    let mut key = format!("edge:{}:", tenant).into_bytes();
    key.extend_from_slice(src.as_bytes());
    key.push(b':');
    key.extend_from_slice(dst.as_bytes());
    key.push(b':');
    key.extend_from_slice(edge_type.as_bytes());
    key
}

/// Reverse-direction index row: `edgerev:{tenant}:{dst16}:{src16}:{edge_type}`.
pub fn edge_reverse(tenant: &str, src: EntityId, dst: EntityId, edge_type: &str) -> Vec<u8> {
    let mut key = format!("edgerev:{}:", tenant).into_bytes();
    key.extend_from_slice(dst.as_bytes());
    key.push(b':');
    key.extend_from_slice(src.as_bytes());
    key.push(b':');
    key.extend_from_slice(edge_type.as_bytes());
    key
}

/// Prefix covering all outbound edges of `src`.
pub fn edge_src_prefix(tenant: &str, src: EntityId) -> Vec<u8> {
    let mut key = format!("edge:{}:", tenant).into_bytes();
    key.extend_from_slice(src.as_bytes());
    key.push(b':');
    key
}

/// Prefix covering all inbound edges of `dst` (reverse index).
pub fn edge_dst_prefix(tenant: &str, dst: EntityId) -> Vec<u8> {
    let mut key = format!("edgerev:{}:", tenant).into_bytes();
    key.extend_from_slice(dst.as_bytes());
    key.push(b':');
    key
}

/// Prefix covering every forward edge of a tenant.
pub fn edge_tenant_prefix(tenant: &str) -> Vec<u8> {
    format!("edge:{}:", tenant).into_bytes()
}

/// Decodes `(src, dst, edge_type)` from a forward edge key.
pub fn edge_forward_parts(key: &[u8], tenant: &str) -> Option<(EntityId, EntityId, String)> {
    let prefix_len = "edge:".len() + tenant.len() + 1;
    let tail = key.get(prefix_len..)?;
    if tail.len() < 34 {
        return None;
    }
    let src: [u8; 16] = tail[..16].try_into().ok()?;
    let dst: [u8; 16] = tail[17..33].try_into().ok()?;
    let edge_type = String::from_utf8(tail[34..].to_vec()).ok()?;
    Some((
        EntityId::from_bytes(src),
        EntityId::from_bytes(dst),
        edge_type,
    ))
}

/// Decodes `({other_endpoint}, {edge_type})` from an edge or edgerev key.
///
/// Keys are parsed by fixed offset: the uuid segments are always 16 bytes,
/// so the delimiter byte value never matters.
pub fn edge_key_parts(key: &[u8], prefix_len: usize) -> Option<(EntityId, String)> {
    let tail = key.get(prefix_len..)?;
    if tail.len() < 17 {
        return None;
    }
    let endpoint: [u8; 16] = tail[..16].try_into().ok()?;
    let edge_type = String::from_utf8(tail[17..].to_vec()).ok()?;
    Some((EntityId::from_bytes(endpoint), edge_type))
}

// ============================================================================
// Secondary index keys
// ============================================================================

/// Secondary-index row: `idx:{tenant}:{type}:{field}:{value}\0{uuid16}`.
pub fn index_entry(
    tenant: &str,
    entity_type: &str,
    field: &str,
    value: &str,
    id: EntityId,
) -> Vec<u8> {
    let mut key = index_value_prefix(tenant, entity_type, field, value);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Prefix matching all rows for one exact field value.
pub fn index_value_prefix(tenant: &str, entity_type: &str, field: &str, value: &str) -> Vec<u8> {
    let mut key = format!("idx:{}:{}:{}:", tenant, entity_type, field).into_bytes();
    key.extend_from_slice(strip_nul(value).as_bytes());
    key.push(VALUE_TERMINATOR);
    key
}

/// uuid -> type directory row: `idmap:{tenant}:{uuid16}`.
///
/// Lets `get(uuid)` resolve the type segment of the record key without a
/// tenant-wide scan.
pub fn id_directory(tenant: &str, id: EntityId) -> Vec<u8> {
    let mut key = format!("idmap:{}:", tenant).into_bytes();
    key.extend_from_slice(id.as_bytes());
    key
}

// ============================================================================
// Fuzzy key-lookup index
// ============================================================================

/// Full-value lookup row: `keyidx:{tenant}:{type}:val:{folded}\0{uuid16}`.
///
/// Serves both the exact tier (prefix = value + NUL) and the prefix tier
/// (prefix = value only).
pub fn keyidx_value(tenant: &str, entity_type: &str, folded: &str, id: EntityId) -> Vec<u8> {
    let mut key = format!("keyidx:{}:{}:val:", tenant, entity_type).into_bytes();
    key.extend_from_slice(folded.as_bytes());
    key.push(VALUE_TERMINATOR);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Prefix for the exact tier: matches only rows whose folded value equals
/// `folded` (the NUL terminator closes the value).
pub fn keyidx_value_exact_prefix(tenant: &str, entity_type: &str, folded: &str) -> Vec<u8> {
    let mut key = format!("keyidx:{}:{}:val:", tenant, entity_type).into_bytes();
    key.extend_from_slice(folded.as_bytes());
    key.push(VALUE_TERMINATOR);
    key
}

/// Prefix for the prefix tier: matches rows whose folded value starts with
/// `folded`.
pub fn keyidx_value_prefix(tenant: &str, entity_type: &str, folded: &str) -> Vec<u8> {
    let mut key = format!("keyidx:{}:{}:val:", tenant, entity_type).into_bytes();
    key.extend_from_slice(folded.as_bytes());
    key
}

/// Posting row: `keyidx:{tenant}:{type}:term:{token}\0{uuid16}`.
/// Value: `[tf: u32 BE][doc_len: u32 BE]`.
pub fn keyidx_term(tenant: &str, entity_type: &str, token: &str, id: EntityId) -> Vec<u8> {
    let mut key = format!("keyidx:{}:{}:term:", tenant, entity_type).into_bytes();
    key.extend_from_slice(token.as_bytes());
    key.push(VALUE_TERMINATOR);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Prefix matching the posting list of one token.
pub fn keyidx_term_prefix(tenant: &str, entity_type: &str, token: &str) -> Vec<u8> {
    let mut key = format!("keyidx:{}:{}:term:", tenant, entity_type).into_bytes();
    key.extend_from_slice(token.as_bytes());
    key.push(VALUE_TERMINATOR);
    key
}

/// Document-frequency row: `keyidx:{tenant}:{type}:df:{token}`. Value: u64 BE.
pub fn keyidx_df(tenant: &str, entity_type: &str, token: &str) -> Vec<u8> {
    let mut key = format!("keyidx:{}:{}:df:", tenant, entity_type).into_bytes();
    key.extend_from_slice(token.as_bytes());
    key
}

/// Prefix covering every df row of a type (term expansion scans this).
pub fn keyidx_df_prefix(tenant: &str, entity_type: &str) -> Vec<u8> {
    format!("keyidx:{}:{}:df:", tenant, entity_type).into_bytes()
}

/// Corpus document count: `keyidx:{tenant}:{type}:meta:count`. Value: u64 BE.
pub fn keyidx_meta_count(tenant: &str, entity_type: &str) -> Vec<u8> {
    format!("keyidx:{}:{}:meta:count", tenant, entity_type).into_bytes()
}

/// Corpus token total: `keyidx:{tenant}:{type}:meta:len`. Value: u64 BE.
pub fn keyidx_meta_len(tenant: &str, entity_type: &str) -> Vec<u8> {
    format!("keyidx:{}:{}:meta:len", tenant, entity_type).into_bytes()
}

// ============================================================================
// WAL keys
// ============================================================================

/// Current sequence counter: `wal:{tenant}:seq`. Value: u64 BE.
pub fn wal_seq(tenant: &str) -> Vec<u8> {
    format!("wal:{}:seq", tenant).into_bytes()
}

/// WAL entry row: `wal:{tenant}:entry:{seq8}`.
pub fn wal_entry(tenant: &str, seq: u64) -> Vec<u8> {
    let mut key = wal_entry_prefix(tenant);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Prefix covering the replicated entry range.
pub fn wal_entry_prefix(tenant: &str) -> Vec<u8> {
    format!("wal:{}:entry:", tenant).into_bytes()
}

/// Extracts the sequence number from a WAL entry key.
pub fn wal_seq_from_key(key: &[u8], prefix_len: usize) -> Option<u64> {
    let tail = key.get(prefix_len..)?;
    let bytes: [u8; 8] = tail.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Persisted pending worker task: `wal:{tenant}:pending:{n8}`.
///
/// Outside the `entry:` range on purpose: pending work is node-local and
/// never streamed to peers.
pub fn wal_pending(tenant: &str, n: u64) -> Vec<u8> {
    let mut key = wal_pending_prefix(tenant);
    key.extend_from_slice(&n.to_be_bytes());
    key
}

/// Prefix covering persisted pending tasks.
pub fn wal_pending_prefix(tenant: &str) -> Vec<u8> {
    format!("wal:{}:pending:", tenant).into_bytes()
}

/// Replication watermark for a peer: `wal:{tenant}:peer:{peer_id}`. Value: u64 BE.
pub fn wal_peer_checkpoint(tenant: &str, peer_id: &str) -> Vec<u8> {
    format!("wal:{}:peer:{}", tenant, peer_id).into_bytes()
}

// ============================================================================
// Vector metadata keys
// ============================================================================

/// Queued-embedding row: `vpending:{tenant}:{uuid16}{slot}`.
pub fn vector_pending(tenant: &str, id: EntityId, slot: u8) -> Vec<u8> {
    let mut key = vector_pending_prefix(tenant);
    key.extend_from_slice(id.as_bytes());
    key.push(slot);
    key
}

/// Prefix covering every queued embedding of a tenant.
pub fn vector_pending_prefix(tenant: &str) -> Vec<u8> {
    format!("vpending:{}:", tenant).into_bytes()
}

// ============================================================================
// Folding
// ============================================================================

/// Case-folds a lookup value: lowercased, NUL-stripped.
pub fn fold(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\0')
        .collect::<String>()
        .to_lowercase()
}

fn strip_nul(value: &str) -> String {
    if value.contains('\0') {
        value.chars().filter(|c| *c != '\0').collect()
    } else {
        value.to_string()
    }
}
