//! Write-ahead log entries.
//!
//! Every logical record mutation (entity, edge, schema) appends one
//! [`WalEntry`] in the same atomic batch that commits the mutation, so the
//! log and the data can never diverge. Entries carry a CRC32 checksum over
//! their payload; replication peers verify it before applying anything.
//!
//! # Sequence discipline
//!
//! Sequence numbers are per-tenant, dense, and monotonic: the counter row
//! (`wal:{tenant}:seq`) is read, incremented, and rewritten inside the
//! same batch as the entry, under the tenant's write lock. The set of
//! sequence numbers for a tenant is therefore exactly `{1..=current}`.
//!
//! Secondary-index rows are derived state and are never logged; a
//! replication peer recomputes them from the record it applies.

use serde::{Deserialize, Serialize};

use crate::error::{ReplicationError, Result, StorageError};
use crate::storage::Namespace;
use crate::types::Timestamp;

/// Mutation kind recorded in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOp {
    /// Insert or overwrite.
    Put,
    /// Remove (hard delete; soft deletes are Puts of tombstoned records).
    Delete,
}

/// One append-only log record.
///
/// Immutable once written. The `value` is the exact serialized record
/// bytes, so a peer can apply it without re-encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Dense per-tenant sequence number, starting at 1.
    pub seq: u64,

    /// Wall-clock time the entry was created.
    pub timestamp: Timestamp,

    /// Mutation kind.
    pub op: WalOp,

    /// Namespace the key lives in.
    pub ns: Namespace,

    /// Raw key bytes exactly as written to the store.
    pub key: Vec<u8>,

    /// Raw value bytes for `Put`, `None` for `Delete`.
    pub value: Option<Vec<u8>>,

    /// CRC32 over `(op, ns, key, value)`. Detects corruption on disk and
    /// malicious or broken peers on the wire.
    pub checksum: u32,
}

impl WalEntry {
    /// Builds an entry, computing its checksum.
    pub fn new(
        seq: u64,
        op: WalOp,
        ns: Namespace,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
    ) -> Self {
        let checksum = checksum(op, ns, &key, value.as_deref());
        Self {
            seq,
            timestamp: Timestamp::now(),
            op,
            ns,
            key,
            value,
            checksum,
        }
    }

    /// Recomputes the checksum and compares it to the stored one.
    pub fn verify(&self) -> bool {
        checksum(self.op, self.ns, &self.key, self.value.as_deref()) == self.checksum
    }

    /// Verifies the checksum, mapping failure to the replication error kind.
    pub fn verify_or_err(&self) -> std::result::Result<(), ReplicationError> {
        if self.verify() {
            Ok(())
        } else {
            Err(ReplicationError::ChecksumFailed { seq: self.seq })
        }
    }

    /// Serializes the entry for the WAL table or the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self).map_err(StorageError::from)?)
    }

    /// Deserializes an entry, without verifying the checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes).map_err(|e| {
            StorageError::corrupted(format!("undecodable WAL entry: {}", e))
        })?)
    }
}

fn checksum(op: WalOp, ns: Namespace, key: &[u8], value: Option<&[u8]>) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[op_tag(op), ns_tag(ns)]);
    hasher.update(&(key.len() as u64).to_be_bytes());
    hasher.update(key);
    match value {
        Some(v) => {
            hasher.update(&[1]);
            hasher.update(&(v.len() as u64).to_be_bytes());
            hasher.update(v);
        }
        None => hasher.update(&[0]),
    }
    hasher.finalize()
}

fn op_tag(op: WalOp) -> u8 {
    match op {
        WalOp::Put => 1,
        WalOp::Delete => 2,
    }
}

fn ns_tag(ns: Namespace) -> u8 {
    match ns {
        Namespace::Default => 1,
        Namespace::Edges => 2,
        Namespace::Indexes => 3,
        Namespace::Wal => 4,
        Namespace::VectorMeta => 5,
    }
}

/// Encodes a counter value for a `seq`-style row.
#[inline]
pub fn encode_seq(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

/// Decodes a counter row; malformed bytes are corruption.
pub fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::corrupted("malformed sequence counter"))?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(seq: u64) -> WalEntry {
        WalEntry::new(
            seq,
            WalOp::Put,
            Namespace::Default,
            b"entity:acme:resources:xxxx".to_vec(),
            Some(b"record-bytes".to_vec()),
        )
    }

    #[test]
    fn test_checksum_verifies() {
        let entry = sample_entry(1);
        assert!(entry.verify());
    }

    #[test]
    fn test_checksum_detects_value_tamper() {
        let mut entry = sample_entry(1);
        entry.value = Some(b"tampered".to_vec());
        assert!(!entry.verify());
        assert!(entry.verify_or_err().is_err());
    }

    #[test]
    fn test_checksum_detects_key_tamper() {
        let mut entry = sample_entry(1);
        entry.key[0] ^= 0xFF;
        assert!(!entry.verify());
    }

    #[test]
    fn test_checksum_distinguishes_op() {
        let put = WalEntry::new(1, WalOp::Put, Namespace::Default, b"k".to_vec(), None);
        let del = WalEntry::new(1, WalOp::Delete, Namespace::Default, b"k".to_vec(), None);
        assert_ne!(put.checksum, del.checksum);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let entry = sample_entry(42);
        let bytes = entry.encode().unwrap();
        let restored = WalEntry::decode(&bytes).unwrap();
        assert_eq!(entry, restored);
        assert!(restored.verify());
    }

    #[test]
    fn test_delete_entry_has_no_value() {
        let entry = WalEntry::new(7, WalOp::Delete, Namespace::Edges, b"edge-key".to_vec(), None);
        assert!(entry.value.is_none());
        assert!(entry.verify());
    }

    #[test]
    fn test_seq_counter_roundtrip() {
        let bytes = encode_seq(123456);
        assert_eq!(decode_seq(&bytes).unwrap(), 123456);
        assert!(decode_seq(b"short").is_err());
    }
}
