//! Storage layer abstractions for remdb.
//!
//! This module provides a trait-based abstraction over the embedded
//! key-value store, allowing different backends to be used (redb in
//! production, mocks for testing).
//!
//! # Contract
//!
//! An ordered mapping from byte-sequence keys to byte-sequence values with
//! point reads/writes, prefix iteration, and atomic batches. Every commit
//! is durable before the call returns; crash recovery is the backend's
//! responsibility (redb replays its own journal). Concurrency: one writer
//! per store, many concurrent readers; writer serialization above single
//! operations is the caller's responsibility.
//!
//! # Namespaces
//!
//! Keys live in logical column families. The redb backend maps each to a
//! separate table in one database file:
//!
//! | Namespace    | Contents                                    |
//! |--------------|---------------------------------------------|
//! | `Default`    | entity records (schemas included)           |
//! | `Edges`      | edge records and the reverse-edge index     |
//! | `Indexes`    | secondary indexes, fuzzy key index, idmap   |
//! | `Wal`        | WAL entries, sequence counters, checkpoints |
//! | `VectorMeta` | pending-embedding tracking                  |

pub mod keys;
pub mod redb;

pub use self::redb::RedbStore;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Logical column family a key belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    /// Entity records.
    Default,
    /// Edge records and reverse-edge index rows.
    Edges,
    /// Secondary indexes, fuzzy key index, id directory.
    Indexes,
    /// Write-ahead log entries and counters.
    Wal,
    /// Vector index bookkeeping (pending embeddings).
    VectorMeta,
}

impl Namespace {
    /// All namespaces, in table-creation order.
    pub const ALL: [Namespace; 5] = [
        Namespace::Default,
        Namespace::Edges,
        Namespace::Indexes,
        Namespace::Wal,
        Namespace::VectorMeta,
    ];
}

/// One operation inside an atomic batch.
#[derive(Clone, Debug)]
pub enum BatchOp {
    /// Insert or overwrite `key` with `value`.
    Put {
        /// Target namespace.
        ns: Namespace,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// Target namespace.
        ns: Namespace,
        /// Key bytes.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Convenience constructor for a put.
    pub fn put(ns: Namespace, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self::Put { ns, key, value }
    }

    /// Convenience constructor for a delete.
    pub fn delete(ns: Namespace, key: Vec<u8>) -> Self {
        Self::Delete { ns, key }
    }
}

/// Embedded key-value store contract.
///
/// Implementations must be `Send + Sync`; the engine shares one store per
/// tenant across reader threads and the background worker.
pub trait KvStore: Send + Sync {
    /// Point read. Returns `None` if the key is absent.
    fn get(&self, ns: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Point write, committed durably before returning.
    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()>;

    /// Point delete. Deleting an absent key is not an error.
    fn delete(&self, ns: Namespace, key: &[u8]) -> Result<()>;

    /// Returns all `(key, value)` pairs whose key starts with `prefix`,
    /// in ascending key order.
    fn prefix_iter(&self, ns: Namespace, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Returns up to `limit` pairs with `key >= start`, ascending.
    ///
    /// Lets callers resume a scan mid-range (WAL catch-up) without
    /// re-reading the whole prefix.
    fn scan_from(&self, ns: Namespace, start: &[u8], limit: usize)
        -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Applies every operation in one atomic, durable commit.
    fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Forces any buffered writes to stable storage.
    fn flush(&self) -> Result<()>;

    /// Returns the path of the backing file, if the backend has one.
    fn path(&self) -> Option<&Path>;
}

/// Opens the production storage backend at the given path.
///
/// This is a convenience function that creates a [`RedbStore`] instance.
/// For more control, use `RedbStore::open()` directly.
pub fn open_storage(path: impl AsRef<Path>) -> Result<Box<dyn KvStore>> {
    let store = RedbStore::open(path)?;
    Ok(Box::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_storage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.redb");
        let store = open_storage(&path).unwrap();
        assert!(store.path().is_some());
        store
            .put(Namespace::Default, b"k", b"v")
            .unwrap();
        assert_eq!(store.get(Namespace::Default, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_kv_store_is_object_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn KvStore>();
    }
}
