//! redb storage engine implementation.
//!
//! This module provides the primary storage backend for remdb using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery (redb journals every commit)
//! - Zero external dependencies (pure Rust)
//!
//! Each logical [`Namespace`](super::Namespace) maps to its own redb table
//! inside one database file, so an atomic batch can span namespaces in a
//! single transaction.

use std::path::{Path, PathBuf};

use ::redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, instrument};

use super::{BatchOp, KvStore, Namespace};
use crate::error::{Result, StorageError};

/// Entity records.
const DEFAULT_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("default");

/// Edge records and reverse-edge index rows.
const EDGES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("edges");

/// Secondary indexes, fuzzy key index, id directory.
const INDEXES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("indexes");

/// WAL entries, sequence counters, replication checkpoints.
const WAL_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("wal");

/// Vector index bookkeeping.
const VECTOR_META_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("vector_meta");

fn table_def(ns: Namespace) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    match ns {
        Namespace::Default => DEFAULT_TABLE,
        Namespace::Edges => EDGES_TABLE,
        Namespace::Indexes => INDEXES_TABLE,
        Namespace::Wal => WAL_TABLE,
        Namespace::VectorMeta => VECTOR_META_TABLE,
    }
}

/// redb storage engine wrapper.
///
/// # Thread Safety
///
/// `RedbStore` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers.
#[derive(Debug)]
pub struct RedbStore {
    /// The redb database handle.
    db: Database,

    /// Path to the database file.
    path: PathBuf,
}

impl RedbStore {
    /// Opens or creates a database at the given path.
    ///
    /// All namespace tables are created up front so read transactions can
    /// open them unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the database file is corrupted or locked by
    /// another process.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::builder().create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                StorageError::DatabaseLocked
            } else {
                StorageError::from(e)
            }
        })?;

        // Create every table in one transaction; redb creates on first open.
        let write_txn = db.begin_write().map_err(StorageError::from)?;
        for ns in Namespace::ALL {
            let _ = write_txn.open_table(table_def(ns)).map_err(StorageError::from)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!("storage opened");
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Computes the exclusive upper bound for a prefix scan.
    ///
    /// Returns `None` when the prefix is all 0xFF (scan to the end).
    fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
        let mut upper = prefix.to_vec();
        while let Some(last) = upper.last_mut() {
            if *last < 0xFF {
                *last += 1;
                return Some(upper);
            }
            upper.pop();
        }
        None
    }
}

impl KvStore for RedbStore {
    fn get(&self, ns: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(table_def(ns)).map_err(StorageError::from)?;
        let value = table
            .get(key)
            .map_err(StorageError::from)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()> {
        self.batch(vec![BatchOp::put(ns, key.to_vec(), value.to_vec())])
    }

    fn delete(&self, ns: Namespace, key: &[u8]) -> Result<()> {
        self.batch(vec![BatchOp::delete(ns, key.to_vec())])
    }

    fn prefix_iter(&self, ns: Namespace, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(table_def(ns)).map_err(StorageError::from)?;

        let mut out = Vec::new();
        match Self::prefix_upper_bound(prefix) {
            Some(upper) => {
                let range = table
                    .range(prefix..upper.as_slice())
                    .map_err(StorageError::from)?;
                for item in range {
                    let (k, v) = item.map_err(StorageError::from)?;
                    out.push((k.value().to_vec(), v.value().to_vec()));
                }
            }
            None => {
                let range = table.range(prefix..).map_err(StorageError::from)?;
                for item in range {
                    let (k, v) = item.map_err(StorageError::from)?;
                    out.push((k.value().to_vec(), v.value().to_vec()));
                }
            }
        }
        Ok(out)
    }

    fn scan_from(
        &self,
        ns: Namespace,
        start: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(table_def(ns)).map_err(StorageError::from)?;
        let mut out = Vec::new();
        let range = table.range(start..).map_err(StorageError::from)?;
        for item in range {
            if out.len() >= limit {
                break;
            }
            let (k, v) = item.map_err(StorageError::from)?;
            out.push((k.value().to_vec(), v.value().to_vec()));
        }
        Ok(out)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        // Namespaces map to disjoint tables, so applying per table keeps
        // within-key ordering while staying in one atomic transaction.
        for ns in Namespace::ALL {
            let touched = ops.iter().any(|op| match op {
                BatchOp::Put { ns: op_ns, .. } | BatchOp::Delete { ns: op_ns, .. } => *op_ns == ns,
            });
            if !touched {
                continue;
            }
            let mut table = write_txn.open_table(table_def(ns)).map_err(StorageError::from)?;
            for op in &ops {
                match op {
                    BatchOp::Put { ns: op_ns, key, value } if *op_ns == ns => {
                        table
                            .insert(key.as_slice(), value.as_slice())
                            .map_err(StorageError::from)?;
                    }
                    BatchOp::Delete { ns: op_ns, key } if *op_ns == ns => {
                        table.remove(key.as_slice()).map_err(StorageError::from)?;
                    }
                    _ => {}
                }
            }
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // redb commits are fsynced; an empty durable commit acts as a barrier
        // for anything buffered by the OS.
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        write_txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
