//! # remdb
//!
//! Embedded, multi-tenant, schema-driven entity database: key-value
//! records, graph edges, HNSW vector search, and a SQL-like query layer
//! over a single embedded store.
//!
//! Four retrieval modalities sit behind one surface (direct key lookup,
//! predicate filtering, approximate nearest-neighbor search, and graph
//! traversal) with tenant isolation, write-ahead durability, and
//! asynchronous index maintenance.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use remdb::{Config, RemDb};
//! use remdb::embedding::ExternalEmbedder;
//! use std::sync::Arc;
//!
//! let db = RemDb::open(
//!     "./rem-data",
//!     Config::default(),
//!     Arc::new(ExternalEmbedder::new(384)),
//! )?;
//!
//! // Register a schema (schemas are entities too)
//! db.register_schema("acme", resources_schema())?;
//!
//! // Insert: durable before return, embedding follows asynchronously
//! let id = db.insert("acme", "resources", serde_json::json!({
//!     "name": "Python Guide",
//!     "content": "Learn Python",
//!     "category": "tutorial",
//! }))?;
//!
//! // One query surface for all four modalities
//! let rows = db.query("acme", "SELECT name FROM resources \
//!                              WHERE category = 'tutorial' LIMIT 10").await?;
//!
//! db.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Entity
//!
//! The single storage primitive. Every stored object, schemas included,
//! is an [`Entity`] addressed by
//! `(tenant, type, id)`.
//!
//! ### Schema
//!
//! A JSON-Schema descriptor governing a type, registered before any
//! entity of that type is inserted, and stored as an entity of type
//! `"schema"`.
//!
//! ### WAL
//!
//! Every record mutation appends a checksummed, densely-sequenced log
//! entry in the same atomic commit. The WAL drives crash recovery (via
//! the store's own journal) and peer replication.
//!
//! ## Thread Safety
//!
//! [`RemDb`] is `Send + Sync`; share it across threads with `Arc`.
//! Writes within a tenant are serialized, reads run on MVCC snapshots.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod db;
mod error;
mod types;
mod wal;

pub mod embedding;
pub mod storage;

// Domain modules
pub mod entity;
pub mod graph;
pub mod query;
pub mod replication;
pub mod schema;

/// Vector index module for HNSW-based approximate nearest neighbor search.
pub mod vector;

pub(crate) mod worker;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main database interface
pub use db::RemDb;

// Configuration
pub use config::{
    Bm25Config, CompactionConfig, Config, HnswConfig, ReplicationConfig, WorkerConfig,
};

// Error handling
pub use error::{
    NotFoundError, QueryError, RemError, ReplicationError, Result, StorageError, ValidationError,
};

// Core types
pub use types::{Embedding, EntityId, Timestamp, Value};

// Domain types
pub use entity::{Direction, Edge, Entity};
pub use graph::TraversalOrder;
pub use query::QueryResult;
pub use schema::{SchemaCategory, SchemaDefinition};
pub use vector::{DistanceMetric, VectorSlot};
pub use wal::{WalEntry, WalOp};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common remdb usage.
///
/// ```rust
/// use remdb::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::db::RemDb;
    pub use crate::embedding::Embedder;
    pub use crate::entity::{Direction, Edge, Entity};
    pub use crate::error::{RemError, Result};
    pub use crate::query::QueryResult;
    pub use crate::schema::{SchemaCategory, SchemaDefinition};
    pub use crate::types::{EntityId, Timestamp, Value};
}
