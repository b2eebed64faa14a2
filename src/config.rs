//! Configuration types for remdb.
//!
//! The [`Config`] struct controls engine behavior:
//! - HNSW vector index tuning
//! - BM25 fuzzy-lookup parameters
//! - Background worker queue and retry policy
//! - Compaction retention window
//! - Replication peers and backoff
//!
//! # Example
//! ```rust
//! use remdb::Config;
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Customize for production
//! let config = Config {
//!     node_id: "node-a".to_string(),
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Engine configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings.
#[derive(Clone, Debug)]
pub struct Config {
    /// Identifier of this node, recorded on every write it originates.
    ///
    /// Used as the deterministic tie-break for last-write-wins conflict
    /// resolution between replication peers. Must be a valid identifier.
    pub node_id: String,

    /// HNSW vector index parameters.
    ///
    /// Controls the quality and performance of semantic search.
    /// See [`HnswConfig`] for tuning guidelines.
    pub hnsw: HnswConfig,

    /// BM25 scoring parameters for the fuzzy key-lookup tier.
    pub bm25: Bm25Config,

    /// Background worker queue and retry policy.
    pub worker: WorkerConfig,

    /// Compaction retention policy for soft-deleted entities.
    pub compaction: CompactionConfig,

    /// Replication transport policy.
    pub replication: ReplicationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "node-0".to_string(),
            hnsw: HnswConfig::default(),
            bm25: Bm25Config::default(),
            worker: WorkerConfig::default(),
            compaction: CompactionConfig::default(),
            replication: ReplicationConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `RemDb::open()`. You can also call this
    /// explicitly to check configuration before attempting to open.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `node_id` is empty or not identifier-safe
    /// - HNSW parameters are zero
    /// - BM25 parameters are out of range
    /// - worker queue depth is zero
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.node_id.is_empty() {
            return Err(ValidationError::required_field("node_id"));
        }
        if !is_identifier(&self.node_id) {
            return Err(ValidationError::invalid_field(
                "node_id",
                "must contain only ASCII alphanumerics, '-', '_', or '.'",
            ));
        }

        if self.hnsw.max_nb_connection == 0 {
            return Err(ValidationError::invalid_field(
                "hnsw.max_nb_connection",
                "must be greater than 0",
            ));
        }
        if self.hnsw.ef_construction == 0 {
            return Err(ValidationError::invalid_field(
                "hnsw.ef_construction",
                "must be greater than 0",
            ));
        }
        if self.hnsw.ef_search == 0 {
            return Err(ValidationError::invalid_field(
                "hnsw.ef_search",
                "must be greater than 0",
            ));
        }

        if self.bm25.k1 <= 0.0 {
            return Err(ValidationError::invalid_field(
                "bm25.k1",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(ValidationError::invalid_field(
                "bm25.b",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.worker.queue_depth == 0 {
            return Err(ValidationError::invalid_field(
                "worker.queue_depth",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Returns true for names safe to embed between key delimiters.
///
/// Tenants, type names, field names, and node ids all pass through this
/// gate so the `:` key delimiter can never occur inside a segment.
pub fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Configuration for the HNSW vector index.
///
/// Controls the trade-off between index build time, memory usage,
/// and search accuracy. The defaults are tuned for the target scale
/// (10K-1M vectors per tenant/type pair).
///
/// # Tuning Guide
///
/// | Use Case     | M  | ef_construction | ef_search |
/// |--------------|----|-----------------|-----------|
/// | Low memory   |  8 |             100 |        30 |
/// | Balanced     | 16 |             200 |        50 |
/// | High recall  | 32 |             400 |       100 |
#[derive(Clone, Debug)]
pub struct HnswConfig {
    /// Maximum bidirectional connections per node (M parameter).
    ///
    /// Higher values improve recall but increase memory and build time.
    /// Each node stores up to M links, so memory per node is O(M).
    /// Default: 16
    pub max_nb_connection: usize,

    /// Number of candidates tracked during index construction.
    ///
    /// Higher values produce a better quality graph but slow down insertion.
    /// Rule of thumb: ef_construction >= 2 * max_nb_connection.
    /// Default: 200
    pub ef_construction: usize,

    /// Number of candidates tracked during search.
    ///
    /// Higher values improve recall but increase search latency.
    /// Must be >= k (the number of results requested).
    /// Default: 50
    pub ef_search: usize,

    /// Maximum number of layers in the skip-list structure.
    ///
    /// Default 16 handles datasets up to ~1M vectors with M=16.
    pub max_layer: usize,

    /// Initial pre-allocated capacity (number of vectors).
    ///
    /// The index grows beyond this automatically, but pre-allocation
    /// avoids reallocations for known workloads.
    /// Default: 10_000
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 50,
            max_layer: 16,
            max_elements: 10_000,
        }
    }
}

/// BM25 parameters for the fuzzy tier of [`lookup`](crate::RemDb::lookup_entity).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Bm25Config {
    /// Term-frequency saturation. Default: 1.2
    pub k1: f32,

    /// Document-length normalization. Default: 0.75
    pub b: f32,

    /// Maximum number of fuzzy-tier results returned. Default: 10
    pub max_results: usize,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            max_results: 10,
        }
    }
}

/// Background worker queue and retry policy.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Bounded task queue depth. Enqueue blocks briefly when full.
    /// Default: 1024
    pub queue_depth: usize,

    /// Embedding generation retry attempts before the task is dropped.
    /// Default: 3
    pub embed_retries: u32,

    /// Base delay for exponential retry backoff.
    /// Default: 200ms (200ms, 400ms, 800ms)
    pub retry_base_delay: Duration,

    /// How long shutdown waits for the queue to drain before persisting
    /// the remainder as pending tasks.
    /// Default: 5s
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1024,
            embed_retries: 3,
            retry_base_delay: Duration::from_millis(200),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Compaction retention policy.
#[derive(Clone, Debug)]
pub struct CompactionConfig {
    /// Soft-deleted entities older than this window are physically removed
    /// by the next compaction pass.
    /// Default: 7 days
    pub retention: Duration,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Replication transport policy.
///
/// The same engine serves both always-on cluster peers and
/// intermittently-connected edge devices; only these knobs differ.
#[derive(Clone, Debug)]
pub struct ReplicationConfig {
    /// Shared token a server requires from subscribing peers.
    /// `None` disables authentication (local testing).
    pub auth_token: Option<String>,

    /// Historical catch-up batch size. Default: 100 (protocol maximum).
    pub batch_size: usize,

    /// Initial reconnect backoff after a stream failure.
    /// Default: 500ms
    pub reconnect_backoff: Duration,

    /// Upper bound for exponential reconnect backoff.
    /// Default: 30s
    pub max_reconnect_backoff: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            batch_size: 100,
            reconnect_backoff: Duration::from_millis(500),
            max_reconnect_backoff: Duration::from_secs(30),
        }
    }
}
