//! Error types for remdb.
//!
//! remdb uses a hierarchical error system:
//! - `RemError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `ValidationError`, `QueryError`,
//!   `ReplicationError`) provide detail
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use remdb::{RemDb, Config, Result};
//!
//! fn example() -> Result<()> {
//!     let db = RemDb::open("./rem-data", Config::default(), embedder)?;
//!     // ... operations that may fail ...
//!     db.close()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias for remdb operations.
pub type Result<T> = std::result::Result<T, RemError>;

/// Top-level error enum for all remdb operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum RemError {
    /// Storage layer error (I/O, corruption, transactions).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Query parsing or execution error.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Replication stream error.
    #[error("Replication error: {0}")]
    Replication(#[from] ReplicationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Requested record not found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding generation/validation error.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index error (HNSW operations, snapshot files).
    #[error("Vector index error: {0}")]
    Vector(String),

    /// A caller-supplied deadline expired before the operation finished.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl RemError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates an embedding error with the given message.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Creates a vector index error with the given message.
    pub fn vector(msg: impl Into<String>) -> Self {
        Self::Vector(msg.into())
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a query error.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Returns true if this is a replication error.
    pub fn is_replication(&self) -> bool {
        matches!(self, Self::Replication(_))
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the underlying storage layer.
/// All of them are fatal to the current operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database file or data is corrupted.
    #[error("Database corrupted: {0}")]
    Corrupted(String),

    /// The disk is full; the commit could not be persisted.
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// Database is locked by another process.
    #[error("Database is locked by another writer")]
    DatabaseLocked,

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

// Conversions from redb error types. Lock contention and disk exhaustion
// get their own variants so callers can distinguish them from corruption.
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        let msg = err.to_string();
        if msg.contains("locked") {
            StorageError::DatabaseLocked
        } else {
            StorageError::Backend(msg)
        }
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Backend(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        match err {
            redb::StorageError::Corrupted(msg) => StorageError::Corrupted(msg),
            redb::StorageError::Io(io) if io.kind() == std::io::ErrorKind::StorageFull => {
                StorageError::DiskFull(io.to_string())
            }
            other => StorageError::Backend(other.to_string()),
        }
    }
}

// Convert bincode errors to StorageError
impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to RemError for convenience
impl From<redb::Error> for RemError {
    fn from(err: redb::Error) -> Self {
        RemError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for RemError {
    fn from(err: redb::DatabaseError) -> Self {
        RemError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for RemError {
    fn from(err: redb::TransactionError) -> Self {
        RemError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for RemError {
    fn from(err: redb::CommitError) -> Self {
        RemError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for RemError {
    fn from(err: redb::TableError) -> Self {
        RemError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for RemError {
    fn from(err: redb::StorageError) -> Self {
        RemError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for RemError {
    fn from(err: bincode::Error) -> Self {
        RemError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No schema is registered under the requested type name.
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// Schema registration was rejected by the validator.
    #[error("Invalid schema '{name}': {reason}")]
    SchemaInvalid {
        /// Name under which registration was attempted.
        name: String,
        /// Why the schema description was rejected.
        reason: String,
    },

    /// A schema with this name and an equal or higher version already exists.
    #[error("Schema already exists: {name} (registered version {version})")]
    SchemaExists {
        /// Schema name.
        name: String,
        /// Version currently registered.
        version: u32,
    },

    /// Entity payload does not match the registered JSON-Schema.
    #[error("Validation failed at '{path}': {reason}")]
    PayloadInvalid {
        /// JSON pointer style path to the offending field.
        path: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Embedding dimension doesn't match the schema's configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension from the schema.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// An entity with this id already exists.
    #[error("Duplicate id: {0}")]
    DuplicateId(String),
}

impl ValidationError {
    /// Creates a schema-not-found error.
    pub fn schema_not_found(name: impl Into<String>) -> Self {
        Self::SchemaNotFound(name.into())
    }

    /// Creates a schema-invalid error.
    pub fn schema_invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaInvalid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a payload validation error with a field path.
    pub fn payload_invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PayloadInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }
}

/// Query parsing and execution errors.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The statement could not be parsed.
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset into the statement where parsing failed.
        offset: usize,
        /// What the parser expected or found.
        message: String,
    },

    /// The statement parsed but uses a construct the engine refuses.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl QueryError {
    /// Creates a syntax error at the given byte offset.
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Creates an unsupported-construct error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

/// Replication stream errors.
///
/// All of these tear down the stream; the client reconnects from its
/// last durable watermark.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// A WAL entry's checksum did not match its payload.
    #[error("Checksum failed for sequence {seq}")]
    ChecksumFailed {
        /// Sequence number of the corrupt entry.
        seq: u64,
    },

    /// The stream skipped ahead of the expected next sequence.
    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap {
        /// Sequence number the client expected next.
        expected: u64,
        /// Sequence number actually received.
        got: u64,
    },

    /// The peer rejected the subscription (bad token, unknown tenant).
    #[error("Subscription rejected: {0}")]
    Rejected(String),

    /// The connection failed or the peer closed unexpectedly.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A frame on the wire could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Not found errors for specific record types.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Entity with given id not found (or soft-deleted).
    #[error("Entity not found: {0}")]
    Entity(String),

    /// Edge with the given addressing tuple not found.
    #[error("Edge not found: {0}")]
    Edge(String),

    /// Tenant directory does not exist and creation was not requested.
    #[error("Tenant not found: {0}")]
    Tenant(String),
}

impl NotFoundError {
    /// Creates an entity not found error.
    pub fn entity(id: impl ToString) -> Self {
        Self::Entity(id.to_string())
    }

    /// Creates an edge not found error.
    pub fn edge(desc: impl ToString) -> Self {
        Self::Edge(desc.to_string())
    }

    /// Creates a tenant not found error.
    pub fn tenant(id: impl ToString) -> Self {
        Self::Tenant(id.to_string())
    }
}
