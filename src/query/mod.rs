//! The SQL-like query layer.
//!
//! A single entry point, [`RemDb::query`](crate::RemDb::query), fuses four
//! retrieval modalities behind a small dialect:
//!
//! ```text
//! SELECT name FROM resources WHERE category = 'tutorial' LIMIT 10
//! SELECT * FROM resources WHERE embedding.cosine('auth') AND depth > 2
//! SEARCH 'python basics' IN resources LIMIT 5
//! TRAVERSE FROM 0193…15c1 DEPTH 2 DIRECTION out TYPE 'knows'
//! LOOKUP 'alice@company.com'
//! ```
//!
//! The pipeline is parse → plan → execute: [`parser`] builds the
//! [`ast::Statement`], [`plan`] picks the access path, [`exec`] runs it.
//! Vector searches surface their similarity in a synthetic `_score`
//! column.

pub mod ast;
pub(crate) mod exec;
pub mod parser;
pub mod plan;
pub mod token;

pub use parser::parse;

use serde_json::Value as JsonValue;

/// Result table of a query: ordered columns and one row per entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    /// Column names, in projection order. Vector searches append `_score`.
    pub columns: Vec<String>,

    /// Row values, aligned with `columns`.
    pub rows: Vec<Vec<JsonValue>>,
}

impl QueryResult {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up one cell by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&JsonValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }
}
