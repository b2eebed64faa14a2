//! Abstract syntax of the query dialect.

use crate::entity::Direction;
use crate::types::EntityId;
use crate::vector::VectorSlot;

/// A parsed statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// `SELECT fields FROM type [WHERE ...] [ORDER BY ...] [LIMIT n] [OFFSET m]`
    Select {
        /// Projected columns.
        projection: Projection,
        /// Target entity type.
        entity_type: String,
        /// WHERE predicate, if any.
        predicate: Option<Predicate>,
        /// ORDER BY clause, if any.
        order_by: Option<(String, SortOrder)>,
        /// LIMIT clause, if any. Never negative (the parser rejects that).
        limit: Option<usize>,
        /// OFFSET clause, if any.
        offset: Option<usize>,
    },

    /// `SEARCH 'text' IN type [WHERE ...] [LIMIT n]`: pure vector search.
    Search {
        /// Query text handed to the embedder.
        text: String,
        /// Target entity type.
        entity_type: String,
        /// Residual predicate applied after the vector search.
        predicate: Option<Predicate>,
        /// LIMIT clause, if any.
        limit: Option<usize>,
    },

    /// `TRAVERSE FROM uuid [DEPTH n] [DIRECTION in|out|both] [TYPE 'edge']`
    Traverse {
        /// Start entity.
        start: EntityId,
        /// Maximum hops. Default 1.
        depth: usize,
        /// Edge direction filter. Default outbound.
        direction: Direction,
        /// Edge type filter, if any.
        edge_type: Option<String>,
    },

    /// `LOOKUP 'value' [, 'value' ...]`: fuzzy key lookup, no type needed.
    Lookup {
        /// Values to cascade through the key index.
        values: Vec<String>,
    },
}

/// Projected columns of a SELECT.
#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// `*`
    All,
    /// Explicit field list (attribute names or dotted property paths).
    Fields(Vec<String>),
}

/// ORDER BY direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending (default).
    Asc,
    /// Descending.
    Desc,
}

/// Comparison operators.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    /// Human-readable operator text for error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Gte => ">=",
        }
    }
}

/// A literal scalar in a predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    /// `NULL`
    Null,
    /// `TRUE` / `FALSE`
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Quoted string literal.
    Str(String),
}

impl Scalar {
    /// String form used for index probes.
    pub fn index_repr(&self) -> Option<String> {
        match self {
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Str(s) => Some(s.clone()),
            Scalar::Null => None,
        }
    }
}

/// Vector-similarity measure named in the statement
/// (`embedding.cosine(...)` / `embedding.inner_product(...)`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimilarityFn {
    /// `cosine(...)`
    Cosine,
    /// `inner_product(...)`
    InnerProduct,
}

/// A WHERE predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `field op literal`
    Compare {
        /// Attribute name or dotted property path.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand literal.
        value: Scalar,
    },

    /// `field IN (a, b, c)`
    InList {
        /// Attribute name or dotted property path.
        field: String,
        /// Accepted values.
        values: Vec<Scalar>,
    },

    /// `CONTAINS(field, 'substr')`
    Contains {
        /// Attribute name or dotted property path.
        field: String,
        /// Substring to find.
        needle: String,
    },

    /// `embedding.cosine('text')`, optionally guarded with `>= threshold`.
    ///
    /// Placing this anywhere in WHERE makes the plan vector-first.
    Similarity {
        /// Which vector slot the call names.
        slot: VectorSlot,
        /// Which measure the call names.
        function: SimilarityFn,
        /// Text handed to the embedder.
        text: String,
        /// Minimum score when the call is compared against a number.
        min_score: Option<f32>,
    },

    /// `a AND b`
    And(Box<Predicate>, Box<Predicate>),

    /// `a OR b`
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Splits a conjunction tree into its top-level conjuncts.
    ///
    /// An `Or` node is returned whole; only `And` nodes are flattened.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            Predicate::And(a, b) => {
                let mut out = a.conjuncts();
                out.extend(b.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// Rebuilds a conjunction from parts (inverse of [`conjuncts`](Self::conjuncts)).
    pub fn from_conjuncts(mut parts: Vec<Predicate>) -> Option<Predicate> {
        let first = if parts.is_empty() {
            return None;
        } else {
            parts.remove(0)
        };
        Some(
            parts
                .into_iter()
                .fold(first, |acc, p| Predicate::And(Box::new(acc), Box::new(p))),
        )
    }

    /// Returns the first similarity term in the conjunction, if any.
    pub fn similarity(&self) -> Option<&Predicate> {
        self.conjuncts()
            .into_iter()
            .find(|p| matches!(p, Predicate::Similarity { .. }))
    }
}
