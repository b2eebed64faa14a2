//! Query planner.
//!
//! For each SELECT the planner picks one of four execution modes, in
//! priority order:
//!
//! 1. **Vector**: a similarity term anywhere in the conjunction makes
//!    the plan vector-first (search, then filter the residual).
//! 2. **Key**: a unique probe: `id = '...'`, or equality on the schema's
//!    key field.
//! 3. **Index**: equality/IN conjuncts on indexed fields; posting lists
//!    are intersected before records are loaded.
//! 4. **Scan**: prefix-scan all entities of the type and evaluate the
//!    predicate per record.
//!
//! `SEARCH` statements are always vector plans. Range predicates never
//! use the secondary index (it stores exact values only).

use super::ast::{CompareOp, Predicate, Scalar, SimilarityFn, Statement};
use crate::schema::SchemaRecord;
use crate::types::EntityId;
use crate::vector::VectorSlot;

/// Probe for key mode.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyProbe {
    /// `id = 'uuid'`
    Id(EntityId),
    /// Equality on the key field (or `name` when no key field is declared).
    KeyField(String),
}

/// A vector-search stage.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorProbe {
    /// Which vector slot to search.
    pub slot: VectorSlot,
    /// The measure named in the statement.
    pub function: SimilarityFn,
    /// Text handed to the embedder.
    pub text: String,
    /// Score floor, if the statement guarded the call.
    pub min_score: Option<f32>,
}

/// Chosen access path for a SELECT or SEARCH.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessPath {
    /// Point lookup.
    Key(KeyProbe),
    /// Secondary-index probes to intersect: `(field, accepted values)`.
    Index(Vec<(String, Vec<String>)>),
    /// Vector search first, residual filter after.
    Vector(VectorProbe),
    /// Full prefix scan of the type.
    Scan,
}

/// Plans the access path for a statement's predicate.
///
/// `schema` may be absent (unknown type scans resolve to empty at
/// execution); planning still succeeds so the executor can return an
/// empty result rather than an error.
pub fn plan_access(
    statement: &Statement,
    schema: Option<&SchemaRecord>,
) -> AccessPath {
    let predicate = match statement {
        Statement::Select { predicate, .. } => predicate.as_ref(),
        Statement::Search {
            text,
            predicate: _,
            ..
        } => {
            // SEARCH is vector-first by definition; the statement's own
            // text is the probe.
            return AccessPath::Vector(VectorProbe {
                slot: VectorSlot::Default,
                function: SimilarityFn::Cosine,
                text: text.clone(),
                min_score: None,
            });
        }
        _ => return AccessPath::Scan,
    };

    let Some(predicate) = predicate else {
        return AccessPath::Scan;
    };
    let conjuncts = predicate.conjuncts();

    // 1. Vector-first when any conjunct is a similarity term.
    for conjunct in &conjuncts {
        if let Predicate::Similarity {
            slot,
            function,
            text,
            min_score,
        } = conjunct
        {
            return AccessPath::Vector(VectorProbe {
                slot: *slot,
                function: *function,
                text: text.clone(),
                min_score: *min_score,
            });
        }
    }

    // 2. Key mode: id equality, or key-field equality.
    for conjunct in &conjuncts {
        if let Predicate::Compare {
            field,
            op: CompareOp::Eq,
            value: Scalar::Str(value),
        } = conjunct
        {
            if field == "id" {
                if let Some(id) = EntityId::parse(value) {
                    return AccessPath::Key(KeyProbe::Id(id));
                }
            }
            let key_field = schema
                .and_then(|s| s.def.key_field.clone())
                .unwrap_or_else(|| "name".to_string());
            if *field == key_field {
                return AccessPath::Key(KeyProbe::KeyField(value.clone()));
            }
        }
    }

    // 3. Index mode: equality or IN on indexed fields.
    if let Some(schema) = schema {
        let mut probes: Vec<(String, Vec<String>)> = Vec::new();
        for conjunct in &conjuncts {
            match conjunct {
                Predicate::Compare {
                    field,
                    op: CompareOp::Eq,
                    value,
                } if schema.def.indexed_fields.contains(field) => {
                    if let Some(repr) = value.index_repr() {
                        probes.push((field.clone(), vec![repr]));
                    }
                }
                Predicate::InList { field, values }
                    if schema.def.indexed_fields.contains(field) =>
                {
                    let reprs: Vec<String> =
                        values.iter().filter_map(Scalar::index_repr).collect();
                    if !reprs.is_empty() {
                        probes.push((field.clone(), reprs));
                    }
                }
                _ => {}
            }
        }
        if !probes.is_empty() {
            return AccessPath::Index(probes);
        }
    }

    // 4. Fall back to a full type scan.
    AccessPath::Scan
}
