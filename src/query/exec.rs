//! Query executor.
//!
//! Runs a planned statement against one tenant's stores. Execution is
//! synchronous except for the embedder call a vector-first plan needs;
//! the storage layer itself never suspends.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::debug;

use super::ast::{CompareOp, Predicate, Projection, Scalar, SimilarityFn, SortOrder, Statement};
use super::plan::{plan_access, AccessPath, KeyProbe, VectorProbe};
use super::QueryResult;
use crate::config::Bm25Config;
use crate::embedding::Embedder;
use crate::entity::{lookup, Entity, EntityStore};
use crate::error::{QueryError, RemError, Result};
use crate::graph::{self, TraversalOrder};
use crate::schema::{SchemaRecord, SchemaRegistry};
use crate::storage::keys;
use crate::types::{EntityId, Value};
use crate::vector::{DistanceMetric, VectorCatalog};

/// Results below a plan's limit are fetched at `limit * OVERFETCH` from
/// the vector index so residual predicates have room to filter.
const OVERFETCH_FACTOR: usize = 5;

/// Default result count for SEARCH and vector-first SELECTs without LIMIT.
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Attribute columns every entity row carries.
const BASE_COLUMNS: [&str; 5] = ["id", "type", "name", "created_at", "modified_at"];

/// Everything a statement needs to execute against one tenant.
pub(crate) struct ExecContext<'a> {
    pub store: &'a EntityStore,
    pub registry: &'a SchemaRegistry,
    pub vectors: &'a VectorCatalog,
    pub embedder: &'a dyn Embedder,
    pub bm25: &'a Bm25Config,
    pub deadline: Option<Instant>,
}

/// A candidate row: the entity plus its similarity score, if any.
struct Candidate {
    entity: Entity,
    score: Option<f32>,
}

impl<'a> ExecContext<'a> {
    /// Executes a parsed statement.
    pub async fn execute(&self, statement: Statement) -> Result<QueryResult> {
        match statement {
            Statement::Select { .. } | Statement::Search { .. } => {
                self.execute_retrieval(statement).await
            }
            Statement::Traverse {
                start,
                depth,
                direction,
                edge_type,
            } => {
                let entities = graph::traverse(
                    self.store,
                    start,
                    depth,
                    direction,
                    edge_type.as_deref(),
                    TraversalOrder::Bfs,
                    self.deadline,
                )?;
                let candidates: Vec<Candidate> = entities
                    .into_iter()
                    .map(|entity| Candidate {
                        entity,
                        score: None,
                    })
                    .collect();
                Ok(project(&Projection::All, &candidates, false))
            }
            Statement::Lookup { values } => {
                let types = self.registry.type_names()?;
                let mut seen = BTreeSet::new();
                let mut candidates = Vec::new();
                for value in &values {
                    self.check_deadline()?;
                    for hit in lookup::lookup(self.store, &types, value, self.bm25)? {
                        if seen.insert(hit.entity.id) {
                            candidates.push(Candidate {
                                entity: hit.entity,
                                score: Some(hit.score),
                            });
                        }
                    }
                }
                Ok(project(&Projection::All, &candidates, true))
            }
        }
    }

    async fn execute_retrieval(&self, statement: Statement) -> Result<QueryResult> {
        let (entity_type, projection, predicate, order_by, limit, offset) = match &statement {
            Statement::Select {
                projection,
                entity_type,
                predicate,
                order_by,
                limit,
                offset,
            } => (
                entity_type.clone(),
                projection.clone(),
                predicate.clone(),
                order_by.clone(),
                *limit,
                offset.unwrap_or(0),
            ),
            Statement::Search {
                entity_type,
                predicate,
                limit,
                ..
            } => (
                entity_type.clone(),
                Projection::All,
                predicate.clone(),
                None,
                *limit,
                0,
            ),
            _ => unreachable!("execute_retrieval only sees SELECT/SEARCH"),
        };

        // LIMIT 0 short-circuits before any work.
        if limit == Some(0) {
            return Ok(project(&projection, &[], false));
        }

        let schema = self.registry.try_get(&entity_type)?;
        // Scanning a nonexistent type yields empty, not an error. The
        // reserved "schema" type is scannable without a registered
        // record: schemas are entities too.
        if schema.is_none() && entity_type != keys::SCHEMA_TYPE {
            return Ok(project(&projection, &[], false));
        }

        let path = plan_access(&statement, schema.as_deref());
        debug!(entity_type, ?path, "query planned");
        let vector_mode = matches!(path, AccessPath::Vector(_));

        let mut candidates = match path {
            AccessPath::Key(probe) => self.fetch_key(&entity_type, probe)?,
            AccessPath::Index(probes) => self.fetch_index(&entity_type, probes)?,
            AccessPath::Scan => self.fetch_scan(&entity_type)?,
            AccessPath::Vector(probe) => {
                let fetch_k = (limit.unwrap_or(DEFAULT_SEARCH_LIMIT) + offset)
                    .saturating_mul(OVERFETCH_FACTOR);
                self.fetch_vector(&entity_type, schema.as_deref(), probe, fetch_k)
                    .await?
            }
        };

        // Residual predicate. In vector mode the similarity term itself is
        // already satisfied by construction.
        if let Some(predicate) = &predicate {
            let mut kept = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                self.check_deadline()?;
                if eval_predicate(predicate, &candidate.entity, vector_mode)? {
                    kept.push(candidate);
                }
            }
            candidates = kept;
        }

        sort_candidates(&mut candidates, order_by.as_ref(), vector_mode);

        if offset > 0 {
            candidates.drain(..offset.min(candidates.len()));
        }
        if let Some(limit) = limit {
            candidates.truncate(limit);
        } else if vector_mode {
            candidates.truncate(DEFAULT_SEARCH_LIMIT);
        }

        Ok(project(&projection, &candidates, vector_mode))
    }

    // ========================================================================
    // Access paths
    // ========================================================================

    fn fetch_key(&self, entity_type: &str, probe: KeyProbe) -> Result<Vec<Candidate>> {
        let entities = match probe {
            KeyProbe::Id(id) => match self.store.get(id) {
                Ok(entity) => vec![entity],
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e),
            },
            KeyProbe::KeyField(value) => self.store.get_by_key(entity_type, &value)?,
        };
        Ok(entities
            .into_iter()
            .filter(|e| e.entity_type == entity_type)
            .map(|entity| Candidate {
                entity,
                score: None,
            })
            .collect())
    }

    fn fetch_index(
        &self,
        entity_type: &str,
        probes: Vec<(String, Vec<String>)>,
    ) -> Result<Vec<Candidate>> {
        let mut intersection: Option<BTreeSet<EntityId>> = None;
        for (field, values) in probes {
            self.check_deadline()?;
            let mut ids = BTreeSet::new();
            for value in values {
                ids.extend(self.store.index_lookup(entity_type, &field, &value)?);
            }
            intersection = Some(match intersection {
                None => ids,
                Some(prev) => prev.intersection(&ids).copied().collect(),
            });
            if intersection.as_ref().is_some_and(BTreeSet::is_empty) {
                break;
            }
        }

        let mut out = Vec::new();
        for id in intersection.unwrap_or_default() {
            if let Some(entity) = self.store.get_any(id)? {
                if !entity.is_deleted() && entity.entity_type == entity_type {
                    out.push(Candidate {
                        entity,
                        score: None,
                    });
                }
            }
        }
        Ok(out)
    }

    fn fetch_scan(&self, entity_type: &str) -> Result<Vec<Candidate>> {
        self.check_deadline()?;
        Ok(self
            .store
            .scan_type(entity_type)?
            .into_iter()
            .map(|entity| Candidate {
                entity,
                score: None,
            })
            .collect())
    }

    async fn fetch_vector(
        &self,
        entity_type: &str,
        schema: Option<&SchemaRecord>,
        probe: VectorProbe,
        fetch_k: usize,
    ) -> Result<Vec<Candidate>> {
        let metric = schema.map(|s| s.def.metric).unwrap_or_default();
        let wanted = match probe.function {
            SimilarityFn::Cosine => DistanceMetric::Cosine,
            SimilarityFn::InnerProduct => DistanceMetric::InnerProduct,
        };
        if wanted != metric {
            return Err(QueryError::unsupported(format!(
                "type '{}' compares vectors with {:?}",
                entity_type, metric
            ))
            .into());
        }

        let Some(index) = self.vectors.try_get(entity_type, probe.slot)? else {
            // No vectors indexed yet; the staleness contract says empty.
            return Ok(Vec::new());
        };

        let query = self.embedder.embed(&probe.text).await?;
        if query.len() != index.dimension() {
            return Err(RemError::embedding(format!(
                "embedder returned {} dimensions, index expects {}",
                query.len(),
                index.dimension()
            )));
        }

        let hits = index.search(&query, fetch_k.max(1), probe.min_score)?;
        let mut out = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            self.check_deadline()?;
            if let Some(entity) = self.store.get_any(id)? {
                if !entity.is_deleted() && entity.entity_type == entity_type {
                    out.push(Candidate {
                        entity,
                        score: Some(score),
                    });
                }
            }
        }
        Ok(out)
    }

    fn check_deadline(&self) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RemError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Predicate evaluation
// ============================================================================

/// Resolves a field to the entity attribute or property value it names.
fn attr_value(entity: &Entity, field: &str) -> Option<Value> {
    match field {
        "id" => Some(Value::Str(entity.id.to_string())),
        "type" => Some(Value::Str(entity.entity_type.clone())),
        "name" => Some(Value::Str(entity.name.clone())),
        "created_at" => Some(Value::Int(entity.created_at.as_millis())),
        "modified_at" => Some(Value::Int(entity.modified_at.as_millis())),
        _ => entity.properties.get_path(field).cloned(),
    }
}

/// Evaluates a predicate against one entity.
///
/// `vector_mode` marks plans where the similarity term was already
/// satisfied by the index search; outside vector mode a similarity term
/// cannot be evaluated per row and is refused.
fn eval_predicate(predicate: &Predicate, entity: &Entity, vector_mode: bool) -> Result<bool> {
    match predicate {
        Predicate::And(a, b) => {
            Ok(eval_predicate(a, entity, vector_mode)? && eval_predicate(b, entity, vector_mode)?)
        }
        Predicate::Or(a, b) => {
            Ok(eval_predicate(a, entity, vector_mode)? || eval_predicate(b, entity, vector_mode)?)
        }
        Predicate::Similarity { .. } => {
            if vector_mode {
                Ok(true)
            } else {
                Err(QueryError::unsupported(
                    "similarity terms must be top-level WHERE conjuncts",
                )
                .into())
            }
        }
        Predicate::Contains { field, needle } => Ok(attr_value(entity, field)
            .as_ref()
            .and_then(Value::as_str)
            .is_some_and(|s| s.contains(needle.as_str()))),
        Predicate::InList { field, values } => {
            let attr = attr_value(entity, field);
            Ok(values
                .iter()
                .any(|scalar| compare(attr.as_ref(), CompareOp::Eq, scalar)))
        }
        Predicate::Compare { field, op, value } => {
            Ok(compare(attr_value(entity, field).as_ref(), *op, value))
        }
    }
}

/// Three-valued-ish comparison: a missing field satisfies nothing except
/// equality with NULL.
fn compare(attr: Option<&Value>, op: CompareOp, scalar: &Scalar) -> bool {
    use std::cmp::Ordering;

    if matches!(scalar, Scalar::Null) {
        let is_null = attr.is_none() || attr.is_some_and(Value::is_null);
        return match op {
            CompareOp::Eq => is_null,
            CompareOp::NotEq => !is_null,
            _ => false,
        };
    }

    let Some(attr) = attr else {
        return false;
    };

    let ordering: Option<Ordering> = match (attr, scalar) {
        (Value::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Value::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Scalar::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Scalar::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Scalar::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Scalar::Str(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    };

    let Some(ordering) = ordering else {
        // Type mismatch: only != is satisfied.
        return op == CompareOp::NotEq;
    };

    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Lte => ordering != Ordering::Greater,
        CompareOp::Gte => ordering != Ordering::Less,
    }
}

// ============================================================================
// Ordering and projection
// ============================================================================

fn sort_candidates(
    candidates: &mut [Candidate],
    order_by: Option<&(String, SortOrder)>,
    vector_mode: bool,
) {
    match order_by {
        Some((field, order)) => {
            candidates.sort_by(|a, b| {
                let av = attr_value(&a.entity, field);
                let bv = attr_value(&b.entity, field);
                let ordering = cmp_values(av.as_ref(), bv.as_ref());
                let ordering = match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                ordering.then_with(|| a.entity.id.cmp(&b.entity.id))
            });
        }
        None if vector_mode => {
            // Score descending, ties ascending by id.
            candidates.sort_by(|a, b| {
                let a_score = a.score.unwrap_or(f32::MIN);
                let b_score = b.score.unwrap_or(f32::MIN);
                b_score
                    .partial_cmp(&a_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.entity.id.cmp(&b.entity.id))
            });
        }
        None => {
            // Default scan order: ascending id.
            candidates.sort_by(|a, b| a.entity.id.cmp(&b.entity.id));
        }
    }
}

/// Total order over heterogeneous values: null < bool < number < string <
/// bytes < list < map; numbers compare numerically across Int/Float.
fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Int(_) | Value::Float(_)) => 2,
            Some(Value::Str(_)) => 3,
            Some(Value::Bytes(_)) => 4,
            Some(Value::List(_)) => 5,
            Some(Value::Map(_)) => 6,
        }
    }

    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == 2 => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Str(x)), Some(Value::Str(y))) => x.cmp(y),
        (Some(Value::Bytes(x)), Some(Value::Bytes(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Builds the result table from candidates.
///
/// `with_score` appends the synthetic `_score` column (vector and lookup
/// results carry one).
fn project(projection: &Projection, candidates: &[Candidate], with_score: bool) -> QueryResult {
    let columns: Vec<String> = match projection {
        Projection::Fields(fields) => fields.clone(),
        Projection::All => {
            let mut columns: Vec<String> =
                BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
            let mut property_keys = BTreeSet::new();
            for candidate in candidates {
                if let Value::Map(map) = &candidate.entity.properties {
                    for key in map.keys() {
                        if !BASE_COLUMNS.contains(&key.as_str()) {
                            property_keys.insert(key.clone());
                        }
                    }
                }
            }
            columns.extend(property_keys);
            if with_score {
                columns.push("_score".to_string());
            }
            columns
        }
    };

    let rows = candidates
        .iter()
        .map(|candidate| {
            columns
                .iter()
                .map(|column| {
                    if column == "_score" {
                        candidate
                            .score
                            .and_then(|s| serde_json::Number::from_f64(s as f64))
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null)
                    } else {
                        attr_value(&candidate.entity, column)
                            .map(|v| v.to_json())
                            .unwrap_or(serde_json::Value::Null)
                    }
                })
                .collect()
        })
        .collect();

    QueryResult { columns, rows }
}
