//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw` with:
//! - Bidirectional `EntityId` ↔ internal id mapping
//! - Upsert-by-replacement and soft-delete via a filtered search
//! - An owned copy of every live vector, which doubles as the snapshot
//!   payload (`HNSWSNAP` files) and the source for graph rebuilds
//!
//! # Thread Safety
//!
//! The `hnsw_rs::Hnsw` graph uses `parking_lot::RwLock` internally, so
//! `insert()` takes `&self`. Our metadata (`IndexState`) is protected by
//! `std::sync::RwLock`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use hnsw_rs::prelude::*;

use super::DistanceMetric;
use crate::config::HnswConfig;
use crate::error::{RemError, Result};
use crate::types::EntityId;

/// Snapshot file magic.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"HNSWSNAP";

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The HNSW graph, parameterized by distance metric.
///
/// The metric is declared per schema, so one catalog holds graphs of both
/// kinds. Scores are normalized as `1.0 - distance` for either metric:
/// cosine distance maps to cosine similarity, dot distance (`1 - x·y`)
/// maps back to the inner product.
enum Graph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    Dot(Hnsw<'static, f32, DistDot>),
}

impl Graph {
    fn new(metric: DistanceMetric, config: &HnswConfig) -> Self {
        match metric {
            DistanceMetric::Cosine => Graph::Cosine(Hnsw::new(
                config.max_nb_connection,
                config.max_elements,
                config.max_layer,
                config.ef_construction,
                DistCosine,
            )),
            DistanceMetric::InnerProduct => Graph::Dot(Hnsw::new(
                config.max_nb_connection,
                config.max_elements,
                config.max_layer,
                config.ef_construction,
                DistDot,
            )),
        }
    }

    fn insert(&self, vector: &[f32], internal_id: usize) {
        match self {
            Graph::Cosine(h) => h.insert((vector, internal_id)),
            Graph::Dot(h) => h.insert((vector, internal_id)),
        }
    }

    fn search_filter(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        filter: Option<&dyn FilterT>,
    ) -> Vec<Neighbour> {
        match self {
            Graph::Cosine(h) => h.search_filter(query, k, ef_search, filter),
            Graph::Dot(h) => h.search_filter(query, k, ef_search, filter),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<Neighbour> {
        match self {
            Graph::Cosine(h) => h.search(query, k, ef_search),
            Graph::Dot(h) => h.search(query, k, ef_search),
        }
    }
}

/// Internal mutable state for id mapping and soft-deletion.
struct IndexState {
    /// Forward map: EntityId → current internal id.
    id_to_internal: HashMap<EntityId, usize>,

    /// Reverse map: internal id → EntityId. Vec for O(1) lookup.
    internal_to_id: Vec<EntityId>,

    /// Owned vectors by internal id. `None` once superseded by an upsert.
    vectors: Vec<Option<Vec<f32>>>,

    /// Internal ids excluded from search (deleted or superseded).
    deleted: HashSet<usize>,
}

/// Deletion-filter bridging our `HashSet` to hnsw_rs's `FilterT`.
struct DeletedFilter<'a>(&'a HashSet<usize>);

impl FilterT for DeletedFilter<'_> {
    fn hnsw_filter(&self, id: &DataId) -> bool {
        !self.0.contains(id)
    }
}

/// HNSW vector index for one `(tenant, type, slot)` triple.
pub struct HnswIndex {
    graph: Graph,
    state: RwLock<IndexState>,
    metric: DistanceMetric,
    dimension: usize,
    ef_search: usize,
}

impl HnswIndex {
    /// Creates a new empty index.
    pub fn new(dimension: usize, metric: DistanceMetric, config: &HnswConfig) -> Self {
        Self {
            graph: Graph::new(metric, config),
            state: RwLock::new(IndexState {
                id_to_internal: HashMap::new(),
                internal_to_id: Vec::new(),
                vectors: Vec::new(),
                deleted: HashSet::new(),
            }),
            metric,
            dimension,
            ef_search: config.ef_search,
        }
    }

    /// Expected vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Metric this index compares with.
    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Inserts or replaces the vector for an entity.
    ///
    /// hnsw_rs graphs cannot remove points, so replacement assigns a fresh
    /// internal id and retires the old one into the deleted set; the
    /// superseded point disappears from search immediately and physically
    /// at the next snapshot/restore cycle.
    pub fn upsert(&self, id: EntityId, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RemError::vector(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        let internal_id = {
            let mut state = self.write_state()?;
            if let Some(&old) = state.id_to_internal.get(&id) {
                state.deleted.insert(old);
                if let Some(slot) = state.vectors.get_mut(old) {
                    *slot = None;
                }
            }
            let internal_id = state.internal_to_id.len();
            state.id_to_internal.insert(id, internal_id);
            state.internal_to_id.push(id);
            state.vectors.push(Some(vector.clone()));
            internal_id
        };

        // Graph insert happens outside our lock; hnsw_rs locks internally.
        self.graph.insert(&vector, internal_id);
        Ok(())
    }

    /// Marks an entity deleted. Idempotent; unknown ids are a no-op.
    pub fn remove(&self, id: EntityId) -> Result<()> {
        let mut state = self.write_state()?;
        if let Some(&internal_id) = state.id_to_internal.get(&id) {
            state.deleted.insert(internal_id);
            state.id_to_internal.remove(&id);
            if let Some(slot) = state.vectors.get_mut(internal_id) {
                *slot = None;
            }
        }
        Ok(())
    }

    /// Searches for the nearest entities.
    ///
    /// Returns `(EntityId, score)` pairs with `score = 1 - distance`,
    /// sorted by descending score, ties broken by ascending id. Results
    /// below `min_score` are dropped.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<(EntityId, f32)>> {
        if query.len() != self.dimension {
            return Err(RemError::vector(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let state = self.read_state()?;
        let ef = self.ef_search.max(top_k);
        let neighbours = if state.deleted.is_empty() {
            self.graph.search(query, top_k, ef)
        } else {
            let filter = DeletedFilter(&state.deleted);
            self.graph.search_filter(query, top_k, ef, Some(&filter))
        };

        let mut results: Vec<(EntityId, f32)> = neighbours
            .into_iter()
            .filter_map(|n| {
                state
                    .internal_to_id
                    .get(n.d_id)
                    .map(|&id| (id, 1.0 - n.distance))
            })
            .filter(|(_, score)| min_score.map_or(true, |min| *score >= min))
            .collect();

        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(top_k);
        Ok(results)
    }

    /// Returns the stored vector for an entity, if present and live.
    pub fn vector_of(&self, id: EntityId) -> Result<Option<Vec<f32>>> {
        let state = self.read_state()?;
        Ok(state
            .id_to_internal
            .get(&id)
            .and_then(|&internal| state.vectors.get(internal))
            .and_then(|v| v.clone()))
    }

    /// Returns true if the entity is indexed and not deleted.
    pub fn contains(&self, id: EntityId) -> bool {
        self.read_state()
            .map(|s| s.id_to_internal.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of live (non-deleted) vectors.
    pub fn len(&self) -> usize {
        self.read_state().map(|s| s.id_to_internal.len()).unwrap_or(0)
    }

    /// Returns true if no live vectors are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Snapshot format
    // ========================================================================

    /// Serializes the index to the `HNSWSNAP` snapshot format.
    ///
    /// ```text
    /// [magic "HNSWSNAP"][version: u32][dimension: u32][count: u32]
    /// [vectors: count * dimension * f32]      // graph payload
    /// [uuids:   count * 16 bytes]             // internal id -> UUID
    /// ```
    ///
    /// Only live vectors are written, so a snapshot/restore cycle also
    /// compacts superseded and deleted points out of the graph.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let state = self.read_state()?;

        let mut live: Vec<(EntityId, &Vec<f32>)> = state
            .id_to_internal
            .iter()
            .filter_map(|(&id, &internal)| {
                state.vectors.get(internal).and_then(|v| v.as_ref()).map(|v| (id, v))
            })
            .collect();
        live.sort_by_key(|(id, _)| *id);

        let mut out = Vec::with_capacity(20 + live.len() * (16 + self.dimension * 4));
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(live.len() as u32).to_le_bytes());
        for (_, vector) in &live {
            for component in vector.iter() {
                out.extend_from_slice(&component.to_le_bytes());
            }
        }
        for (id, _) in &live {
            out.extend_from_slice(id.as_bytes());
        }
        Ok(out)
    }

    /// Rebuilds an index from a snapshot produced by [`snapshot`](Self::snapshot).
    ///
    /// The graph is derived state: it is reconstructed by re-inserting the
    /// snapshot's vector table.
    pub fn restore(
        bytes: &[u8],
        metric: DistanceMetric,
        config: &HnswConfig,
    ) -> Result<Self> {
        if bytes.len() < 20 || &bytes[..8] != SNAPSHOT_MAGIC {
            return Err(RemError::vector("bad snapshot magic"));
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != SNAPSHOT_VERSION {
            return Err(RemError::vector(format!(
                "unsupported snapshot version {}",
                version
            )));
        }
        let dimension = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        let count = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;

        let vectors_len = count * dimension * 4;
        let expected = 20 + vectors_len + count * 16;
        if bytes.len() != expected {
            return Err(RemError::vector(format!(
                "snapshot truncated: expected {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }

        let index = Self::new(dimension, metric, config);
        let vector_bytes = &bytes[20..20 + vectors_len];
        let uuid_bytes = &bytes[20 + vectors_len..];

        for i in 0..count {
            let mut vector = Vec::with_capacity(dimension);
            let base = i * dimension * 4;
            for d in 0..dimension {
                let off = base + d * 4;
                vector.push(f32::from_le_bytes(
                    vector_bytes[off..off + 4].try_into().unwrap(),
                ));
            }
            let id_off = i * 16;
            let id = EntityId::from_bytes(uuid_bytes[id_off..id_off + 16].try_into().unwrap());
            index.upsert(id, vector)?;
        }

        Ok(index)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| RemError::vector("index state lock poisoned"))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| RemError::vector("index state lock poisoned"))
    }
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HnswConfig {
        HnswConfig {
            max_nb_connection: 16,
            ef_construction: 100,
            ef_search: 50,
            max_layer: 8,
            max_elements: 1000,
        }
    }

    /// Deterministic embedding from a seed; close seeds produce similar
    /// vectors.
    fn make_vector(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
            .collect()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = HnswIndex::new(8, DistanceMetric::Cosine, &test_config());
        assert!(index.is_empty());
    }

    #[test]
    fn test_upsert_and_search() {
        let dim = 8;
        let index = HnswIndex::new(dim, DistanceMetric::Cosine, &test_config());
        let mut ids = Vec::new();
        for i in 0..10u64 {
            let id = EntityId::new();
            index.upsert(id, make_vector(i, dim)).unwrap();
            ids.push(id);
        }
        assert_eq!(index.len(), 10);

        let results = index.search(&make_vector(5, dim), 3, None).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        // Results sorted by score descending
        for w in results.windows(2) {
            assert!(w[0].1 >= w[1].1, "results not sorted by score");
        }
        assert_eq!(results[0].0, ids[5]);
    }

    #[test]
    fn test_identical_vector_scores_near_one() {
        let dim = 8;
        let index = HnswIndex::new(dim, DistanceMetric::Cosine, &test_config());
        let id = EntityId::new();
        let v = make_vector(42, dim);
        index.upsert(id, v.clone()).unwrap();

        let results = index.search(&v, 1, None).unwrap();
        assert_eq!(results[0].0, id);
        assert!(
            (results[0].1 - 1.0).abs() < 0.001,
            "expected score ~1.0, got {}",
            results[0].1
        );
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = HnswIndex::new(384, DistanceMetric::Cosine, &test_config());
        let err = index.upsert(EntityId::new(), vec![1.0; 128]).unwrap_err();
        assert!(err.to_string().contains("dimension"));
        assert!(index.search(&[1.0; 64], 5, None).is_err());
    }

    #[test]
    fn test_upsert_replaces() {
        let dim = 4;
        let index = HnswIndex::new(dim, DistanceMetric::Cosine, &test_config());
        let id = EntityId::new();
        index.upsert(id, make_vector(1, dim)).unwrap();
        index.upsert(id, make_vector(99, dim)).unwrap();

        assert_eq!(index.len(), 1);
        let stored = index.vector_of(id).unwrap().unwrap();
        assert_eq!(stored, make_vector(99, dim));
    }

    #[test]
    fn test_remove_excludes_from_search() {
        let dim = 8;
        let index = HnswIndex::new(dim, DistanceMetric::Cosine, &test_config());
        let mut ids = Vec::new();
        for i in 0..5u64 {
            let id = EntityId::new();
            index.upsert(id, make_vector(i, dim)).unwrap();
            ids.push(id);
        }

        index.remove(ids[0]).unwrap();
        assert_eq!(index.len(), 4);
        assert!(!index.contains(ids[0]));

        let results = index.search(&make_vector(0, dim), 10, None).unwrap();
        assert!(results.iter().all(|(id, _)| *id != ids[0]));
    }

    #[test]
    fn test_min_score_filters() {
        let dim = 8;
        let index = HnswIndex::new(dim, DistanceMetric::Cosine, &test_config());
        for i in 0..10u64 {
            index.upsert(EntityId::new(), make_vector(i * 50, dim)).unwrap();
        }
        let results = index.search(&make_vector(0, dim), 10, Some(0.999)).unwrap();
        assert!(results.iter().all(|(_, score)| *score >= 0.999));
    }

    #[test]
    fn test_search_empty_index() {
        let index = HnswIndex::new(4, DistanceMetric::Cosine, &test_config());
        assert!(index.search(&make_vector(1, 4), 10, None).unwrap().is_empty());
    }

    #[test]
    fn test_inner_product_metric() {
        let dim = 4;
        let index = HnswIndex::new(dim, DistanceMetric::InnerProduct, &test_config());
        let id = EntityId::new();
        // Unit vector: dot with itself = 1, so score = 1 - (1 - 1) = 1
        let v = vec![1.0, 0.0, 0.0, 0.0];
        index.upsert(id, v.clone()).unwrap();
        let results = index.search(&v, 1, None).unwrap();
        assert_eq!(results[0].0, id);
        assert!((results[0].1 - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let dim = 8;
        let index = HnswIndex::new(dim, DistanceMetric::Cosine, &test_config());
        let mut ids = Vec::new();
        for i in 0..20u64 {
            let id = EntityId::new();
            index.upsert(id, make_vector(i, dim)).unwrap();
            ids.push(id);
        }
        index.remove(ids[3]).unwrap();

        let bytes = index.snapshot().unwrap();
        assert_eq!(&bytes[..8], SNAPSHOT_MAGIC);

        let restored =
            HnswIndex::restore(&bytes, DistanceMetric::Cosine, &test_config()).unwrap();
        assert_eq!(restored.len(), 19);
        assert!(!restored.contains(ids[3]));
        assert_eq!(
            restored.vector_of(ids[7]).unwrap().unwrap(),
            make_vector(7, dim)
        );

        let results = restored.search(&make_vector(10, dim), 3, None).unwrap();
        assert_eq!(results[0].0, ids[10]);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(HnswIndex::restore(b"nope", DistanceMetric::Cosine, &test_config()).is_err());
        let mut bytes = b"HNSWSNAP".to_vec();
        bytes.extend_from_slice(&9u32.to_le_bytes()); // bad version
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(HnswIndex::restore(&bytes, DistanceMetric::Cosine, &test_config()).is_err());
    }

    #[test]
    fn test_empty_snapshot_roundtrip() {
        let index = HnswIndex::new(16, DistanceMetric::Cosine, &test_config());
        let bytes = index.snapshot().unwrap();
        let restored =
            HnswIndex::restore(&bytes, DistanceMetric::Cosine, &test_config()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.dimension(), 16);
    }
}
