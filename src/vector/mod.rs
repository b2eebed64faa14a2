//! Vector index catalog.
//!
//! One in-memory HNSW graph exists per `(tenant, type, slot)` triple,
//! where the slot selects the default `embedding` or the alternate
//! `embedding_alt` vector. The catalog owns the graphs for a single
//! tenant, resolves snapshot file locations, and loads snapshots on open.
//!
//! # Staleness contract
//!
//! Writes return before their embedding is computed; the background
//! worker fills the index afterwards. A search may therefore omit very
//! recently inserted entities.

pub mod hnsw;

pub use hnsw::HnswIndex;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::HnswConfig;
use crate::error::{RemError, Result};
use crate::types::EntityId;

/// Distance metric a schema declares for its vectors.
///
/// Cosine suits locally-trained models; inner product suits vectors a
/// provider has already normalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Inner product / dot similarity.
    InnerProduct,
}

/// Which of an entity's two vectors an index covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorSlot {
    /// The `embedding` field.
    Default,
    /// The `embedding_alt` field.
    Alt,
}

impl VectorSlot {
    /// Field name as it appears in records, snapshot filenames, and query
    /// syntax.
    pub fn field_name(&self) -> &'static str {
        match self {
            VectorSlot::Default => "embedding",
            VectorSlot::Alt => "embedding_alt",
        }
    }

    /// Stable single-byte tag for key encoding.
    pub fn tag(&self) -> u8 {
        match self {
            VectorSlot::Default => 0,
            VectorSlot::Alt => 1,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(VectorSlot::Default),
            1 => Some(VectorSlot::Alt),
            _ => None,
        }
    }

    /// Resolves a query-surface field name.
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "embedding" => Some(VectorSlot::Default),
            "embedding_alt" => Some(VectorSlot::Alt),
            _ => None,
        }
    }
}

/// Per-tenant collection of HNSW indexes.
///
/// The outer RwLock protects the map; each index has its own internal
/// locking for concurrent search and upsert.
pub struct VectorCatalog {
    dir: PathBuf,
    config: HnswConfig,
    indexes: RwLock<HashMap<(String, VectorSlot), Arc<HnswIndex>>>,
}

impl VectorCatalog {
    /// Creates a catalog rooted at the tenant's `vector_meta/` directory.
    pub fn new(dir: PathBuf, config: HnswConfig) -> Self {
        Self {
            dir,
            config,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot file for an index: `{dir}/{type}.{field}.hnsw`.
    pub fn snapshot_path(&self, entity_type: &str, slot: VectorSlot) -> PathBuf {
        self.dir
            .join(format!("{}.{}.hnsw", entity_type, slot.field_name()))
    }

    /// Returns the index for a type/slot, creating an empty one if needed.
    pub fn get_or_create(
        &self,
        entity_type: &str,
        slot: VectorSlot,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Arc<HnswIndex>> {
        if let Some(index) = self.try_get(entity_type, slot)? {
            return Ok(index);
        }
        let mut map = self.write_map()?;
        // Re-check: another thread may have created it between locks.
        if let Some(index) = map.get(&(entity_type.to_string(), slot)) {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(HnswIndex::new(dimension, metric, &self.config));
        map.insert((entity_type.to_string(), slot), Arc::clone(&index));
        Ok(index)
    }

    /// Returns the index for a type/slot if one exists in memory.
    pub fn try_get(&self, entity_type: &str, slot: VectorSlot) -> Result<Option<Arc<HnswIndex>>> {
        Ok(self
            .read_map()?
            .get(&(entity_type.to_string(), slot))
            .cloned())
    }

    /// Removes an entity from every slot of its type. Idempotent.
    pub fn remove_entity(&self, entity_type: &str, id: EntityId) -> Result<()> {
        for slot in [VectorSlot::Default, VectorSlot::Alt] {
            if let Some(index) = self.try_get(entity_type, slot)? {
                index.remove(id)?;
            }
        }
        Ok(())
    }

    /// Serializes one index and writes its snapshot file.
    ///
    /// Writes to a temp file and renames, so a crash mid-save leaves the
    /// previous snapshot intact.
    pub fn save(&self, entity_type: &str, slot: VectorSlot) -> Result<()> {
        let Some(index) = self.try_get(entity_type, slot)? else {
            return Ok(());
        };
        std::fs::create_dir_all(&self.dir)?;
        let bytes = index.snapshot()?;
        let path = self.snapshot_path(entity_type, slot);
        let tmp = path.with_extension("hnsw.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &path)?;
        debug!(
            entity_type,
            field = slot.field_name(),
            vectors = index.len(),
            "vector snapshot saved"
        );
        Ok(())
    }

    /// Loads a snapshot file into the catalog, replacing any in-memory
    /// index for the type/slot.
    ///
    /// Returns false if no snapshot file exists.
    pub fn load(
        &self,
        entity_type: &str,
        slot: VectorSlot,
        metric: DistanceMetric,
    ) -> Result<bool> {
        let path = self.snapshot_path(entity_type, slot);
        if !path.exists() {
            return Ok(false);
        }
        let bytes = std::fs::read(&path)?;
        let index = HnswIndex::restore(&bytes, metric, &self.config)?;
        debug!(
            entity_type,
            field = slot.field_name(),
            vectors = index.len(),
            "vector snapshot loaded"
        );
        self.write_map()?
            .insert((entity_type.to_string(), slot), Arc::new(index));
        Ok(true)
    }

    /// Saves every in-memory index; failures are logged per index and do
    /// not interrupt the sweep (the snapshot is a cache, the store is the
    /// source of truth).
    pub fn save_all(&self) {
        let entries: Vec<(String, VectorSlot)> = match self.read_map() {
            Ok(map) => map.keys().cloned().collect(),
            Err(_) => return,
        };
        for (entity_type, slot) in entries {
            if let Err(e) = self.save(&entity_type, slot) {
                warn!(
                    entity_type,
                    field = slot.field_name(),
                    error = %e,
                    "failed to save vector snapshot"
                );
            }
        }
    }

    /// Root directory of this catalog's snapshot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_map(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<(String, VectorSlot), Arc<HnswIndex>>>> {
        self.indexes
            .read()
            .map_err(|_| RemError::vector("vector catalog lock poisoned"))
    }

    fn write_map(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<(String, VectorSlot), Arc<HnswIndex>>>>
    {
        self.indexes
            .write()
            .map_err(|_| RemError::vector("vector catalog lock poisoned"))
    }
}

impl std::fmt::Debug for VectorCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.read_map().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("VectorCatalog")
            .field("dir", &self.dir)
            .field("indexes", &count)
            .finish()
    }
}
