//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use remdb::embedding::Embedder;
use remdb::{Config, DistanceMetric, EntityId, RemDb, Result, SchemaCategory, SchemaDefinition};

/// Embedding dimension used across the suites (small keeps HNSW fast).
pub const DIM: usize = 16;

/// Deterministic token-hash embedder.
///
/// Texts sharing tokens produce similar vectors, so semantic-search
/// assertions hold without a model.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 1469598103934665603;
            for b in token.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            v[(h % self.dimension as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Opens a fresh engine in a temp directory.
pub fn open_db() -> (RemDb, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = RemDb::open(
        dir.path(),
        Config::default(),
        Arc::new(HashEmbedder::new(DIM)),
    )
    .unwrap();
    (db, dir)
}

/// Opens a fresh engine with an explicit node id (replication suites).
pub fn open_node(dir: &std::path::Path, node_id: &str) -> RemDb {
    let config = Config {
        node_id: node_id.to_string(),
        ..Default::default()
    };
    RemDb::open(dir, config, Arc::new(HashEmbedder::new(DIM))).unwrap()
}

/// The "resources" schema most suites register: indexed `category`,
/// key field `name`, embeddable `content`.
pub fn resources_schema() -> SchemaDefinition {
    SchemaDefinition {
        name: "resources".to_string(),
        category: SchemaCategory::User,
        version: 1,
        json_schema: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "content": { "type": "string" },
                "category": { "type": "string" },
                "depth": { "type": "integer" }
            },
            "required": ["name"]
        }),
        description: "Ingested documents".to_string(),
        embedding_dimension: DIM,
        embedding_alt_dimension: None,
        metric: DistanceMetric::Cosine,
        indexed_fields: vec!["category".to_string()],
        key_field: Some("name".to_string()),
        embedding_fields: vec!["content".to_string()],
        tools: vec![],
    }
}

/// A minimal "agents" schema with no embeddings (graph suites).
pub fn agents_schema() -> SchemaDefinition {
    SchemaDefinition {
        name: "agents".to_string(),
        category: SchemaCategory::Agents,
        version: 1,
        json_schema: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" }
            },
            "required": ["name"]
        }),
        description: String::new(),
        embedding_dimension: DIM,
        embedding_alt_dimension: None,
        metric: DistanceMetric::Cosine,
        indexed_fields: vec![],
        key_field: Some("name".to_string()),
        embedding_fields: vec![],
        tools: vec![],
    }
}

/// Polls until the entity's default embedding is written by the worker.
pub fn wait_for_embedding(db: &RemDb, tenant: &str, id: EntityId) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let entity = db.get(tenant, id).unwrap();
        if entity.embedding.is_some() {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "embedding for {} never arrived",
            id
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}
