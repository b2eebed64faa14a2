//! Engine lifecycle: open, close, reopen, and state that must survive.

mod common;

use common::{open_db, open_node, resources_schema, wait_for_embedding, DIM};
use serde_json::json;

#[test]
fn test_open_creates_root_and_tenant_dirs() {
    let (db, dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    db.insert("acme", "resources", json!({ "name": "Doc" })).unwrap();

    assert!(dir.path().join("acme").join("data.redb").exists());
    db.close().unwrap();
}

#[test]
fn test_entities_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let db = open_node(dir.path(), "node-0");
        db.register_schema("acme", resources_schema()).unwrap();
        let id = db
            .insert("acme", "resources", json!({ "name": "Persist", "category": "x" }))
            .unwrap();
        db.close().unwrap();
        id
    };

    let db = open_node(dir.path(), "node-0");
    let entity = db.get("acme", id).unwrap();
    assert_eq!(entity.name, "Persist");
    assert_eq!(
        entity.properties.get_path("category").and_then(|v| v.as_str()),
        Some("x")
    );
    db.close().unwrap();
}

#[test]
fn test_schemas_reload_from_storage() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open_node(dir.path(), "node-0");
        db.register_schema("acme", resources_schema()).unwrap();
        db.close().unwrap();
    }

    let db = open_node(dir.path(), "node-0");
    // No re-registration: the cache warms from the stored schema entity.
    let def = db.get_schema("acme", "resources").unwrap();
    assert_eq!(def.indexed_fields, vec!["category"]);
    // Inserts validate against the reloaded schema immediately.
    db.insert("acme", "resources", json!({ "name": "after reopen" }))
        .unwrap();
    db.close().unwrap();
}

#[test]
fn test_wal_sequence_resumes_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let seq_before = {
        let db = open_node(dir.path(), "node-0");
        db.register_schema("acme", resources_schema()).unwrap();
        for i in 0..5 {
            db.insert("acme", "resources", json!({ "name": format!("e{}", i) }))
                .unwrap();
        }
        let seq = db.current_seq("acme").unwrap();
        db.close().unwrap();
        seq
    };

    let db = open_node(dir.path(), "node-0");
    assert_eq!(db.current_seq("acme").unwrap(), seq_before);
    db.insert("acme", "resources", json!({ "name": "one more" }))
        .unwrap();
    assert_eq!(db.current_seq("acme").unwrap(), seq_before + 1);
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vector_index_survives_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let db = open_node(dir.path(), "node-0");
        db.register_schema("acme", resources_schema()).unwrap();
        let id = db
            .insert(
                "acme",
                "resources",
                json!({ "name": "Guide", "content": "learn rust borrowing" }),
            )
            .unwrap();
        wait_for_embedding(&db, "acme", id);
        db.close().unwrap();
        id
    };

    // Snapshot file exists after close.
    let snapshot = dir
        .path()
        .join("acme")
        .join("vector_meta")
        .join("resources.embedding.hnsw");
    assert!(snapshot.exists(), "close should persist the vector snapshot");

    let db = open_node(dir.path(), "node-0");
    let hits = db
        .search("acme", "resources", "rust borrowing", 5, None)
        .await
        .unwrap();
    assert!(hits.iter().any(|(e, _)| e.id == id));
    db.close().unwrap();
}

#[test]
fn test_embedding_rebuild_without_snapshot() {
    // Delete the snapshot; vectors still come back from the records.
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let db = open_node(dir.path(), "node-0");
        db.register_schema("acme", resources_schema()).unwrap();
        let id = db
            .insert(
                "acme",
                "resources",
                json!({ "name": "Guide", "content": "tokio async runtime" }),
            )
            .unwrap();
        wait_for_embedding(&db, "acme", id);
        db.close().unwrap();
        id
    };

    let vector_meta = dir.path().join("acme").join("vector_meta");
    if vector_meta.exists() {
        std::fs::remove_dir_all(&vector_meta).unwrap();
    }

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let db = open_node(dir.path(), "node-0");
    let hits = runtime
        .block_on(db.search("acme", "resources", "tokio async", 5, None))
        .unwrap();
    assert!(hits.iter().any(|(e, _)| e.id == id));
    db.close().unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = remdb::Config {
        node_id: String::new(),
        ..Default::default()
    };
    let result = remdb::RemDb::open(
        dir.path(),
        config,
        std::sync::Arc::new(common::HashEmbedder::new(DIM)),
    );
    assert!(result.is_err());
}

#[test]
fn test_invalid_tenant_identifier_rejected() {
    let (db, _dir) = open_db();
    let err = db
        .insert("bad:tenant", "resources", json!({ "name": "x" }))
        .unwrap_err();
    assert!(err.is_validation());
    db.close().unwrap();
}
