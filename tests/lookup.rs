//! Fuzzy key lookup: the exact → prefix → BM25 cascade.

mod common;

use common::{open_db, resources_schema};
use serde_json::json;

fn seed_names(db: &remdb::RemDb, names: &[&str]) -> Vec<remdb::EntityId> {
    names
        .iter()
        .map(|name| {
            db.insert("acme", "resources", json!({ "name": name }))
                .unwrap()
        })
        .collect()
}

#[test]
fn test_exact_tier_wins() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    seed_names(&db, &["alice@company.com", "alice@company.com.backup", "bob"]);

    // Exact match exists, so the longer prefix-matching key must NOT
    // appear: tiers never blend.
    let hits = db.lookup_entity("acme", "alice@company.com").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "alice@company.com");
    db.close().unwrap();
}

#[test]
fn test_exact_tier_is_case_folded() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    seed_names(&db, &["Alice@Company.COM"]);

    let hits = db.lookup_entity("acme", "alice@company.com").unwrap();
    assert_eq!(hits.len(), 1);
    db.close().unwrap();
}

#[test]
fn test_prefix_tier_when_no_exact_match() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    seed_names(&db, &["alpha-one", "alpha-two", "beta-one"]);

    let hits = db.lookup_entity("acme", "alpha").unwrap();
    let names: Vec<&str> = hits.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(hits.len(), 2);
    assert!(names.contains(&"alpha-one"));
    assert!(names.contains(&"alpha-two"));
    db.close().unwrap();
}

#[test]
fn test_prefix_tier_caps_at_ten() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    let names: Vec<String> = (0..15).map(|i| format!("server-{:02}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    seed_names(&db, &refs);

    let hits = db.lookup_entity("acme", "server").unwrap();
    assert_eq!(hits.len(), 10);
    db.close().unwrap();
}

#[test]
fn test_prefix_tier_orders_by_creation() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    let mut ids = Vec::new();
    for name in ["item-b", "item-a", "item-c"] {
        ids.push(
            db.insert("acme", "resources", json!({ "name": name }))
                .unwrap(),
        );
        // Distinct created_at millis so the tier's creation order is
        // deterministic.
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let hits = db.lookup_entity("acme", "item").unwrap();
    // Within a tier: created_at ascending (insertion order), not name order.
    let hit_ids: Vec<_> = hits.iter().map(|e| e.id).collect();
    assert_eq!(hit_ids, ids);
    db.close().unwrap();
}

#[test]
fn test_fuzzy_tier_tolerates_typos() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();

    // 100 entities; the target plus noise.
    let mut names: Vec<String> = (0..99).map(|i| format!("doc-{:03}", i)).collect();
    names.push("alice@company.com".to_string());
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    seed_names(&db, &refs);

    // Two typos: "alise" and "compny". No exact or prefix match exists,
    // so this lands in the BM25 tier.
    let hits = db.lookup_entity("acme", "alise compny").unwrap();
    assert!(
        hits.iter().any(|e| e.name == "alice@company.com"),
        "fuzzy tier should find the typo'd target; got {:?}",
        hits.iter().map(|e| &e.name).collect::<Vec<_>>()
    );
    db.close().unwrap();
}

#[test]
fn test_lookup_uses_key_field_over_name() {
    let (db, _dir) = open_db();
    let mut def = resources_schema();
    def.key_field = Some("category".to_string());
    db.register_schema("acme", def).unwrap();

    db.insert(
        "acme",
        "resources",
        json!({ "name": "Display Label", "category": "searchable-key" }),
    )
    .unwrap();

    assert_eq!(db.lookup_entity("acme", "searchable-key").unwrap().len(), 1);
    // The display name is not what the key index holds.
    assert!(db.lookup_entity("acme", "Display Label").unwrap().is_empty());
    db.close().unwrap();
}

#[test]
fn test_lookup_spans_types() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    db.register_schema("acme", common::agents_schema()).unwrap();

    db.insert("acme", "resources", json!({ "name": "shared-term" }))
        .unwrap();
    db.insert("acme", "agents", json!({ "name": "shared-term" }))
        .unwrap();

    let hits = db.lookup_entity("acme", "shared-term").unwrap();
    assert_eq!(hits.len(), 2);
    db.close().unwrap();
}

#[test]
fn test_deleted_entities_drop_out_of_lookup() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    let ids = seed_names(&db, &["ephemeral"]);
    db.delete("acme", ids[0]).unwrap();

    assert!(db.lookup_entity("acme", "ephemeral").unwrap().is_empty());
    db.close().unwrap();
}

#[test]
fn test_update_moves_lookup_key() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    let ids = seed_names(&db, &["old-handle"]);

    db.update("acme", ids[0], json!({ "name": "new-handle" }))
        .unwrap();

    assert!(db.lookup_entity("acme", "old-handle").unwrap().is_empty());
    assert_eq!(db.lookup_entity("acme", "new-handle").unwrap().len(), 1);
    db.close().unwrap();
}

#[test]
fn test_empty_query_returns_empty() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    assert!(db.lookup_entity("acme", "   ").unwrap().is_empty());
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lookup_statement_in_query_dialect() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    seed_names(&db, &["alice@company.com"]);

    let result = db
        .query("acme", "LOOKUP 'alice@company.com'")
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(
        result.value(0, "name").and_then(|v| v.as_str()),
        Some("alice@company.com")
    );
    db.close().unwrap();
}
