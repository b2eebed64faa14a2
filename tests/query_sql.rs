//! The SQL-like query surface: SELECT plans, predicates, ordering, and
//! error behavior.

mod common;

use common::{open_db, resources_schema, wait_for_embedding};
use remdb::{QueryError, RemError};
use serde_json::json;

async fn seeded_db() -> (remdb::RemDb, tempfile::TempDir, Vec<remdb::EntityId>) {
    let (db, dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    let mut ids = Vec::new();
    for (name, category, depth) in [
        ("Python Guide", "tutorial", 1),
        ("Rust Book", "tutorial", 3),
        ("API Reference", "reference", 2),
        ("Deploy Notes", "ops", 5),
    ] {
        ids.push(
            db.insert(
                "acme",
                "resources",
                json!({ "name": name, "content": format!("{} text", name), "category": category, "depth": depth }),
            )
            .unwrap(),
        );
    }
    (db, dir, ids)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_select_with_equality_filter() {
    let (db, _dir, _) = seeded_db().await;
    let result = db
        .query(
            "acme",
            "SELECT name FROM resources WHERE category = 'tutorial'",
        )
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["name"]);
    let names: Vec<&str> = result.rows.iter().filter_map(|r| r[0].as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Python Guide"));
    assert!(names.contains(&"Rust Book"));
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_select_by_id_is_point_lookup() {
    let (db, _dir, ids) = seeded_db().await;
    let result = db
        .query(
            "acme",
            &format!("SELECT name FROM resources WHERE id = '{}'", ids[0]),
        )
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0][0].as_str(), Some("Python Guide"));
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_range_and_boolean_predicates() {
    let (db, _dir, _) = seeded_db().await;
    let result = db
        .query(
            "acme",
            "SELECT name FROM resources WHERE depth >= 2 AND (category = 'tutorial' OR category = 'ops')",
        )
        .await
        .unwrap();
    let names: Vec<&str> = result.rows.iter().filter_map(|r| r[0].as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Rust Book"));
    assert!(names.contains(&"Deploy Notes"));
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_in_list_and_contains() {
    let (db, _dir, _) = seeded_db().await;

    let result = db
        .query(
            "acme",
            "SELECT name FROM resources WHERE category IN ('reference', 'ops')",
        )
        .await
        .unwrap();
    assert_eq!(result.len(), 2);

    let result = db
        .query(
            "acme",
            "SELECT name FROM resources WHERE CONTAINS(name, 'Guide')",
        )
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0][0].as_str(), Some("Python Guide"));
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_order_by_limit_offset() {
    let (db, _dir, _) = seeded_db().await;
    let result = db
        .query(
            "acme",
            "SELECT name FROM resources ORDER BY depth DESC LIMIT 2 OFFSET 1",
        )
        .await
        .unwrap();
    let names: Vec<&str> = result.rows.iter().filter_map(|r| r[0].as_str()).collect();
    // depth order: Deploy(5), Rust(3), API(2), Python(1); offset 1, limit 2
    assert_eq!(names, vec!["Rust Book", "API Reference"]);
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_limit_zero_returns_empty() {
    let (db, _dir, _) = seeded_db().await;
    let result = db
        .query("acme", "SELECT * FROM resources LIMIT 0")
        .await
        .unwrap();
    assert!(result.is_empty());
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_type_returns_empty_not_error() {
    let (db, _dir, _) = seeded_db().await;
    let result = db.query("acme", "SELECT * FROM nothere").await.unwrap();
    assert!(result.is_empty());
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_order_is_ascending_id() {
    let (db, _dir, ids) = seeded_db().await;
    let result = db.query("acme", "SELECT id FROM resources").await.unwrap();
    let returned: Vec<String> = result
        .rows
        .iter()
        .filter_map(|r| r[0].as_str().map(String::from))
        .collect();
    let mut expected: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    expected.sort();
    assert_eq!(returned, expected);
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_syntax_error_reports_offset() {
    let (db, _dir, _) = seeded_db().await;
    let err = db
        .query("acme", "SELECT name FRM resources")
        .await
        .unwrap_err();
    match err {
        RemError::Query(QueryError::Syntax { offset, .. }) => assert_eq!(offset, 12),
        other => panic!("expected syntax error, got {:?}", other),
    }
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_negative_limit_is_syntax_error() {
    let (db, _dir, _) = seeded_db().await;
    let err = db
        .query("acme", "SELECT * FROM resources LIMIT -3")
        .await
        .unwrap_err();
    assert!(matches!(err, RemError::Query(QueryError::Syntax { .. })));
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_aggregates_and_joins_refused() {
    let (db, _dir, _) = seeded_db().await;
    for sql in [
        "SELECT COUNT FROM resources",
        "SELECT SUM FROM resources",
        "JOIN resources",
    ] {
        let err = db.query("acme", sql).await.unwrap_err();
        assert!(
            matches!(err, RemError::Query(QueryError::Unsupported(_))),
            "{} should be refused",
            sql
        );
    }
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_semantic_filter_with_predicate() {
    // Scenario: semantic WHERE term plus structural filter, _score in
    // every row, capped by LIMIT.
    let (db, _dir, ids) = seeded_db().await;
    for id in &ids {
        wait_for_embedding(&db, "acme", *id);
    }

    let result = db
        .query(
            "acme",
            "SELECT name FROM resources WHERE embedding.cosine('Python Guide text') AND category = 'tutorial' LIMIT 10",
        )
        .await
        .unwrap();

    assert!(!result.is_empty());
    assert!(result.len() <= 10);
    assert!(result.columns.contains(&"_score".to_string()));
    let score_idx = result.columns.iter().position(|c| c == "_score").unwrap();
    let mut last = f64::INFINITY;
    for row in &result.rows {
        let score = row[score_idx].as_f64().unwrap();
        assert!((-1.0..=1.0 + 1e-6).contains(&score), "score {} out of range", score);
        assert!(score <= last, "scores must be descending");
        last = score;
    }
    // All rows honor the structural filter: only the two tutorials match.
    assert!(result.len() <= 2);
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_projection_keeps_field_order_and_score_column() {
    let (db, _dir, ids) = seeded_db().await;
    for id in &ids {
        wait_for_embedding(&db, "acme", *id);
    }

    let result = db
        .query(
            "acme",
            "SELECT name, _score FROM resources WHERE embedding.cosine('Rust Book text') LIMIT 3",
        )
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["name", "_score"]);
    assert_eq!(result.rows[0][0].as_str(), Some("Rust Book"));
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deadline_expiry_surfaces() {
    let (db, _dir, _) = seeded_db().await;
    let err = db
        .query_with_deadline(
            "acme",
            "SELECT * FROM resources",
            std::time::Instant::now() - std::time::Duration::from_millis(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemError::DeadlineExceeded));
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nested_property_path_in_where() {
    let (db, _dir) = open_db();
    db.register_schema("acme", resources_schema()).unwrap();
    db.insert(
        "acme",
        "resources",
        json!({ "name": "Nested", "author": { "name": "alice" } }),
    )
    .unwrap();
    db.insert(
        "acme",
        "resources",
        json!({ "name": "Other", "author": { "name": "bob" } }),
    )
    .unwrap();

    let result = db
        .query(
            "acme",
            "SELECT name FROM resources WHERE author.name = 'alice'",
        )
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0][0].as_str(), Some("Nested"));
    db.close().unwrap();
}
