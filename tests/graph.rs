//! Edges and graph traversal.

mod common;

use common::{agents_schema, open_db};
use remdb::{Direction, EntityId, TraversalOrder};
use serde_json::json;

fn agent(db: &remdb::RemDb, name: &str) -> EntityId {
    db.insert("acme", "agents", json!({ "name": name })).unwrap()
}

fn knows_chain(db: &remdb::RemDb) -> (EntityId, EntityId, EntityId) {
    let alice = agent(db, "Alice");
    let bob = agent(db, "Bob");
    let charlie = agent(db, "Charlie");
    db.insert_edge("acme", alice, bob, "knows", json!({})).unwrap();
    db.insert_edge("acme", bob, charlie, "knows", json!({})).unwrap();
    (alice, bob, charlie)
}

#[test]
fn test_edge_requires_live_endpoints() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let alice = agent(&db, "Alice");

    let err = db
        .insert_edge("acme", alice, EntityId::new(), "knows", json!({}))
        .unwrap_err();
    assert!(err.is_not_found());
    db.close().unwrap();
}

#[test]
fn test_get_edges_by_direction() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let (alice, bob, charlie) = knows_chain(&db);

    let out = db.get_edges("acme", bob, Direction::Out, None).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dst_id, charlie);

    let inbound = db.get_edges("acme", bob, Direction::In, None).unwrap();
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].src_id, alice);

    let both = db.get_edges("acme", bob, Direction::Both, None).unwrap();
    assert_eq!(both.len(), 2);
    db.close().unwrap();
}

#[test]
fn test_multiple_edge_types_between_same_pair() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let a = agent(&db, "A");
    let b = agent(&db, "B");
    db.insert_edge("acme", a, b, "knows", json!({})).unwrap();
    db.insert_edge("acme", a, b, "manages", json!({ "since": 2024 }))
        .unwrap();

    let all = db.get_edges("acme", a, Direction::Out, None).unwrap();
    assert_eq!(all.len(), 2);

    let managed = db
        .get_edges("acme", a, Direction::Out, Some("manages"))
        .unwrap();
    assert_eq!(managed.len(), 1);
    assert_eq!(
        managed[0].properties.get_path("since").and_then(|v| v.as_i64()),
        Some(2024)
    );
    db.close().unwrap();
}

#[test]
fn test_bfs_two_hops() {
    // TRAVERSE FROM Alice DEPTH 2 DIRECTION out TYPE 'knows'
    // over Alice→Bob→Charlie yields [Alice, Bob, Charlie].
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let (alice, bob, charlie) = knows_chain(&db);

    let walk = db
        .traverse("acme", alice, 2, Direction::Out, Some("knows"), TraversalOrder::Bfs)
        .unwrap();
    let ids: Vec<EntityId> = walk.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![alice, bob, charlie]);
    db.close().unwrap();
}

#[test]
fn test_depth_limits_the_walk() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let (alice, bob, _charlie) = knows_chain(&db);

    let walk = db
        .traverse("acme", alice, 1, Direction::Out, Some("knows"), TraversalOrder::Bfs)
        .unwrap();
    let ids: Vec<EntityId> = walk.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![alice, bob]);
    db.close().unwrap();
}

#[test]
fn test_edge_type_filter_prunes_branches() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let alice = agent(&db, "Alice");
    let bob = agent(&db, "Bob");
    let eve = agent(&db, "Eve");
    db.insert_edge("acme", alice, bob, "knows", json!({})).unwrap();
    db.insert_edge("acme", alice, eve, "blocks", json!({})).unwrap();

    let walk = db
        .traverse("acme", alice, 3, Direction::Out, Some("knows"), TraversalOrder::Bfs)
        .unwrap();
    let ids: Vec<EntityId> = walk.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![alice, bob]);
    db.close().unwrap();
}

#[test]
fn test_cycles_terminate() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let a = agent(&db, "A");
    let b = agent(&db, "B");
    db.insert_edge("acme", a, b, "knows", json!({})).unwrap();
    db.insert_edge("acme", b, a, "knows", json!({})).unwrap();

    let walk = db
        .traverse("acme", a, 10, Direction::Out, None, TraversalOrder::Bfs)
        .unwrap();
    assert_eq!(walk.len(), 2);
    db.close().unwrap();
}

#[test]
fn test_traverse_inbound() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let (alice, _bob, charlie) = knows_chain(&db);

    let walk = db
        .traverse("acme", charlie, 2, Direction::In, Some("knows"), TraversalOrder::Bfs)
        .unwrap();
    let ids: Vec<EntityId> = walk.iter().map(|e| e.id).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], charlie);
    assert_eq!(ids[2], alice);
    db.close().unwrap();
}

#[test]
fn test_dfs_preorder() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    // root with two children; left child has its own child.
    let root = agent(&db, "root");
    let left = agent(&db, "left");
    let right = agent(&db, "right");
    let leaf = agent(&db, "leaf");
    db.insert_edge("acme", root, left, "child", json!({})).unwrap();
    db.insert_edge("acme", root, right, "child", json!({})).unwrap();
    db.insert_edge("acme", left, leaf, "child", json!({})).unwrap();

    let walk = db
        .traverse("acme", root, 3, Direction::Out, None, TraversalOrder::Dfs)
        .unwrap();
    let ids: Vec<EntityId> = walk.iter().map(|e| e.id).collect();
    // DFS goes deep before wide: leaf appears before the sibling branch
    // of its parent.
    let pos = |id: EntityId| ids.iter().position(|x| *x == id).unwrap();
    assert_eq!(pos(root), 0);
    assert!(pos(leaf) == pos(left) + 1 || pos(leaf) == pos(right) + 1);
    assert_eq!(ids.len(), 4);
    db.close().unwrap();
}

#[test]
fn test_traverse_from_missing_start_fails() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let err = db
        .traverse(
            "acme",
            EntityId::new(),
            2,
            Direction::Out,
            None,
            TraversalOrder::Bfs,
        )
        .unwrap_err();
    assert!(err.is_not_found());
    db.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_traverse_statement() {
    let (db, _dir) = open_db();
    db.register_schema("acme", agents_schema()).unwrap();
    let (alice, _bob, _charlie) = knows_chain(&db);

    let result = db
        .query(
            "acme",
            &format!("TRAVERSE FROM {} DEPTH 2 DIRECTION out TYPE 'knows'", alice),
        )
        .await
        .unwrap();
    let names: Vec<&str> = result
        .rows
        .iter()
        .filter_map(|row| {
            let idx = result.columns.iter().position(|c| c == "name")?;
            row[idx].as_str()
        })
        .collect();
    assert_eq!(names, vec!["Alice", "Bob", "Charlie"]);
    db.close().unwrap();
}
