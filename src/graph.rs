//! Graph traversal over entity edges.
//!
//! Edges are stored independently of entity records and traversed by
//! prefix scan; no in-memory graph of entity structs is retained. Cycles
//! are handled with a visited set, so traversal terminates on any graph.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use crate::entity::{Direction, Entity, EntityStore};
use crate::error::{RemError, Result};
use crate::types::EntityId;

/// Visit order for a traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Breadth-first (the `TRAVERSE` statement's order).
    Bfs,
    /// Depth-first preorder.
    Dfs,
}

/// Walks the graph from `start`, up to `depth` hops.
///
/// Returns reached entities in visit order, the start entity first. An
/// optional `edge_type` restricts which edges are followed; `deadline`
/// aborts a long walk with `DeadlineExceeded` and no partial state.
pub fn traverse(
    store: &EntityStore,
    start: EntityId,
    depth: usize,
    direction: Direction,
    edge_type: Option<&str>,
    order: TraversalOrder,
    deadline: Option<Instant>,
) -> Result<Vec<Entity>> {
    // The start entity must exist; missing neighbors are merely skipped.
    store.get(start)?;

    let mut visited: HashSet<EntityId> = HashSet::from([start]);
    let mut result = Vec::new();
    // Front-pop gives BFS; back-pop gives DFS preorder.
    let mut frontier: VecDeque<(EntityId, usize)> = VecDeque::from([(start, 0)]);

    while let Some((current, hops)) = match order {
        TraversalOrder::Bfs => frontier.pop_front(),
        TraversalOrder::Dfs => frontier.pop_back(),
    } {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(RemError::DeadlineExceeded);
            }
        }

        // Tombstoned or missing endpoints do not fail the walk.
        let entity = match store.get(current) {
            Ok(entity) => entity,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };
        result.push(entity);

        if hops >= depth {
            continue;
        }

        let mut neighbors: Vec<EntityId> = store
            .get_edges(current, direction, edge_type)?
            .into_iter()
            .map(|edge| {
                if edge.src_id == current {
                    edge.dst_id
                } else {
                    edge.src_id
                }
            })
            .collect();
        neighbors.sort();
        if order == TraversalOrder::Dfs {
            // Reverse so the smallest neighbor is popped (visited) first.
            neighbors.reverse();
        }

        for neighbor in neighbors {
            if visited.insert(neighbor) {
                frontier.push_back((neighbor, hops + 1));
            }
        }
    }

    Ok(result)
}
