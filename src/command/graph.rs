use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::EntityId;

/// Finds a dependency cycle through `start` using DFS. The returned path
/// begins and ends with the node that closes the cycle.
pub(crate) fn find_cycle(
    graph: &HashMap<EntityId, BTreeSet<EntityId>>,
    start: EntityId,
) -> Option<Vec<EntityId>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    if dfs_cycle(start, graph, &mut visited, &mut rec_stack, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn dfs_cycle(
    node: EntityId,
    graph: &HashMap<EntityId, BTreeSet<EntityId>>,
    visited: &mut HashSet<EntityId>,
    rec_stack: &mut HashSet<EntityId>,
    path: &mut Vec<EntityId>,
) -> bool {
    if rec_stack.contains(&node) {
        path.push(node);
        if let Some(first) = path.iter().position(|n| *n == node) {
            path.drain(..first);
        }
        return true;
    }

    if !visited.insert(node) {
        return false;
    }
    rec_stack.insert(node);
    path.push(node);

    if let Some(deps) = graph.get(&node) {
        for dep in deps {
            if dfs_cycle(*dep, graph, visited, rec_stack, path) {
                return true;
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}
