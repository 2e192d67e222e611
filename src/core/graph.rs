//! core::graph
//!
//! Link-graph traversal.
//!
//! # Architecture
//!
//! The link graph is an arbitrary directed multigraph where:
//! - Nodes are persisted resources
//! - Edges are typed links, walked in both directions for reachability
//! - Cycles are allowed
//!
//! Traversal is an explicit breadth-first worklist bounded by a visited set,
//! so deeply linked or cyclic graphs neither recurse nor loop.
//!
//! # Invariants
//!
//! - Every node is visited at most once
//! - Output order is breadth-first from the seeds, in seed order

use std::collections::{HashSet, VecDeque};

use super::types::ResourceId;

/// Collect every id reachable from `seeds`, seeds included.
///
/// `neighbors` returns the ids directly linked to a node (in either
/// direction). It may fail, in which case traversal stops and the error is
/// returned.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use infragraph::core::graph::reachable_from;
/// use infragraph::core::types::ResourceId;
///
/// let id = ResourceId::new;
/// // 1 - 2 - 3, 4 isolated
/// let edges: HashMap<_, Vec<_>> = HashMap::from([
///     (id(1), vec![id(2)]),
///     (id(2), vec![id(1), id(3)]),
///     (id(3), vec![id(2)]),
/// ]);
///
/// let reached = reachable_from([id(1)], |n| {
///     Ok::<_, ()>(edges.get(&n).cloned().unwrap_or_default())
/// })
/// .unwrap();
/// assert_eq!(reached, vec![id(1), id(2), id(3)]);
/// ```
pub fn reachable_from<I, F, E>(seeds: I, mut neighbors: F) -> Result<Vec<ResourceId>, E>
where
    I: IntoIterator<Item = ResourceId>,
    F: FnMut(ResourceId) -> Result<Vec<ResourceId>, E>,
{
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();

    for seed in seeds {
        if visited.insert(seed) {
            queue.push_back(seed);
        }
    }

    while let Some(current) = queue.pop_front() {
        order.push(current);
        for next in neighbors(current)? {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    Ok(order)
}
