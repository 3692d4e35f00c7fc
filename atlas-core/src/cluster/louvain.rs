// Community detection: iterative local moves over an undirected view.
//
// Graph algorithms intentionally cast int↔float.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};

/// Hard bound on full passes over the node set.
const MAX_ITERATIONS: usize = 10;

/// Build the undirected view: `{u, v}` exists iff any directed edge
/// exists in either direction; the weight counts them.
pub(crate) fn undirected_view(n: usize, directed: &[(usize, usize)]) -> UnGraph<(), f64> {
    let mut graph = UnGraph::<(), f64>::default();
    let indices: Vec<NodeIndex> = (0..n).map(|_| graph.add_node(())).collect();

    let mut weights: HashMap<(usize, usize), f64> = HashMap::new();
    for &(u, v) in directed {
        if u == v {
            continue;
        }
        let key = if u < v { (u, v) } else { (v, u) };
        *weights.entry(key).or_default() += 1.0;
    }
    let mut keys: Vec<_> = weights.keys().copied().collect();
    keys.sort_unstable();
    for key in keys {
        graph.add_edge(indices[key.0], indices[key.1], weights[&key]);
    }
    graph
}

/// Outcome of the local-move loop.
#[derive(Debug)]
pub(crate) struct Partition {
    /// Community id per node index, renumbered contiguously from 0.
    pub assignment: Vec<u32>,
    /// Whether any node ever left its initial singleton community.
    pub progressed: bool,
}

/// Iterative community optimization.
///
/// A node's affinity to a community is `internal_weight / degree`; the
/// node moves to its best-scoring neighbor community iff that affinity
/// exceeds the current one times `resolution`. Deterministic: nodes are
/// visited in index order; score ties prefer the smaller community
/// (membership count), then the smaller community id — without the
/// size preference, early communities swallow everything reachable
/// through equal-score bridges.
pub(crate) fn partition(graph: &UnGraph<(), f64>, resolution: f64) -> Partition {
    let n = graph.node_count();
    let mut community: Vec<u32> = (0..n as u32).collect();
    let mut size: Vec<u32> = vec![1; n];

    // Adjacency and degrees, fixed for the whole loop.
    let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut degree: Vec<f64> = vec![0.0; n];
    for edge in graph.edge_indices() {
        if let Some((a, b)) = graph.edge_endpoints(edge) {
            let w = graph[edge];
            adj[a.index()].push((b.index(), w));
            adj[b.index()].push((a.index(), w));
            degree[a.index()] += w;
            degree[b.index()] += w;
        }
    }
    for neighbors in &mut adj {
        neighbors.sort_unstable_by(|x, y| x.0.cmp(&y.0));
    }

    let mut progressed = false;
    for _ in 0..MAX_ITERATIONS {
        let mut moved = false;

        for node in 0..n {
            if degree[node] == 0.0 {
                continue;
            }
            let current = community[node];

            let mut internal: HashMap<u32, f64> = HashMap::new();
            for &(neighbor, w) in &adj[node] {
                *internal.entry(community[neighbor]).or_default() += w;
            }

            let score = |comm: u32| internal.get(&comm).copied().unwrap_or(0.0) / degree[node];
            let current_score = score(current);

            let mut candidates: Vec<u32> = internal.keys().copied().collect();
            candidates.sort_unstable();

            let mut best: Option<(u32, f64)> = None;
            for comm in candidates {
                if comm == current {
                    continue;
                }
                let candidate_score = score(comm);
                if candidate_score <= current_score * resolution {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((best_comm, best_score)) => {
                        candidate_score > best_score
                            || (candidate_score == best_score
                                && size[comm as usize] < size[best_comm as usize])
                    }
                };
                if better {
                    best = Some((comm, candidate_score));
                }
            }

            if let Some((target, _)) = best {
                size[current as usize] -= 1;
                size[target as usize] += 1;
                community[node] = target;
                moved = true;
                progressed = true;
            }
        }

        if !moved {
            break;
        }
    }

    // Renumber communities contiguously from 0 in first-seen order.
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut next = 0u32;
    for c in &mut community {
        let id = *remap.entry(*c).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
        *c = id;
    }

    Partition {
        assignment: community,
        progressed,
    }
}
