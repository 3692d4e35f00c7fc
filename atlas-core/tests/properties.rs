// Property-based invariants of the store, clusterer, query engine, and
// snapshot cycle.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use proptest::prelude::*;

use atlas_core::cluster::Clusterer;
use atlas_core::config::ClusterSection;
use atlas_core::graphdir::GraphDir;
use atlas_core::query;
use atlas_core::snapshot;
use atlas_core::store::GraphStore;
use atlas_extract::{DepTarget, Dependency, EdgeKind, ExtractionRecord, Language};

const UNIVERSE: usize = 8;

fn file_name(i: usize) -> String {
    format!("f{i}.js")
}

fn record(file: usize, targets: &[usize]) -> ExtractionRecord {
    ExtractionRecord {
        path: file_name(file),
        language: Language::JavaScript,
        dependencies: targets
            .iter()
            .map(|t| Dependency {
                kind: EdgeKind::Import,
                target: DepTarget::Relative(format!("./{}", file_name(*t))),
                line: 1,
            })
            .collect(),
        symbols: Vec::new(),
    }
}

/// Seed every universe file as an empty node so targets resolve.
fn seeded_store() -> GraphStore {
    let store = GraphStore::new();
    for i in 0..UNIVERSE {
        store.apply_delta(&record(i, &[])).unwrap();
    }
    store
}

fn ops_strategy() -> impl Strategy<Value = Vec<(usize, Vec<usize>)>> {
    prop::collection::vec(
        (
            0..UNIVERSE,
            prop::collection::vec(0..UNIVERSE, 0..5),
        ),
        1..20,
    )
}

proptest! {
    /// §8.1 — after any update sequence the store holds exactly the
    /// edges of each file's last extraction, and replay is idempotent.
    #[test]
    fn store_reflects_last_extraction(ops in ops_strategy()) {
        let store = seeded_store();
        let mut last: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for (file, targets) in &ops {
            store.apply_delta(&record(*file, targets)).unwrap();
            last.insert(*file, targets.clone());
        }

        // Expected model: per file, grouped (target → weight).
        let mut expected: BTreeSet<(String, String, u32)> = BTreeSet::new();
        for (file, targets) in &last {
            let mut weights: BTreeMap<usize, u32> = BTreeMap::new();
            for t in targets {
                *weights.entry(*t).or_default() += 1;
            }
            for (t, w) in weights {
                expected.insert((file_name(*file), file_name(t), w));
            }
        }

        let observed: BTreeSet<(String, String, u32)> = store
            .edges()
            .unwrap()
            .into_iter()
            .map(|e| (e.source.clone(), e.target.label().to_string(), e.weight))
            .collect();
        prop_assert_eq!(&observed, &expected);

        // Replaying every file's last record changes nothing.
        for (file, targets) in &last {
            let change = store.apply_delta(&record(*file, targets)).unwrap();
            prop_assert!(change.is_noop(), "replay added/removed edges: {:?}", change);
        }
        let replayed: BTreeSet<(String, String, u32)> = store
            .edges()
            .unwrap()
            .into_iter()
            .map(|e| (e.source.clone(), e.target.label().to_string(), e.weight))
            .collect();
        prop_assert_eq!(replayed, expected);
    }

    /// §8.2 — cluster membership partitions the node set.
    #[test]
    fn clusters_partition_nodes(
        node_count in 1..40usize,
        raw_edges in prop::collection::vec((0..40usize, 0..40usize), 0..60),
    ) {
        let store = GraphStore::new();
        for i in 0..node_count {
            store.apply_delta(&record(i, &[])).unwrap();
        }
        for (a, b) in raw_edges {
            let (a, b) = (a % node_count, b % node_count);
            if a != b {
                store.apply_delta(&record(a, &[b])).unwrap();
            }
        }

        let supergraph = Clusterer::new(ClusterSection::default())
            .build(&store)
            .unwrap();

        let mut seen: BTreeSet<String> = BTreeSet::new();
        for cluster in supergraph.clusters.values() {
            for file in &cluster.files {
                prop_assert!(seen.insert(file.clone()), "{} in two clusters", file);
            }
        }
        let all: BTreeSet<String> = store
            .nodes()
            .unwrap()
            .into_iter()
            .map(|n| n.path)
            .collect();
        prop_assert_eq!(seen, all);

        // I4: super-edges never connect a cluster to itself.
        for edge in &supergraph.edges {
            prop_assert_ne!(&edge.from, &edge.to);
        }
    }

    /// §8.4 — detect_cycles is empty iff a topological order exists.
    #[test]
    fn cycles_iff_no_topological_order(
        raw_edges in prop::collection::vec((0..UNIVERSE, 0..UNIVERSE), 0..24),
    ) {
        let store = seeded_store();
        let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (a, b) in &raw_edges {
            if a != b {
                adjacency.entry(*a).or_default().push(*b);
            }
        }
        for (file, targets) in &adjacency {
            store.apply_delta(&record(*file, targets)).unwrap();
        }

        let cycles = query::detect_cycles(&store).unwrap();
        prop_assert_eq!(cycles.is_empty(), has_topological_order(&adjacency));
    }

    /// §8.5 — snapshot write-then-read restores the exact graph.
    #[test]
    fn snapshot_round_trip(ops in ops_strategy()) {
        let store = seeded_store();
        for (file, targets) in &ops {
            store.apply_delta(&record(*file, targets)).unwrap();
        }

        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        snapshot::write_store(&graph_dir, &store).unwrap();
        let restored = snapshot::load_store(&graph_dir).unwrap();

        prop_assert_eq!(store.nodes().unwrap(), restored.nodes().unwrap());
        prop_assert_eq!(store.edges().unwrap(), restored.edges().unwrap());
    }
}

/// Kahn's algorithm over the reference adjacency.
fn has_topological_order(adjacency: &BTreeMap<usize, Vec<usize>>) -> bool {
    let mut in_degree: BTreeMap<usize, usize> = (0..UNIVERSE).map(|i| (i, 0)).collect();
    for targets in adjacency.values() {
        for t in targets {
            *in_degree.get_mut(t).unwrap() += 1;
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut emitted = 0usize;
    while let Some(node) = queue.pop_front() {
        emitted += 1;
        if let Some(targets) = adjacency.get(&node) {
            for t in targets {
                let d = in_degree.get_mut(t).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(*t);
                }
            }
        }
    }
    emitted == UNIVERSE
}
