// Query engine — bounded traversal, reverse edges, hot-path ranking,
// cycle detection, and symbol search over the graph store.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::{Direction, EdgeKind, Language, Relation, StoreStats, canonical_path};

/// Confidence lost per hop beyond the first.
const HOP_DECAY: f64 = 0.2;
/// Confidence never drops below this.
const CONFIDENCE_FLOOR: f64 = 0.1;
/// Minimum total degree for a hot-path seed node.
const HOT_PATH_MIN_DEGREE: usize = 3;
/// Maximum hot-path depth in edges.
const HOT_PATH_MAX_DEPTH: usize = 3;

/// One result row of [`find_related`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedFile {
    pub path: String,
    pub relation: Relation,
    pub depth: u32,
    pub confidence: f64,
}

/// One result row of [`search_symbols`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolHit {
    pub path: String,
    pub language: Language,
    pub relevance: f64,
    pub matched_keywords: Vec<String>,
}

/// Composite result of [`architecture_overview`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureOverview {
    pub modules_by_language: BTreeMap<Language, usize>,
    pub hot_paths: Vec<Vec<String>>,
    pub cycles: Vec<Vec<String>>,
    pub metrics: StoreStats,
}

/// Confidence at a given hop count: 1.0 on the first hop, decaying by
/// 0.2 per further hop, floored at 0.1.
fn confidence_at(depth: u32) -> f64 {
    (1.0 - HOP_DECAY * f64::from(depth.saturating_sub(1))).max(CONFIDENCE_FLOOR)
}

/// BFS from `file` across edges matching `kinds`, optionally traversing
/// the incoming index as `reverse_<kind>` relationships. An unknown
/// starting file yields an empty result, not an error.
pub fn find_related(
    store: &GraphStore,
    file: &str,
    max_depth: u32,
    kinds: Option<&[EdgeKind]>,
    include_reverse: bool,
) -> Result<Vec<RelatedFile>, StoreError> {
    let start = canonical_path(file);
    if !store.contains(&start)? {
        return Ok(Vec::new());
    }

    let mut results: Vec<RelatedFile> = Vec::new();
    let mut visited: HashSet<String> = HashSet::from([start.clone()]);
    let mut frontier: Vec<String> = vec![start];

    for depth in 1..=max_depth {
        let mut next: Vec<String> = Vec::new();
        for node in &frontier {
            let mut hops: Vec<(String, Relation)> = Vec::new();
            for (edge, _) in store.neighbors(node, Direction::Out, kinds)? {
                if let Some(target) = edge.target.file() {
                    hops.push((target.to_string(), Relation::Forward(edge.kind)));
                }
            }
            if include_reverse {
                for (edge, source) in store.neighbors(node, Direction::In, kinds)? {
                    hops.push((source, Relation::Reverse(edge.kind)));
                }
            }
            for (path, relation) in hops {
                if visited.insert(path.clone()) {
                    results.push(RelatedFile {
                        path: path.clone(),
                        relation,
                        depth,
                        confidence: confidence_at(depth),
                    });
                    next.push(path);
                }
            }
        }
        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }

    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(results)
}

/// Case-insensitive substring match of keywords against file paths and
/// stored symbol names. Relevance is the matched fraction of keywords.
pub fn search_symbols(
    store: &GraphStore,
    keywords: &[String],
) -> Result<Vec<SymbolHit>, StoreError> {
    if keywords.is_empty() {
        return Ok(Vec::new());
    }
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let total = lowered.len() as f64;

    let mut hits = Vec::new();
    for node in store.nodes()? {
        let path_lower = node.path.to_lowercase();
        let symbols_lower: Vec<String> =
            node.symbols.iter().map(|s| s.to_lowercase()).collect();

        let matched: Vec<String> = keywords
            .iter()
            .zip(&lowered)
            .filter(|(_, lk)| {
                path_lower.contains(lk.as_str())
                    || symbols_lower.iter().any(|s| s.contains(lk.as_str()))
            })
            .map(|(k, _)| k.clone())
            .collect();

        if !matched.is_empty() {
            hits.push(SymbolHit {
                path: node.path,
                language: node.language,
                relevance: matched.len() as f64 / total,
                matched_keywords: matched,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(hits)
}

/// Resolved out-adjacency with sorted, deduplicated neighbor lists.
fn resolved_adjacency(store: &GraphStore) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
    let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for node in store.nodes()? {
        adjacency.entry(node.path).or_default();
    }
    for edge in store.edges()? {
        if let Some(target) = edge.target.file() {
            if target != edge.source {
                adjacency
                    .entry(edge.source.clone())
                    .or_default()
                    .push(target.to_string());
            }
        }
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort();
        neighbors.dedup();
    }
    Ok(adjacency)
}

/// Simple out-edge paths of 2–3 hops seeded at well-connected nodes,
/// ranked longest first with lexicographic tie-breaks. A path wholly
/// contained in an already-kept longer one is dropped — two hubs
/// sharing a chain would otherwise fill the result with windows of the
/// same chain instead of distinct hot areas.
pub fn hot_paths(store: &GraphStore, limit: usize) -> Result<Vec<Vec<String>>, StoreError> {
    let adjacency = resolved_adjacency(store)?;

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    for neighbors in adjacency.values() {
        for n in neighbors {
            *in_degree.entry(n.as_str()).or_default() += 1;
        }
    }

    let mut paths: Vec<Vec<String>> = Vec::new();
    for (node, neighbors) in &adjacency {
        let degree = neighbors.len() + in_degree.get(node.as_str()).copied().unwrap_or(0);
        if degree < HOT_PATH_MIN_DEGREE {
            continue;
        }
        let mut current = vec![node.clone()];
        collect_paths(&adjacency, &mut current, &mut paths);
    }

    paths.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut kept: Vec<Vec<String>> = Vec::new();
    for path in paths {
        if kept.len() == limit {
            break;
        }
        if !kept.iter().any(|longer| contains_subpath(longer, &path)) {
            kept.push(path);
        }
    }
    Ok(kept)
}

/// Whether `shorter` occurs as a contiguous window of `longer`.
fn contains_subpath(longer: &[String], shorter: &[String]) -> bool {
    shorter.len() <= longer.len() && longer.windows(shorter.len()).any(|w| w == shorter)
}

fn collect_paths(
    adjacency: &BTreeMap<String, Vec<String>>,
    current: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) {
    let hops = current.len() - 1;
    if hops >= 2 {
        out.push(current.clone());
    }
    if hops >= HOT_PATH_MAX_DEPTH {
        return;
    }
    let Some(neighbors) = adjacency.get(current.last().expect("non-empty path")) else {
        return;
    };
    for next in neighbors {
        if current.contains(next) {
            continue;
        }
        current.push(next.clone());
        collect_paths(adjacency, current, out);
        current.pop();
    }
}

/// DFS cycle detection with a recursion stack; neighbors are visited in
/// sorted order, and each cycle is reported once.
pub fn detect_cycles(store: &GraphStore) -> Result<Vec<Vec<String>>, StoreError> {
    let adjacency = resolved_adjacency(store)?;

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: BTreeMap<&str, Color> =
        adjacency.keys().map(|k| (k.as_str(), Color::White)).collect();
    let mut stack: Vec<&str> = Vec::new();
    let mut cycles: Vec<Vec<String>> = Vec::new();
    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &'a BTreeMap<String, Vec<String>>,
        color: &mut BTreeMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
        seen: &mut BTreeSet<Vec<String>>,
    ) {
        color.insert(node, Color::Gray);
        stack.push(node);

        if let Some(neighbors) = adjacency.get(node) {
            for next in neighbors {
                match color.get(next.as_str()).copied() {
                    Some(Color::White) => {
                        visit(next, adjacency, color, stack, cycles, seen);
                    }
                    Some(Color::Gray) => {
                        // Back edge: the stack slice from the ancestor
                        // to here is one cycle.
                        if let Some(pos) = stack.iter().position(|n| *n == next.as_str()) {
                            let cycle: Vec<String> =
                                stack[pos..].iter().map(|s| (*s).to_string()).collect();
                            let mut key = cycle.clone();
                            key.sort();
                            if seen.insert(key) {
                                cycles.push(cycle);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
    }

    let starts: Vec<&str> = adjacency.keys().map(String::as_str).collect();
    for node in starts {
        if color.get(node) == Some(&Color::White) {
            visit(node, &adjacency, &mut color, &mut stack, &mut cycles, &mut seen);
        }
    }
    Ok(cycles)
}

/// Composite architecture digest.
pub fn architecture_overview(store: &GraphStore) -> Result<ArchitectureOverview, StoreError> {
    let stats = store.stats()?;
    Ok(ArchitectureOverview {
        modules_by_language: stats.files_by_language.clone(),
        hot_paths: hot_paths(store, 10)?,
        cycles: detect_cycles(store)?,
        metrics: stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_extract::{DepTarget, Dependency, ExtractionRecord};

    fn apply(store: &GraphStore, path: &str, specs: &[&str]) {
        let language = Language::from_path(path).unwrap();
        store
            .apply_delta(&ExtractionRecord {
                path: path.to_string(),
                language,
                dependencies: specs
                    .iter()
                    .map(|s| Dependency {
                        kind: EdgeKind::Import,
                        target: if language == Language::Python {
                            DepTarget::Module((*s).to_string())
                        } else {
                            DepTarget::Relative((*s).to_string())
                        },
                        line: 1,
                    })
                    .collect(),
                symbols: Vec::new(),
            })
            .unwrap();
    }

    /// S1: a.js imports b.js.
    fn two_file_store() -> GraphStore {
        let store = GraphStore::new();
        apply(&store, "b.js", &[]);
        apply(&store, "a.js", &["./b.js"]);
        store
    }

    #[test]
    fn forward_relation_at_full_confidence() {
        let store = two_file_store();
        let related = find_related(&store, "a.js", 1, None, false).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].path, "b.js");
        assert_eq!(related[0].relation, Relation::Forward(EdgeKind::Import));
        assert_eq!(related[0].depth, 1);
        assert!((related[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reverse_relation_tagged() {
        let store = two_file_store();
        let related = find_related(&store, "b.js", 1, None, true).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].path, "a.js");
        assert_eq!(related[0].relation, Relation::Reverse(EdgeKind::Import));
        assert_eq!(related[0].relation.to_string(), "reverse_import");
    }

    #[test]
    fn unknown_start_is_empty_success() {
        let store = two_file_store();
        assert!(find_related(&store, "ghost.js", 3, None, true)
            .unwrap()
            .is_empty());
    }

    /// S2: x → y → z → x.
    fn cycle_store() -> GraphStore {
        let store = GraphStore::new();
        apply(&store, "x.py", &[]);
        apply(&store, "y.py", &[]);
        apply(&store, "z.py", &[]);
        apply(&store, "x.py", &["y"]);
        apply(&store, "y.py", &["z"]);
        apply(&store, "z.py", &["x"]);
        store
    }

    #[test]
    fn cycle_reported_once_in_visit_order() {
        let store = cycle_store();
        let cycles = detect_cycles(&store).unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["x.py", "y.py", "z.py"]);
    }

    #[test]
    fn bfs_depths_and_decay() {
        let store = cycle_store();
        let related = find_related(&store, "x.py", 3, None, false).unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].path, "y.py");
        assert_eq!(related[0].depth, 1);
        assert!((related[0].confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(related[1].path, "z.py");
        assert_eq!(related[1].depth, 2);
        assert!((related[1].confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_floor() {
        assert!((confidence_at(1) - 1.0).abs() < f64::EPSILON);
        assert!((confidence_at(2) - 0.8).abs() < f64::EPSILON);
        assert!((confidence_at(5) - 0.2).abs() < f64::EPSILON);
        assert!((confidence_at(10) - CONFIDENCE_FLOOR).abs() < f64::EPSILON);
    }

    #[test]
    fn acyclic_store_has_no_cycles() {
        let store = two_file_store();
        assert!(detect_cycles(&store).unwrap().is_empty());
    }

    #[test]
    fn symbol_search_relevance() {
        let store = GraphStore::new();
        store
            .apply_delta(&ExtractionRecord {
                path: "auth/session.py".into(),
                language: Language::Python,
                dependencies: vec![],
                symbols: vec!["SessionStore".into(), "login".into()],
            })
            .unwrap();
        store
            .apply_delta(&ExtractionRecord {
                path: "billing/invoice.py".into(),
                language: Language::Python,
                dependencies: vec![],
                symbols: vec!["Invoice".into()],
            })
            .unwrap();

        let hits =
            search_symbols(&store, &["session".to_string(), "login".to_string()]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "auth/session.py");
        assert!((hits[0].relevance - 1.0).abs() < f64::EPSILON);
        assert_eq!(hits[0].matched_keywords, vec!["session", "login"]);

        let partial = search_symbols(&store, &["invoice".to_string(), "nothing".to_string()])
            .unwrap();
        assert_eq!(partial.len(), 1);
        assert!((partial[0].relevance - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn hot_paths_rank_by_length() {
        let store = GraphStore::new();
        // hub has degree ≥ 3 and a 3-hop chain behind it.
        for path in ["hub.js", "a.js", "b.js", "c.js", "d.js"] {
            apply(&store, path, &[]);
        }
        apply(&store, "hub.js", &["./a.js", "./d.js"]);
        apply(&store, "a.js", &["./b.js"]);
        apply(&store, "b.js", &["./c.js"]);
        apply(&store, "d.js", &["./hub.js"]);

        let paths = hot_paths(&store, 5).unwrap();
        assert!(!paths.is_empty());
        assert_eq!(paths[0].len(), 4, "longest path first: {paths:?}");
        assert_eq!(paths[0], vec!["hub.js", "a.js", "b.js", "c.js"]);
        // All returned paths are simple and within the depth bound.
        for path in &paths {
            assert!(path.len() >= 3 && path.len() <= 4);
            let unique: HashSet<&String> = path.iter().collect();
            assert_eq!(unique.len(), path.len());
        }
    }

    #[test]
    fn hot_paths_from_two_hubs_share_a_chain() {
        let store = GraphStore::new();
        // Two independent hubs (degree ≥ 3 each) feeding the same
        // a → b → c chain through the joint node a.
        for path in [
            "hub1.js", "hub2.js", "a.js", "b.js", "c.js", "x.js", "y.js", "p.js", "q.js",
        ] {
            apply(&store, path, &[]);
        }
        apply(&store, "hub1.js", &["./a.js", "./x.js", "./y.js"]);
        apply(&store, "hub2.js", &["./a.js", "./p.js", "./q.js"]);
        apply(&store, "a.js", &["./b.js"]);
        apply(&store, "b.js", &["./c.js"]);

        let paths = hot_paths(&store, 10).unwrap();
        // The joint node a.js is itself a degree-≥3 seed, but every
        // path it yields is a window of the hub chains; the result is
        // one full chain per hub, not near-duplicate prefixes.
        assert_eq!(
            paths,
            vec![
                vec!["hub1.js", "a.js", "b.js", "c.js"],
                vec!["hub2.js", "a.js", "b.js", "c.js"],
            ]
        );
    }

    #[test]
    fn overview_on_empty_store_is_well_formed() {
        let store = GraphStore::new();
        let overview = architecture_overview(&store).unwrap();
        assert!(overview.modules_by_language.is_empty());
        assert!(overview.hot_paths.is_empty());
        assert!(overview.cycles.is_empty());
        assert_eq!(overview.metrics.files, 0);
    }
}
