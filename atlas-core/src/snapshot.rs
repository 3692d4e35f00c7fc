// Snapshot I/O: the on-disk serialization of the store and its derived
// artifacts. Every write lands in a `.tmp` sibling first and is renamed
// into place, so readers never observe a partially-written artifact.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cluster::SuperGraph;
use crate::error::SnapshotError;
use crate::graphdir::GraphDir;
use crate::metrics::MetricsSnapshot;
use crate::store::GraphStore;
use crate::types::{Edge, FileNode, Language};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Per-language node/edge listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LanguageArtifact {
    language: Language,
    generated_at: DateTime<Utc>,
    nodes: Vec<FileNode>,
    edges: Vec<Edge>,
}

/// Per-cluster membership listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterMembers {
    cluster: String,
    files: Vec<String>,
}

// ── Writing ────────────────────────────────────────────────────────

/// Write the store as one artifact per present language, removing
/// artifacts of languages that disappeared.
pub fn write_store(graph_dir: &GraphDir, store: &GraphStore) -> Result<(), SnapshotError> {
    let nodes = store.nodes()?;
    let edges = store.edges()?;

    let language_of: BTreeMap<&str, Language> =
        nodes.iter().map(|n| (n.path.as_str(), n.language)).collect();

    let mut by_language: BTreeMap<Language, LanguageArtifact> = BTreeMap::new();
    let now = Utc::now();
    for node in &nodes {
        by_language
            .entry(node.language)
            .or_insert_with(|| LanguageArtifact {
                language: node.language,
                generated_at: now,
                nodes: Vec::new(),
                edges: Vec::new(),
            })
            .nodes
            .push(node.clone());
    }
    for edge in &edges {
        if let Some(language) = language_of.get(edge.source.as_str()) {
            if let Some(artifact) = by_language.get_mut(language) {
                artifact.edges.push(edge.clone());
            }
        }
    }

    for (language, artifact) in &by_language {
        let bytes = serde_json::to_vec_pretty(artifact)?;
        write_with_retry(&graph_dir.nodes_path(*language), &bytes)?;
    }

    // Remove listings for languages with no remaining files.
    for language in [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::C,
        Language::Cpp,
    ] {
        if !by_language.contains_key(&language) {
            let path = graph_dir.nodes_path(language);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
    }

    debug!(languages = by_language.len(), "Store snapshot written");
    Ok(())
}

/// Write the metrics blob.
pub fn write_metrics(
    graph_dir: &GraphDir,
    metrics: &MetricsSnapshot,
) -> Result<(), SnapshotError> {
    let bytes = serde_json::to_vec_pretty(metrics)?;
    write_with_retry(&graph_dir.metrics_path(), &bytes)
}

/// Write the super-graph artifact plus one membership file per cluster,
/// removing membership files of clusters that no longer exist.
pub fn write_supergraph(graph_dir: &GraphDir, graph: &SuperGraph) -> Result<(), SnapshotError> {
    let bytes = serde_json::to_vec_pretty(graph)?;
    write_with_retry(&graph_dir.supergraph_path(), &bytes)?;

    for (id, cluster) in &graph.clusters {
        let members = ClusterMembers {
            cluster: id.clone(),
            files: cluster.files.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&members)?;
        write_with_retry(&graph_dir.cluster_path(id), &bytes)?;
    }

    // Sweep membership files for clusters dropped by the last rebuild.
    for entry in std::fs::read_dir(graph_dir.clusters_dir())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(id) = name.strip_suffix(".json") else {
            continue;
        };
        if !graph.clusters.contains_key(id) {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

// ── Reading ────────────────────────────────────────────────────────

/// Rebuild a store from the per-language artifacts.
pub fn load_store(graph_dir: &GraphDir) -> Result<GraphStore, SnapshotError> {
    let mut nodes: Vec<FileNode> = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut found = false;

    for path in language_artifact_paths(graph_dir)? {
        let text = std::fs::read_to_string(&path)?;
        let artifact: LanguageArtifact = serde_json::from_str(&text)?;
        nodes.extend(artifact.nodes);
        edges.extend(artifact.edges);
        found = true;
    }

    if !found {
        return Err(SnapshotError::Missing(
            graph_dir.path().display().to_string(),
        ));
    }
    Ok(GraphStore::from_parts(nodes, edges))
}

pub fn load_supergraph(graph_dir: &GraphDir) -> Result<SuperGraph, SnapshotError> {
    let path = graph_dir.supergraph_path();
    if !path.exists() {
        return Err(SnapshotError::Missing(path.display().to_string()));
    }
    let text = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn load_metrics(graph_dir: &GraphDir) -> Result<MetricsSnapshot, SnapshotError> {
    let path = graph_dir.metrics_path();
    if !path.exists() {
        return Err(SnapshotError::Missing(path.display().to_string()));
    }
    let text = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Latest modification time across the store artifacts; `None` when no
/// snapshot exists. Used for the startup freshness check.
pub fn store_mtime(graph_dir: &GraphDir) -> Option<SystemTime> {
    let paths = language_artifact_paths(graph_dir).ok()?;
    paths
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok()?.modified().ok())
        .max()
}

fn language_artifact_paths(graph_dir: &GraphDir) -> std::io::Result<Vec<std::path::PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(graph_dir.path())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with("nodes_") && name.ends_with(".json") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

// ── Atomic write with retry ────────────────────────────────────────

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

/// Up to three attempts with linear backoff; the prior artifact stays
/// in place on failure.
fn write_with_retry(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut last_error = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match write_atomic(path, bytes) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "Snapshot write failed"
                );
                last_error = Some(e);
                if attempt < RETRY_ATTEMPTS {
                    std::thread::sleep(RETRY_BASE_DELAY * attempt);
                }
            }
        }
    }
    Err(SnapshotError::Exhausted {
        attempts: RETRY_ATTEMPTS,
        reason: last_error.map_or_else(String::new, |e| e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_extract::{DepTarget, Dependency, EdgeKind, ExtractionRecord};

    use crate::cluster::Clusterer;
    use crate::config::ClusterSection;

    fn sample_store() -> GraphStore {
        let store = GraphStore::new();
        for (path, deps) in [
            ("b.js", vec![]),
            ("a.js", vec!["./b.js"]),
            ("util.py", vec![]),
        ] {
            let language = Language::from_path(path).unwrap();
            store
                .apply_delta(&ExtractionRecord {
                    path: path.to_string(),
                    language,
                    dependencies: deps
                        .into_iter()
                        .map(|s: &str| Dependency {
                            kind: EdgeKind::Import,
                            target: DepTarget::Relative(s.to_string()),
                            line: 1,
                        })
                        .collect(),
                    symbols: vec![],
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn round_trip_preserves_nodes_and_edges() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        let store = sample_store();

        write_store(&graph_dir, &store).unwrap();
        let loaded = load_store(&graph_dir).unwrap();

        assert_eq!(loaded.nodes().unwrap(), store.nodes().unwrap());
        assert_eq!(loaded.edges().unwrap(), store.edges().unwrap());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        write_store(&graph_dir, &sample_store()).unwrap();

        for entry in std::fs::read_dir(graph_dir.path()).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(
                !name.to_string_lossy().ends_with(".tmp"),
                "leftover temp file {name:?}"
            );
        }
    }

    #[test]
    fn vanished_language_artifact_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        let store = sample_store();
        write_store(&graph_dir, &store).unwrap();
        assert!(graph_dir.nodes_path(Language::Python).exists());

        store.remove_file("util.py").unwrap();
        write_store(&graph_dir, &store).unwrap();
        assert!(!graph_dir.nodes_path(Language::Python).exists());
        assert!(graph_dir.nodes_path(Language::JavaScript).exists());
    }

    #[test]
    fn missing_snapshot_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        assert!(matches!(
            load_store(&graph_dir),
            Err(SnapshotError::Missing(_))
        ));
        assert!(store_mtime(&graph_dir).is_none());
    }

    #[test]
    fn supergraph_and_memberships_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        let store = sample_store();
        let graph = Clusterer::new(ClusterSection::default())
            .build(&store)
            .unwrap();

        write_supergraph(&graph_dir, &graph).unwrap();
        let loaded = load_supergraph(&graph_dir).unwrap();
        assert_eq!(loaded.clusters.len(), graph.clusters.len());
        assert_eq!(loaded.metadata.total_files, 3);

        // One membership file per cluster, no strays.
        let count = std::fs::read_dir(graph_dir.clusters_dir()).unwrap().count();
        assert_eq!(count, graph.clusters.len());

        // A rebuild with fewer clusters sweeps the extras.
        store.remove_file("util.py").unwrap();
        store.remove_file("a.js").unwrap();
        let smaller = Clusterer::new(ClusterSection::default())
            .build(&store)
            .unwrap();
        write_supergraph(&graph_dir, &smaller).unwrap();
        let count = std::fs::read_dir(graph_dir.clusters_dir()).unwrap().count();
        assert_eq!(count, smaller.clusters.len());
    }
}
