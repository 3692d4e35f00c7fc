// Super-graph artifact types: the quotient graph of the cluster
// partition, plus per-cluster summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Edge, Language};

/// How the current partition was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStrategy {
    /// Below the small-project threshold: one cluster per file.
    PerFile,
    /// Community detection over the undirected file graph.
    Community,
    /// Directory-prefix fallback.
    Directory,
}

/// Human-oriented digest of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub size: usize,
    /// Line-count heuristic: 50 lines per member file.
    pub estimated_lines: usize,
    /// Sorted, deduplicated member languages.
    pub languages: Vec<Language>,
    /// Up to three members ranked by the importance heuristic.
    pub key_files: Vec<String>,
    pub description: String,
}

/// One cluster of the partition: sorted member list plus summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub files: Vec<String>,
    pub summary: ClusterSummary,
}

/// Directed inter-cluster edge; weight counts the underlying file-level
/// edges crossing the partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperEdge {
    pub from: String,
    pub to: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperGraphMetadata {
    pub total_files: usize,
    pub total_clusters: usize,
    pub compression_ratio: f64,
    pub timestamp: DateTime<Utc>,
    pub strategy: ClusterStrategy,
}

/// The complete super-graph artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperGraph {
    pub clusters: BTreeMap<String, Cluster>,
    pub edges: Vec<SuperEdge>,
    pub metadata: SuperGraphMetadata,
}

impl SuperGraph {
    /// Cluster id containing `path`, if any.
    pub fn cluster_of(&self, path: &str) -> Option<&str> {
        self.clusters.iter().find_map(|(id, cluster)| {
            cluster
                .files
                .binary_search_by(|f| f.as_str().cmp(path))
                .ok()
                .map(|_| id.as_str())
        })
    }
}

/// Count file-level edges crossing the partition, per ordered cluster
/// pair. Never yields a cluster-to-itself edge.
pub(crate) fn build_super_edges(
    assignment: &BTreeMap<String, String>,
    edges: &[Edge],
) -> Vec<SuperEdge> {
    let mut weights: BTreeMap<(String, String), u32> = BTreeMap::new();
    for edge in edges {
        let Some(target) = edge.target.file() else {
            continue;
        };
        let (Some(from), Some(to)) = (assignment.get(&edge.source), assignment.get(target)) else {
            continue;
        };
        if from == to {
            continue;
        }
        *weights.entry((from.clone(), to.clone())).or_default() += 1;
    }
    weights
        .into_iter()
        .map(|((from, to), weight)| SuperEdge { from, to, weight })
        .collect()
}
