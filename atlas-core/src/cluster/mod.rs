// Cluster partition of the file graph: community detection, shaping
// into a bounded cluster count, and the derived super-graph.

mod louvain;
mod supergraph;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tracing::info;

pub use supergraph::{
    Cluster, ClusterStrategy, ClusterSummary, SuperEdge, SuperGraph, SuperGraphMetadata,
};

use crate::config::ClusterSection;
use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::{Edge, FileNode, Language};

/// Name of the absorbing cluster for residual files.
pub const MISC_CLUSTER: &str = "misc";

/// Node-count change fraction that triggers regeneration.
const REGEN_THRESHOLD: f64 = 0.05;

/// Sentinel for "never ran".
const NEVER: usize = usize::MAX;

/// Produces and maintains the cluster partition.
#[derive(Debug)]
pub struct Clusterer {
    config: ClusterSection,
    last_run_files: AtomicUsize,
}

impl Clusterer {
    pub fn new(config: ClusterSection) -> Self {
        Self {
            config,
            last_run_files: AtomicUsize::new(NEVER),
        }
    }

    /// Regeneration policy: run when never run before, or when the file
    /// count drifted more than 5% since the last run.
    pub fn should_run(&self, current_files: usize) -> bool {
        let last = self.last_run_files.load(Ordering::Relaxed);
        if last == NEVER {
            return true;
        }
        if last == 0 {
            return current_files > 0;
        }
        let drift = current_files.abs_diff(last) as f64 / last as f64;
        drift > REGEN_THRESHOLD
    }

    /// Run the full pipeline over the store's current contents.
    pub fn build(&self, store: &GraphStore) -> Result<SuperGraph, StoreError> {
        let nodes = store.nodes()?;
        let edges = store.edges()?;
        let graph = self.build_from_parts(&nodes, &edges);
        self.last_run_files.store(nodes.len(), Ordering::Relaxed);
        info!(
            files = nodes.len(),
            clusters = graph.metadata.total_clusters,
            strategy = ?graph.metadata.strategy,
            "Cluster partition rebuilt"
        );
        Ok(graph)
    }

    pub(crate) fn build_from_parts(&self, nodes: &[FileNode], edges: &[Edge]) -> SuperGraph {
        let languages: BTreeMap<String, Language> = nodes
            .iter()
            .map(|n| (n.path.clone(), n.language))
            .collect();

        let (groups, strategy) = self.partition_files(nodes, edges);

        let mut assignment: BTreeMap<String, String> = BTreeMap::new();
        let mut clusters: BTreeMap<String, Cluster> = BTreeMap::new();
        for (id, mut files) in groups {
            files.sort();
            for file in &files {
                assignment.insert(file.clone(), id.clone());
            }
            let summary = summarize(&files, &languages);
            clusters.insert(id, Cluster { files, summary });
        }

        let super_edges = supergraph::build_super_edges(&assignment, edges);

        let total_files = nodes.len();
        let total_clusters = clusters.len();
        let compression_ratio = if total_clusters == 0 {
            1.0
        } else {
            total_files as f64 / total_clusters as f64
        };

        SuperGraph {
            clusters,
            edges: super_edges,
            metadata: SuperGraphMetadata {
                total_files,
                total_clusters,
                compression_ratio,
                timestamp: Utc::now(),
                strategy,
            },
        }
    }

    /// Group files into named clusters according to the configured
    /// strategy ladder.
    fn partition_files(
        &self,
        nodes: &[FileNode],
        edges: &[Edge],
    ) -> (Vec<(String, Vec<String>)>, ClusterStrategy) {
        let paths: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        let n = paths.len();

        if n < self.config.small_project_threshold {
            // Every file is its own cluster; no misc, no shaping.
            let groups = paths
                .iter()
                .enumerate()
                .map(|(i, path)| (format!("c{i}"), vec![(*path).to_string()]))
                .collect();
            return (groups, ClusterStrategy::PerFile);
        }

        let index: BTreeMap<&str, usize> =
            paths.iter().enumerate().map(|(i, p)| (*p, i)).collect();
        let directed: Vec<(usize, usize)> = edges
            .iter()
            .filter_map(|e| {
                let target = e.target.file()?;
                Some((*index.get(e.source.as_str())?, *index.get(target)?))
            })
            .collect();

        let graph = louvain::undirected_view(n, &directed);
        let result = louvain::partition(&graph, self.config.resolution);

        if result.progressed {
            let mut by_community: BTreeMap<u32, Vec<String>> = BTreeMap::new();
            for (i, comm) in result.assignment.iter().enumerate() {
                by_community
                    .entry(*comm)
                    .or_default()
                    .push(paths[i].to_string());
            }
            let groups = self.shape(by_community.into_values().collect(), n);
            (groups, ClusterStrategy::Community)
        } else {
            let mut by_prefix: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for path in &paths {
                by_prefix
                    .entry(directory_prefix(path))
                    .or_default()
                    .push((*path).to_string());
            }
            let groups = self.shape(by_prefix.into_values().collect(), n);
            (groups, ClusterStrategy::Directory)
        }
    }

    /// Bound the community count: keep the big ones, absorb the rest
    /// into `misc`, and hand out size-descending `c0, c1, …` names.
    fn shape(&self, mut groups: Vec<Vec<String>>, total_files: usize) -> Vec<(String, Vec<String>)> {
        for group in &mut groups {
            group.sort();
        }
        groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

        let target = (total_files.div_ceil(self.config.target_reduction)).max(5);
        let max = (2 * target).min(self.config.max_clusters);

        let mut kept: Vec<Vec<String>> = Vec::new();
        let mut misc: Vec<String> = Vec::new();
        if groups.len() > max {
            for (i, group) in groups.into_iter().enumerate() {
                if i < target.saturating_sub(1) {
                    kept.push(group);
                } else {
                    misc.extend(group);
                }
            }
        } else {
            for group in groups {
                if group.len() >= self.config.min_cluster_size {
                    kept.push(group);
                } else {
                    misc.extend(group);
                }
            }
        }

        let mut named: Vec<(String, Vec<String>)> = kept
            .into_iter()
            .enumerate()
            .map(|(i, group)| (format!("c{i}"), group))
            .collect();
        if !misc.is_empty() {
            misc.sort();
            named.push((MISC_CLUSTER.to_string(), misc));
        }
        named
    }
}

/// First two path segments, the directory-fallback cluster key.
fn directory_prefix(path: &str) -> String {
    path.split('/').take(2).collect::<Vec<_>>().join("/")
}

// ── Summaries ──────────────────────────────────────────────────────

/// Importance heuristic for key-file ranking: shallow paths score high,
/// entry points get a bonus, tests and dunder files a penalty.
fn importance(path: &str) -> f64 {
    let depth = path.matches('/').count();
    let mut score = 10.0 / (1.0 + depth as f64);
    let lower = path.to_ascii_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    if name.contains("index") || name.contains("main") {
        score += 2.0;
    }
    if lower.contains("test") || name.starts_with("__") {
        score -= 3.0;
    }
    score
}

fn summarize(files: &[String], languages: &BTreeMap<String, Language>) -> ClusterSummary {
    let mut langs: Vec<Language> = files
        .iter()
        .filter_map(|f| languages.get(f).copied())
        .collect();
    langs.sort_unstable();
    langs.dedup();

    let mut ranked: Vec<&String> = files.iter().collect();
    ranked.sort_by(|a, b| {
        importance(b)
            .partial_cmp(&importance(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
    let key_files: Vec<String> = ranked.into_iter().take(3).cloned().collect();

    ClusterSummary {
        size: files.len(),
        estimated_lines: 50 * files.len(),
        languages: langs.clone(),
        key_files,
        description: describe(files, &langs),
    }
}

/// Short description from the dominant directory prefixes and languages.
fn describe(files: &[String], languages: &[Language]) -> String {
    let mut prefix_counts: BTreeMap<String, usize> = BTreeMap::new();
    for file in files {
        let dir = file.rfind('/').map_or("root", |i| &file[..i]);
        let prefix = directory_prefix(dir);
        let prefix = if prefix.is_empty() { "root".to_string() } else { prefix };
        *prefix_counts.entry(prefix).or_default() += 1;
    }
    let mut prefixes: Vec<(String, usize)> = prefix_counts.into_iter().collect();
    prefixes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let dirs: Vec<String> = prefixes.into_iter().take(2).map(|(p, _)| p).collect();

    let langs: Vec<&str> = languages.iter().map(|l| l.as_str()).collect();
    let lang_part = if langs.is_empty() {
        "mixed".to_string()
    } else {
        langs.join("/")
    };
    format!(
        "{} code in {} ({} files)",
        lang_part,
        dirs.join(", "),
        files.len()
    )
}
