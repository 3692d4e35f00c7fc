// In-memory directed multigraph keyed by file path.
//
// The store is the only structure shared across threads. All operations
// take the interior lock; an in-progress apply is never observable
// half-applied. The daemon's applier is the sole writer.

mod resolve;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use chrono::Utc;
use tracing::debug;

use atlas_extract::ExtractionRecord;

use crate::error::StoreError;
use crate::types::{
    ChangeSet, Direction, Edge, EdgeKind, EdgeTarget, FileNode, Language, StoreStats,
    canonical_path,
};

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, FileNode>,
    out_edges: BTreeMap<String, Vec<Edge>>,
    /// Resolved target path → source paths referencing it.
    in_index: BTreeMap<String, BTreeSet<String>>,
}

/// The in-memory structural graph of the repository.
#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<Inner>,
}

type Guard<'a> = std::sync::RwLockWriteGuard<'a, Inner>;

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from snapshot parts. The incoming index is
    /// derived, not persisted.
    pub fn from_parts(nodes: Vec<FileNode>, edges: Vec<Edge>) -> Self {
        let mut inner = Inner::default();
        for node in nodes {
            inner.nodes.insert(node.path.clone(), node);
        }
        for edge in edges {
            if let Some(target) = edge.target.file() {
                inner
                    .in_index
                    .entry(target.to_string())
                    .or_default()
                    .insert(edge.source.clone());
            }
            inner.out_edges.entry(edge.source.clone()).or_default().push(edge);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn write(&self) -> Result<Guard<'_>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Atomically replace all outgoing edges of the record's file with
    /// the record's dependencies, upserting the file node itself.
    pub fn apply_delta(&self, record: &ExtractionRecord) -> Result<ChangeSet, StoreError> {
        let path = canonical_path(&record.path);
        let mut inner = self.write()?;

        // Upsert the source node first so self-references resolve.
        let node = inner.nodes.entry(path.clone()).or_insert_with(|| FileNode {
            path: path.clone(),
            language: record.language,
            last_scan: None,
            symbols: Vec::new(),
        });
        node.language = record.language;
        node.last_scan = Some(Utc::now());
        node.symbols = record.symbols.clone();

        // Group repeated (kind, target) observations into weights, then
        // resolve each raw target against the current node set.
        let mut new_edges: Vec<Edge> = Vec::new();
        for dep in &record.dependencies {
            let resolved = resolve::resolve_target(&path, record.language, &dep.target, |p| {
                inner.nodes.contains_key(p)
            });
            let target = match resolved {
                Some(file) => EdgeTarget::File(file),
                None => EdgeTarget::External(dep.target.raw().to_string()),
            };
            if let Some(existing) = new_edges
                .iter_mut()
                .find(|e| e.kind == dep.kind && e.target == target)
            {
                existing.weight += 1;
            } else {
                new_edges.push(Edge {
                    source: path.clone(),
                    target,
                    kind: dep.kind,
                    weight: 1,
                    line: dep.line,
                });
            }
        }

        let old_edges = inner.out_edges.remove(&path).unwrap_or_default();
        let change = diff_edges(&path, old_edges, &new_edges);
        inner.out_edges.insert(path.clone(), new_edges);
        reindex_source(&mut inner, &path, &change);

        debug!(
            file = %path,
            added = change.added.len(),
            removed = change.removed.len(),
            unchanged = change.unchanged,
            "Applied extraction delta"
        );
        Ok(change)
    }

    /// Remove a deleted file: the node and its outgoing edges go away;
    /// incoming edges survive with their target marked stale.
    pub fn remove_file(&self, path: &str) -> Result<ChangeSet, StoreError> {
        let path = canonical_path(path);
        let mut inner = self.write()?;

        let removed = inner.out_edges.remove(&path).unwrap_or_default();
        let change = ChangeSet {
            file: path.clone(),
            added: Vec::new(),
            removed,
            unchanged: 0,
        };
        reindex_source(&mut inner, &path, &change);
        inner.nodes.remove(&path);

        // Flip surviving incoming references to stale.
        if let Some(sources) = inner.in_index.remove(&path) {
            for source in sources {
                if let Some(edges) = inner.out_edges.get_mut(&source) {
                    for edge in edges.iter_mut() {
                        if edge.target == EdgeTarget::File(path.clone()) {
                            edge.target = EdgeTarget::Stale(path.clone());
                        }
                    }
                }
            }
        }

        debug!(file = %path, removed = change.removed.len(), "Removed file node");
        Ok(change)
    }

    /// Post-batch resolution sweep: retry every external or stale
    /// target against the current node set. Returns how many edges
    /// became resolved.
    pub fn resolve_sweep(&self) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let Inner {
            nodes,
            out_edges,
            in_index,
        } = &mut *inner;

        let mut resolved = 0usize;
        for (source, edges) in out_edges.iter_mut() {
            let language = nodes
                .get(source)
                .map(|n| n.language)
                .or_else(|| Language::from_path(source));
            for edge in edges.iter_mut() {
                let new_target = match &edge.target {
                    EdgeTarget::File(_) => None,
                    EdgeTarget::Stale(old) => nodes.contains_key(old).then(|| old.clone()),
                    EdgeTarget::External(raw) => language.and_then(|lang| {
                        resolve::resolve_target(
                            source,
                            lang,
                            &raw_target(lang, edge.kind, raw),
                            |p| nodes.contains_key(p),
                        )
                    }),
                };
                if let Some(file) = new_target {
                    in_index
                        .entry(file.clone())
                        .or_default()
                        .insert(source.clone());
                    edge.target = EdgeTarget::File(file);
                    resolved += 1;
                }
            }
        }

        if resolved > 0 {
            debug!(resolved, "Resolution sweep matched new nodes");
        }
        Ok(resolved)
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Yield (edge, other endpoint label) pairs for a file.
    pub fn neighbors(
        &self,
        path: &str,
        direction: Direction,
        kinds: Option<&[EdgeKind]>,
    ) -> Result<Vec<(Edge, String)>, StoreError> {
        let path = canonical_path(path);
        let inner = self.read()?;
        let matches = |kind: EdgeKind| kinds.is_none_or(|ks| ks.contains(&kind));

        let mut out = Vec::new();
        match direction {
            Direction::Out => {
                if let Some(edges) = inner.out_edges.get(&path) {
                    for edge in edges.iter().filter(|e| matches(e.kind)) {
                        out.push((edge.clone(), edge.target.label().to_string()));
                    }
                }
            }
            Direction::In => {
                if let Some(sources) = inner.in_index.get(&path) {
                    for source in sources {
                        let Some(edges) = inner.out_edges.get(source) else {
                            continue;
                        };
                        for edge in edges.iter().filter(|e| {
                            matches(e.kind) && e.target.file() == Some(path.as_str())
                        }) {
                            out.push((edge.clone(), source.clone()));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn node(&self, path: &str) -> Result<Option<FileNode>, StoreError> {
        Ok(self.read()?.nodes.get(&canonical_path(path)).cloned())
    }

    pub fn contains(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.nodes.contains_key(&canonical_path(path)))
    }

    /// All file nodes in path order.
    pub fn nodes(&self) -> Result<Vec<FileNode>, StoreError> {
        Ok(self.read()?.nodes.values().cloned().collect())
    }

    /// All edges in source-path order.
    pub fn edges(&self) -> Result<Vec<Edge>, StoreError> {
        Ok(self
            .read()?
            .out_edges
            .values()
            .flat_map(|edges| edges.iter().cloned())
            .collect())
    }

    pub fn node_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.nodes.len())
    }

    pub fn edge_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.out_edges.values().map(Vec::len).sum())
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.read()?;
        let mut stats = StoreStats {
            files: inner.nodes.len(),
            ..StoreStats::default()
        };
        for node in inner.nodes.values() {
            *stats.files_by_language.entry(node.language).or_default() += 1;
        }
        for edge in inner.out_edges.values().flatten() {
            stats.edges += 1;
            match edge.target {
                EdgeTarget::File(_) => stats.resolved_edges += 1,
                EdgeTarget::External(_) => stats.external_edges += 1,
                EdgeTarget::Stale(_) => stats.stale_edges += 1,
            }
        }
        Ok(stats)
    }
}

/// Reconstruct a raw target of the right shape for re-resolution.
fn raw_target(language: Language, kind: EdgeKind, raw: &str) -> atlas_extract::DepTarget {
    use atlas_extract::DepTarget;
    match language {
        Language::Python if kind == EdgeKind::Import => DepTarget::Module(raw.to_string()),
        Language::JavaScript | Language::TypeScript
            if raw.starts_with("./") || raw.starts_with("../") =>
        {
            DepTarget::Relative(raw.to_string())
        }
        Language::C | Language::Cpp if kind == EdgeKind::Include && !raw.contains('<') => {
            DepTarget::Relative(raw.to_string())
        }
        _ => DepTarget::External(raw.to_string()),
    }
}

/// Diff old vs new outgoing edges by (kind, target, weight) identity.
fn diff_edges(path: &str, old_edges: Vec<Edge>, new_edges: &[Edge]) -> ChangeSet {
    let mut change = ChangeSet {
        file: path.to_string(),
        ..ChangeSet::default()
    };
    let key = |e: &Edge| (e.kind, e.target.clone(), e.weight);
    let old_keys: BTreeSet<_> = old_edges.iter().map(key).collect();
    let new_keys: BTreeSet<_> = new_edges.iter().map(key).collect();

    for edge in new_edges {
        if old_keys.contains(&key(edge)) {
            change.unchanged += 1;
        } else {
            change.added.push(edge.clone());
        }
    }
    change.removed = old_edges
        .into_iter()
        .filter(|e| !new_keys.contains(&key(e)))
        .collect();
    change
}

/// After a source's edge set changed, fix the incoming index and drop
/// target-only nodes that lost their last reference.
fn reindex_source(inner: &mut Inner, source: &str, change: &ChangeSet) {
    for edge in &change.removed {
        let Some(target) = edge.target.file() else {
            continue;
        };
        let mut gone = false;
        if let Some(sources) = inner.in_index.get_mut(target) {
            // Only drop the index entry if no kept edge still points there.
            let still_referenced = inner
                .out_edges
                .get(source)
                .is_some_and(|edges| edges.iter().any(|e| e.target.file() == Some(target)));
            if !still_referenced {
                sources.remove(source);
                gone = sources.is_empty();
            }
        }
        if gone {
            inner.in_index.remove(target);
            let target_only = inner
                .nodes
                .get(target)
                .is_some_and(|n| n.last_scan.is_none());
            if target_only && target != source {
                inner.nodes.remove(target);
                inner.out_edges.remove(target);
            }
        }
    }
    for edge in &change.added {
        if let Some(target) = edge.target.file() {
            inner
                .in_index
                .entry(target.to_string())
                .or_default()
                .insert(source.to_string());
        }
    }
}
