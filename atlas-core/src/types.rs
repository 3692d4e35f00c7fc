use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use atlas_extract::{DepTarget, Dependency, EdgeKind, ExtractionRecord, Language};

// ── Path canonicalization ──────────────────────────────────────────

/// Canonicalize a repo-relative path: forward slashes, no `./` prefix,
/// no interior `.` segments. The result is the storage key for a file
/// node; comparisons elsewhere may lowercase, the key never is.
pub fn canonical_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for seg in normalized.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                // Preserve leading `..` (cannot escape the repo root key
                // space; the resolver rejects these before storage).
                if matches!(parts.last(), None | Some(&"..")) {
                    parts.push("..");
                } else {
                    parts.pop();
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

// ── File nodes ─────────────────────────────────────────────────────

/// A file tracked by the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Canonical repo-relative path; the storage key.
    pub path: String,
    pub language: Language,
    /// When the file was last successfully extracted. `None` marks a
    /// node known only as an edge target; such nodes are dropped when
    /// their last incoming reference disappears.
    pub last_scan: Option<DateTime<Utc>>,
    /// Extractor-reported top-level symbols.
    pub symbols: Vec<String>,
}

// ── Edges ──────────────────────────────────────────────────────────

/// Resolution state of an edge's endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeTarget {
    /// Resolved to a file node in the store.
    File(String),
    /// External identifier (package, system header, symbol) or a
    /// repo-local specifier that has not matched a node yet.
    External(String),
    /// Former file target whose node was deleted; re-resolvable if the
    /// file returns.
    Stale(String),
}

impl EdgeTarget {
    /// Resolved file path, when this target points at a live node.
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::File(p) => Some(p),
            Self::External(_) | Self::Stale(_) => None,
        }
    }

    /// Display label regardless of resolution state.
    pub fn label(&self) -> &str {
        match self {
            Self::File(s) | Self::External(s) | Self::Stale(s) => s,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

/// A directed, typed edge in the file graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Canonical path of the source file node.
    pub source: String,
    pub target: EdgeTarget,
    pub kind: EdgeKind,
    /// Accumulated observation count for this (source, target, kind).
    pub weight: u32,
    /// Line of the first originating statement.
    pub line: u32,
}

/// Traversal direction for neighborhood queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
}

/// Relationship tag carried by query results; reverse hops are marked.
/// Serialized as its rendered form (`import`, `reverse_import`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Forward(EdgeKind),
    Reverse(EdgeKind),
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward(kind) => write!(f, "{kind}"),
            Self::Reverse(kind) => write!(f, "reverse_{kind}"),
        }
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("reverse_") {
            Some(kind) => Ok(Self::Reverse(kind.parse()?)),
            None => Ok(Self::Forward(s.parse()?)),
        }
    }
}

impl Serialize for Relation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Relation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Deltas ─────────────────────────────────────────────────────────

/// Outcome of applying an extraction to the store: which outgoing edges
/// of the file were added, removed, or kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub file: String,
    pub added: Vec<Edge>,
    pub removed: Vec<Edge>,
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// ── Store statistics ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub files: usize,
    pub edges: usize,
    pub resolved_edges: usize,
    pub external_edges: usize,
    pub stale_edges: usize,
    pub files_by_language: BTreeMap<Language, usize>,
}
