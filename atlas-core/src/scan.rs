// Repository walking: eligibility rules shared by the watcher and the
// full scan, plus the parallel initial scan itself.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use atlas_extract::{ExtractionRecord, ExtractorRegistry};

use crate::config::WatcherSection;
use crate::error::{ConfigError, StoreError};
use crate::graphdir::GraphDir;
use crate::store::GraphStore;
use crate::types::canonical_path;

/// Source-file extensions the engine tracks.
pub const WATCHED_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "c", "cpp", "cc", "cxx", "h", "hpp",
];

/// Directory names never descended into.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
];

/// Walks the repository and decides which paths the engine cares about.
#[derive(Debug)]
pub struct RepoScanner {
    root: PathBuf,
    graph_dir_name: String,
    extra_ignores: Vec<glob::Pattern>,
}

impl RepoScanner {
    pub fn new(graph_dir: &GraphDir, config: &WatcherSection) -> Result<Self, ConfigError> {
        let extra_ignores = config
            .watcher_ignore_patterns()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(Self {
            root: graph_dir.repo_root().to_path_buf(),
            graph_dir_name: graph_dir.dir_name().to_string(),
            extra_ignores,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repo-relative canonical key for an absolute path inside the repo.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let rel = rel.to_str()?;
        Some(canonical_path(rel))
    }

    /// Whether a path is a source file the engine should track.
    pub fn is_eligible(&self, path: &Path) -> bool {
        let watched = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| WATCHED_EXTENSIONS.contains(&e));
        if !watched {
            return false;
        }
        let Some(rel) = self.relative(path) else {
            return false;
        };
        for segment in rel.split('/') {
            if segment == self.graph_dir_name || IGNORED_DIRS.contains(&segment) {
                return false;
            }
        }
        !self.extra_ignores.iter().any(|p| p.matches(&rel))
    }

    /// All eligible files, sorted by repo-relative path.
    pub fn eligible_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                // Depth 0 is the repo root itself, whatever its name.
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_str().unwrap_or("");
                !(entry.file_type().is_dir()
                    && (name == self.graph_dir_name || IGNORED_DIRS.contains(&name)))
            })
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file() && self.is_eligible(entry.path()))
            .map(walkdir::DirEntry::into_path)
            .collect();
        files.sort();
        files
    }

    /// Most recent modification time across eligible source files.
    pub fn latest_source_mtime(&self) -> Option<SystemTime> {
        self.eligible_files()
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok()?.modified().ok())
            .max()
    }
}

/// Outcome of a full scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanReport {
    pub scanned: usize,
    pub failed: usize,
}

/// Extract one file from disk. Unreadable bytes are extracted lossily;
/// unsupported extensions yield `None`.
pub fn extract_file(
    registry: &ExtractorRegistry,
    scanner: &RepoScanner,
    path: &Path,
) -> std::io::Result<Option<ExtractionRecord>> {
    let Some(rel) = scanner.relative(path) else {
        return Ok(None);
    };
    let bytes = std::fs::read(path)?;
    let source = String::from_utf8_lossy(&bytes);
    Ok(registry.extract(&rel, &source))
}

/// Extract every eligible file in parallel and apply the records in
/// path order, finishing with one resolution sweep. `on_file` is called
/// once per processed file (progress reporting).
pub fn full_scan<F>(
    scanner: &RepoScanner,
    store: &GraphStore,
    registry: &ExtractorRegistry,
    parallelism: usize,
    on_file: F,
) -> Result<ScanReport, StoreError>
where
    F: Fn(&Path) + Sync,
{
    let files = scanner.eligible_files();
    debug!(files = files.len(), parallelism, "Starting full scan");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.max(1))
        .build()
        .map_err(|e| StoreError::Unavailable(format!("worker pool: {e}")))?;

    let records: Vec<(PathBuf, std::io::Result<Option<ExtractionRecord>>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let result = extract_file(registry, scanner, path);
                on_file(path);
                (path.clone(), result)
            })
            .collect()
    });

    let mut report = ScanReport::default();
    for (path, result) in records {
        match result {
            Ok(Some(record)) => {
                store.apply_delta(&record)?;
                report.scanned += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Extraction failed");
                report.failed += 1;
            }
        }
    }
    store.resolve_sweep()?;
    Ok(report)
}
