use std::path::{Path, PathBuf};

use atlas_extract::Language;

use crate::config::AtlasConfig;
use crate::error::ConfigError;

/// Default name of the graph directory under the repository root.
pub const DEFAULT_DIR_NAME: &str = ".graph";

/// The daemon's graph directory: the single owner of the on-disk layout
/// (lock, metrics, snapshot artifacts, control socket, config).
///
/// Components never compose these paths themselves; they receive a
/// `GraphDir` and ask it.
#[derive(Debug, Clone)]
pub struct GraphDir {
    repo_root: PathBuf,
    dir: PathBuf,
}

impl GraphDir {
    /// Open the graph directory for a repository, creating it (and the
    /// per-cluster subdirectory) if needed.
    pub fn open(repo_root: &Path) -> std::io::Result<Self> {
        Self::open_named(repo_root, DEFAULT_DIR_NAME)
    }

    pub fn open_named(repo_root: &Path, dir_name: &str) -> std::io::Result<Self> {
        let dir = repo_root.join(dir_name);
        std::fs::create_dir_all(dir.join("clusters"))?;
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            dir,
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Directory name relative to the repo root (always in the ignore set).
    pub fn dir_name(&self) -> &str {
        self.dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_DIR_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join("daemon.lock")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join("metrics.json")
    }

    pub fn nodes_path(&self, language: Language) -> PathBuf {
        self.dir.join(format!("nodes_{language}.json"))
    }

    pub fn supergraph_path(&self) -> PathBuf {
        self.dir.join("supergraph.json")
    }

    pub fn clusters_dir(&self) -> PathBuf {
        self.dir.join("clusters")
    }

    pub fn cluster_path(&self, cluster_id: &str) -> PathBuf {
        self.clusters_dir().join(format!("{cluster_id}.json"))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.dir.join("control.sock")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    /// Load the repository's configuration (defaults when absent).
    pub fn load_config(&self) -> Result<AtlasConfig, ConfigError> {
        AtlasConfig::load(&self.config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_repo_root() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();

        assert!(graph_dir.path().ends_with(".graph"));
        assert!(graph_dir.clusters_dir().is_dir());
        assert_eq!(graph_dir.dir_name(), ".graph");
        assert_eq!(
            graph_dir.nodes_path(Language::Python).file_name().unwrap(),
            "nodes_python.json"
        );
        assert_eq!(
            graph_dir.cluster_path("c0").file_name().unwrap(),
            "c0.json"
        );
    }

    #[test]
    fn config_defaults_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        let config = graph_dir.load_config().unwrap();
        assert_eq!(config.watcher.batch_size, 10);
    }
}
