use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level Atlas configuration, matching `<graph-dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtlasConfig {
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub watcher: WatcherSection,
    #[serde(default)]
    pub daemon: DaemonSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Compression factor: one cluster per this many files.
    pub target_reduction: usize,
    /// Communities smaller than this merge into `misc`.
    pub min_cluster_size: usize,
    /// Absolute ceiling on cluster count.
    pub max_clusters: usize,
    /// Below this file count every file is its own cluster.
    pub small_project_threshold: usize,
    /// Move threshold multiplier for the community loop.
    pub resolution: f64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            target_reduction: 100,
            min_cluster_size: 2,
            max_clusters: 50,
            small_project_threshold: 20,
            resolution: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    /// Batch coalescing quiescence delay.
    pub quiescence_delay_ms: u64,
    /// Max files per batch; larger bursts split across batches.
    pub batch_size: usize,
    /// Additional glob patterns to ignore, on top of the built-in set.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            quiescence_delay_ms: 500,
            batch_size: 10,
            ignore: Vec::new(),
        }
    }
}

impl WatcherSection {
    /// Compiled user-configured ignore patterns.
    pub fn watcher_ignore_patterns(&self) -> Result<Vec<glob::Pattern>, glob::PatternError> {
        self.ignore.iter().map(|p| glob::Pattern::new(p)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    /// Hard per-file extraction timeout.
    pub extract_timeout_s: u64,
    /// Memory health threshold.
    pub memory_warn_mb: u64,
    /// Extractor concurrency; 0 selects the CPU count.
    pub worker_parallelism: usize,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            extract_timeout_s: 30,
            memory_warn_mb: 500,
            worker_parallelism: 0,
        }
    }
}

impl AtlasConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::NotFound(format!("{}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.target_reduction == 0 {
            return Err(ConfigError::Invalid("target_reduction must be > 0".into()));
        }
        if self.cluster.max_clusters == 0 {
            return Err(ConfigError::Invalid("max_clusters must be > 0".into()));
        }
        if !(self.cluster.resolution.is_finite() && self.cluster.resolution > 0.0) {
            return Err(ConfigError::Invalid(
                "resolution must be a positive number".into(),
            ));
        }
        if self.watcher.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        for pattern in &self.watcher.ignore {
            glob::Pattern::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("ignore pattern {pattern:?}: {e}")))?;
        }
        Ok(())
    }

    /// Effective extractor concurrency.
    pub fn worker_parallelism(&self) -> usize {
        if self.daemon.worker_parallelism == 0 {
            num_cpus::get()
        } else {
            self.daemon.worker_parallelism
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = AtlasConfig::default();
        assert_eq!(config.cluster.target_reduction, 100);
        assert_eq!(config.cluster.min_cluster_size, 2);
        assert_eq!(config.cluster.max_clusters, 50);
        assert_eq!(config.cluster.small_project_threshold, 20);
        assert!((config.cluster.resolution - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.watcher.quiescence_delay_ms, 500);
        assert_eq!(config.watcher.batch_size, 10);
        assert_eq!(config.daemon.extract_timeout_s, 30);
        assert_eq!(config.daemon.memory_warn_mb, 500);
        assert!(config.worker_parallelism() >= 1);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AtlasConfig =
            toml::from_str("[cluster]\ntarget_reduction = 50\n").unwrap();
        assert_eq!(config.cluster.target_reduction, 50);
        assert_eq!(config.cluster.max_clusters, 50);
        assert_eq!(config.watcher.batch_size, 10);
    }

    #[test]
    fn invalid_values_rejected() {
        let config: AtlasConfig =
            toml::from_str("[cluster]\ntarget_reduction = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: AtlasConfig = toml::from_str("[watcher]\nbatch_size = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: AtlasConfig = toml::from_str("[watcher]\nignore = [\"[bad\"]\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let config = AtlasConfig::load(Path::new("/nonexistent/atlas/config.toml")).unwrap();
        assert_eq!(config.watcher.batch_size, 10);
    }
}
