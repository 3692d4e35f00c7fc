/// Top-level Atlas error type.
#[derive(thiserror::Error, Debug)]
pub enum AtlasError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Extraction error: {0}")]
    Extract(#[from] atlas_extract::ExtractError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Daemon error: {0}")]
    Daemon(#[from] DaemonError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// An internal invariant was violated; continued operation would
    /// corrupt downstream snapshots.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot write failed after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },

    #[error("Snapshot not found in {0}")]
    Missing(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DaemonError {
    #[error("Another instance holds the lock (pid {pid})")]
    LockHeld { pid: u32 },

    #[error("Watcher lost: {0}")]
    WatcherLost(String),

    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Cannot parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Malformed request; reported to the caller, daemon unaffected.
    #[error("Bad request: {0}")]
    BadInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AtlasError>;
