// Filesystem watcher: bridges notify events onto a tokio channel,
// filtered down to eligible source files.

use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DaemonError;
use crate::scan::RepoScanner;

/// What happened to a file. The variant order is the batch processing
/// order: deletions first, then creations, then modifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Deleted,
    Created,
    Modified,
}

/// One filtered filesystem event, keyed by canonical repo-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: ChangeKind,
}

/// Running watch on a repository root. Dropping it stops the watch.
#[derive(Debug)]
pub struct RepoWatcher {
    _watcher: RecommendedWatcher,
}

impl RepoWatcher {
    /// Start watching. Eligible events land on `events`; watch-subsystem
    /// failures land on `failures` so the supervisor can re-establish.
    pub fn start(
        scanner: Arc<RepoScanner>,
        events: mpsc::Sender<WatchEvent>,
        failures: mpsc::Sender<notify::Error>,
    ) -> Result<Self, DaemonError> {
        let root = scanner.root().to_path_buf();

        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        let _ = failures.blocking_send(e);
                        return;
                    }
                };
                let kind = match event.kind {
                    EventKind::Create(_) => ChangeKind::Created,
                    EventKind::Remove(_) => ChangeKind::Deleted,
                    // Renames arrive as modifications; a vanished path
                    // is a deletion.
                    EventKind::Modify(_) => ChangeKind::Modified,
                    _ => return,
                };
                for path in event.paths {
                    if !scanner.is_eligible(&path) {
                        continue;
                    }
                    let Some(rel) = scanner.relative(&path) else {
                        continue;
                    };
                    let kind = if kind == ChangeKind::Modified && !path.exists() {
                        ChangeKind::Deleted
                    } else {
                        kind
                    };
                    debug!(path = %rel, ?kind, "Filesystem event");
                    let _ = events.blocking_send(WatchEvent { path: rel, kind });
                }
            })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_processing_order() {
        let mut kinds = vec![ChangeKind::Modified, ChangeKind::Created, ChangeKind::Deleted];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![ChangeKind::Deleted, ChangeKind::Created, ChangeKind::Modified]
        );
    }
}
