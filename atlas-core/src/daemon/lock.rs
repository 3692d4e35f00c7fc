// Single-instance lock: a plain-text PID file in the graph directory.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::DaemonError;
use crate::graphdir::GraphDir;

/// Exclusive daemon lock. Released on drop if still ours.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock for a graph directory. Refuses when another
    /// live process holds it; a dead holder's lock is cleaned up.
    pub fn acquire(graph_dir: &GraphDir) -> Result<Self, DaemonError> {
        let path = graph_dir.lock_path();

        if let Some(pid) = read_pid(&path)? {
            if is_pid_alive(pid) {
                return Err(DaemonError::LockHeld { pid });
            }
            warn!(pid, "Removing stale lock of dead process");
            std::fs::remove_file(&path)?;
        }

        let pid = std::process::id();
        std::fs::write(&path, pid.to_string())?;
        info!(pid, path = %path.display(), "Lock acquired");
        Ok(Self { path })
    }

    /// PID recorded in a graph directory's lock, if any.
    pub fn holder(graph_dir: &GraphDir) -> Result<Option<u32>, DaemonError> {
        read_pid(&graph_dir.lock_path())
    }

    /// Whether the recorded holder is a live process.
    pub fn holder_alive(graph_dir: &GraphDir) -> Result<bool, DaemonError> {
        Ok(Self::holder(graph_dir)?.is_some_and(is_pid_alive))
    }

    /// Explicit release; drop does the same.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Only remove the file if it still records our PID.
        if let Ok(Some(pid)) = read_pid(&self.path) {
            if pid == std::process::id() {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

fn read_pid(path: &std::path::Path) -> Result<Option<u32>, DaemonError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    match content.trim().parse::<u32>() {
        Ok(pid) => Ok(Some(pid)),
        Err(_) => {
            warn!(path = %path.display(), "Unparseable lock file, removing");
            std::fs::remove_file(path)?;
            Ok(None)
        }
    }
}

#[cfg(unix)]
fn is_pid_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();

        let lock = LockFile::acquire(&graph_dir).unwrap();
        assert_eq!(
            LockFile::holder(&graph_dir).unwrap(),
            Some(std::process::id())
        );
        assert!(LockFile::holder_alive(&graph_dir).unwrap());

        lock.release();
        assert_eq!(LockFile::holder(&graph_dir).unwrap(), None);
    }

    #[test]
    fn second_acquire_refused_while_held() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();

        let _lock = LockFile::acquire(&graph_dir).unwrap();
        match LockFile::acquire(&graph_dir) {
            Err(DaemonError::LockHeld { pid }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected LockHeld, got {other:?}"),
        }
    }

    #[test]
    fn stale_lock_of_dead_process_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        // PIDs near u32::MAX don't exist on any sane system.
        std::fs::write(graph_dir.lock_path(), "4294967294").unwrap();

        let lock = LockFile::acquire(&graph_dir).unwrap();
        assert_eq!(
            LockFile::holder(&graph_dir).unwrap(),
            Some(std::process::id())
        );
        drop(lock);
    }

    #[test]
    fn garbage_lock_file_recovered() {
        let tmp = tempfile::tempdir().unwrap();
        let graph_dir = GraphDir::open(tmp.path()).unwrap();
        std::fs::write(graph_dir.lock_path(), "not-a-pid").unwrap();

        let lock = LockFile::acquire(&graph_dir).unwrap();
        drop(lock);
        assert!(!graph_dir.lock_path().exists());
    }
}
