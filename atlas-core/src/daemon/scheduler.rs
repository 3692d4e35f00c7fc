// Event coalescing: rapid edits to the same file collapse into one
// pending entry, released only after a quiescence interval, then cut
// into bounded, deterministically ordered batches.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::WatcherSection;
use crate::daemon::watcher::{ChangeKind, WatchEvent};

/// A set of coalesced events processed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub items: Vec<WatchEvent>,
}

#[derive(Debug)]
struct Pending {
    kind: ChangeKind,
    last_event: Instant,
}

/// The coalescing queue between the watcher and the applier.
#[derive(Debug)]
pub struct Scheduler {
    quiescence: Duration,
    batch_size: usize,
    pending: HashMap<String, Pending>,
}

impl Scheduler {
    pub fn new(config: &WatcherSection) -> Self {
        Self {
            quiescence: Duration::from_millis(config.quiescence_delay_ms),
            batch_size: config.batch_size,
            pending: HashMap::new(),
        }
    }

    /// Record an event, merging it with any pending one for the path.
    pub fn record(&mut self, event: WatchEvent, now: Instant) {
        let entry = self.pending.entry(event.path).or_insert(Pending {
            kind: event.kind,
            last_event: now,
        });
        entry.kind = merge_kinds(entry.kind, event.kind);
        entry.last_event = now;
    }

    /// Number of files waiting for quiescence.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Release every file that has been quiet long enough, grouped into
    /// batches: deletions before creations before modifications, paths
    /// sorted within each kind, FIFO across the split batches.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<Batch> {
        let ready: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_event) >= self.quiescence)
            .map(|(path, _)| path.clone())
            .collect();

        let mut items: Vec<WatchEvent> = ready
            .into_iter()
            .map(|path| {
                let pending = self.pending.remove(&path).expect("ready path pending");
                WatchEvent {
                    path,
                    kind: pending.kind,
                }
            })
            .collect();
        items.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.path.cmp(&b.path)));

        items
            .chunks(self.batch_size)
            .map(|chunk| Batch {
                items: chunk.to_vec(),
            })
            .collect()
    }

    /// Release everything regardless of quiescence (shutdown drain).
    pub fn drain_all(&mut self) -> Vec<Batch> {
        let force = Instant::now() + self.quiescence + self.quiescence;
        self.drain_ready(force)
    }
}

/// Later events win, except that a deletion followed by re-creation is
/// a creation, and modifying a freshly created file keeps it a creation.
fn merge_kinds(old: ChangeKind, new: ChangeKind) -> ChangeKind {
    match (old, new) {
        (ChangeKind::Deleted, ChangeKind::Created | ChangeKind::Modified) => ChangeKind::Created,
        (ChangeKind::Created, ChangeKind::Modified) => ChangeKind::Created,
        (_, kind) => kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(quiescence_ms: u64, batch_size: usize) -> WatcherSection {
        WatcherSection {
            quiescence_delay_ms: quiescence_ms,
            batch_size,
            ignore: Vec::new(),
        }
    }

    fn event(path: &str, kind: ChangeKind) -> WatchEvent {
        WatchEvent {
            path: path.to_string(),
            kind,
        }
    }

    #[test]
    fn rapid_edits_coalesce_into_one_batch() {
        // Two modifications within the quiescence window come out as a
        // single event in a single batch.
        let mut scheduler = Scheduler::new(&config(500, 10));
        let t0 = Instant::now();

        scheduler.record(event("a.py", ChangeKind::Modified), t0);
        scheduler.record(
            event("a.py", ChangeKind::Modified),
            t0 + Duration::from_millis(100),
        );

        // Still inside the window measured from the *last* event.
        assert!(scheduler
            .drain_ready(t0 + Duration::from_millis(550))
            .is_empty());

        let batches = scheduler.drain_ready(t0 + Duration::from_millis(601));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].items, vec![event("a.py", ChangeKind::Modified)]);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn deletions_ordered_before_creations_and_modifications() {
        let mut scheduler = Scheduler::new(&config(0, 10));
        let t0 = Instant::now();
        scheduler.record(event("m.py", ChangeKind::Modified), t0);
        scheduler.record(event("c.py", ChangeKind::Created), t0);
        scheduler.record(event("d.py", ChangeKind::Deleted), t0);

        let batches = scheduler.drain_ready(t0);
        assert_eq!(batches.len(), 1);
        let kinds: Vec<ChangeKind> = batches[0].items.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Deleted, ChangeKind::Created, ChangeKind::Modified]
        );
    }

    #[test]
    fn bursts_split_across_batches() {
        let mut scheduler = Scheduler::new(&config(0, 3));
        let t0 = Instant::now();
        for i in 0..7 {
            scheduler.record(event(&format!("f{i}.py"), ChangeKind::Modified), t0);
        }

        let batches = scheduler.drain_ready(t0);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].items.len(), 3);
        assert_eq!(batches[1].items.len(), 3);
        assert_eq!(batches[2].items.len(), 1);
    }

    #[test]
    fn delete_then_recreate_becomes_creation() {
        let mut scheduler = Scheduler::new(&config(0, 10));
        let t0 = Instant::now();
        scheduler.record(event("a.py", ChangeKind::Deleted), t0);
        scheduler.record(event("a.py", ChangeKind::Created), t0);

        let batches = scheduler.drain_ready(t0);
        assert_eq!(batches[0].items, vec![event("a.py", ChangeKind::Created)]);
    }

    #[test]
    fn modify_then_delete_is_deletion() {
        let mut scheduler = Scheduler::new(&config(0, 10));
        let t0 = Instant::now();
        scheduler.record(event("a.py", ChangeKind::Modified), t0);
        scheduler.record(event("a.py", ChangeKind::Deleted), t0);

        let batches = scheduler.drain_ready(t0);
        assert_eq!(batches[0].items, vec![event("a.py", ChangeKind::Deleted)]);
    }

    #[test]
    fn drain_all_ignores_quiescence() {
        let mut scheduler = Scheduler::new(&config(10_000, 10));
        scheduler.record(event("a.py", ChangeKind::Modified), Instant::now());
        assert_eq!(scheduler.drain_all().len(), 1);
    }
}
