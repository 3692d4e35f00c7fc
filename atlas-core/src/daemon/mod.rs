// Daemon supervisor: lock acquisition, startup snapshot-or-scan, the
// watcher/scheduler/applier event loop, signals, and the control API.

pub mod lock;
pub mod scheduler;
pub mod watcher;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UnixListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{RwLock, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use atlas_extract::{ExtractError, ExtractionRecord, ExtractorRegistry};

use crate::api::{self, ApiContext, ControlVerb};
use crate::cluster::{Clusterer, SuperGraph};
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::graphdir::GraphDir;
use crate::metrics::{DaemonMetrics, ExtractorAvailability};
use crate::scan::{self, RepoScanner};
use crate::snapshot;
use crate::store::GraphStore;

use lock::LockFile;
use scheduler::{Batch, Scheduler};
use watcher::{ChangeKind, RepoWatcher, WatchEvent};

/// Scheduler poll cadence.
const TICK: Duration = Duration::from_millis(100);
/// Watch re-establish attempts before degrading to periodic scans.
const WATCHER_RESTART_LIMIT: u32 = 3;
/// Full-rescan cadence in degraded (watcherless) mode.
const FALLBACK_RESCAN_INTERVAL: Duration = Duration::from_secs(30);

/// The long-lived daemon process state.
#[derive(Debug)]
pub struct Daemon {
    graph_dir: GraphDir,
    config: AtlasConfig,
    store: Arc<GraphStore>,
    clusterer: Clusterer,
    supergraph: Arc<RwLock<Option<SuperGraph>>>,
    metrics: Arc<DaemonMetrics>,
    registry: Arc<ExtractorRegistry>,
    scanner: Arc<RepoScanner>,
}

impl Daemon {
    pub fn new(graph_dir: GraphDir) -> Result<Self> {
        let config = graph_dir.load_config()?;
        let scanner = Arc::new(RepoScanner::new(&graph_dir, &config.watcher)?);
        let clusterer = Clusterer::new(config.cluster.clone());
        Ok(Self {
            graph_dir,
            config,
            store: Arc::new(GraphStore::new()),
            clusterer,
            supergraph: Arc::new(RwLock::new(None)),
            metrics: Arc::new(DaemonMetrics::new()),
            registry: Arc::new(ExtractorRegistry::new()),
            scanner,
        })
    }

    /// Run until a stop signal or control verb arrives. Holds the
    /// single-instance lock for the whole lifetime.
    pub async fn run(mut self) -> Result<()> {
        let lock = LockFile::acquire(&self.graph_dir)?;

        self.startup()?;
        self.rebuild_clusters_if_due().await;
        self.write_snapshot(0).await;

        // Control socket.
        let socket_path = self.graph_dir.socket_path();
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)
            .map_err(crate::error::DaemonError::Io)?;
        let (control_tx, mut control_rx) = mpsc::channel::<ControlVerb>(16);
        let ctx = Arc::new(ApiContext {
            store: self.store.clone(),
            supergraph: self.supergraph.clone(),
            metrics: self.metrics.clone(),
            registry: self.registry.clone(),
            control: control_tx,
        });
        let api_task = tokio::spawn(api::serve(listener, ctx));

        // Watcher. The local `event_tx` keeps the channel open across
        // watcher restarts.
        let (event_tx, mut event_rx) = mpsc::channel::<WatchEvent>(4096);
        let (failure_tx, mut failure_rx) = mpsc::channel::<notify::Error>(4);
        let mut repo_watcher = Some(RepoWatcher::start(
            self.scanner.clone(),
            event_tx.clone(),
            failure_tx.clone(),
        )?);
        let mut watcher_restarts = 0u32;
        let mut last_fallback_scan = Instant::now();

        let mut queue = Scheduler::new(&self.config.watcher);
        let mut tick = tokio::time::interval(TICK);
        let mut sigterm = signal(SignalKind::terminate()).map_err(crate::error::DaemonError::Io)?;
        let mut sighup = signal(SignalKind::hangup()).map_err(crate::error::DaemonError::Io)?;
        let mut ctrl_c = Box::pin(tokio::signal::ctrl_c());

        info!(root = %self.scanner.root().display(), "Daemon running");

        let mut fatal: Option<crate::error::StoreError> = None;
        let mut stopping = false;
        while !stopping {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received interrupt, shutting down");
                    stopping = true;
                }
                _ = sigterm.recv() => {
                    info!("Received terminate, shutting down");
                    stopping = true;
                }
                _ = sighup.recv() => {
                    info!("Received hangup, queueing full re-scan");
                    self.enqueue_full_rescan(&mut queue);
                }
                Some(event) = event_rx.recv() => {
                    queue.record(event, Instant::now());
                }
                Some(verb) = control_rx.recv() => match verb {
                    ControlVerb::Stop => {
                        info!("Stop requested via control socket");
                        stopping = true;
                    }
                    ControlVerb::Refresh => {
                        info!("Refresh requested via control socket");
                        self.enqueue_full_rescan(&mut queue);
                    }
                },
                Some(err) = failure_rx.recv() => {
                    warn!(error = %err, "Watch subsystem failure");
                    repo_watcher = None;
                    if watcher_restarts < WATCHER_RESTART_LIMIT {
                        watcher_restarts += 1;
                        match RepoWatcher::start(
                            self.scanner.clone(),
                            event_tx.clone(),
                            failure_tx.clone(),
                        ) {
                            Ok(next) => {
                                info!(attempt = watcher_restarts, "Watcher re-established");
                                repo_watcher = Some(next);
                            }
                            Err(e) => {
                                warn!(error = %e, "Watcher restart failed");
                            }
                        }
                    }
                    if repo_watcher.is_none() && watcher_restarts >= WATCHER_RESTART_LIMIT {
                        warn!("Degrading to periodic full scans");
                    }
                }
                _ = tick.tick() => {
                    if repo_watcher.is_none()
                        && last_fallback_scan.elapsed() >= FALLBACK_RESCAN_INTERVAL
                    {
                        last_fallback_scan = Instant::now();
                        self.enqueue_full_rescan(&mut queue);
                    }
                    let batches = queue.drain_ready(Instant::now());
                    for batch in batches {
                        if let Err(e) = self.process_batch(batch, queue.pending_len()).await {
                            error!(error = %e, "Store invariant violated, shutting down");
                            fatal = Some(e);
                            stopping = true;
                            break;
                        }
                    }
                }
            }
        }

        // Drain whatever is still pending, flush a final snapshot of
        // whatever is consistent.
        if fatal.is_none() {
            for batch in queue.drain_all() {
                if let Err(e) = self.process_batch(batch, 0).await {
                    error!(error = %e, "Store invariant violated during drain");
                    fatal = Some(e);
                    break;
                }
            }
        }
        self.write_snapshot(0).await;

        api_task.abort();
        let _ = std::fs::remove_file(&socket_path);
        lock.release();
        match fatal {
            Some(e) => Err(e.into()),
            None => {
                info!("Daemon stopped");
                Ok(())
            }
        }
    }

    /// Initialize the store: reuse a fresh snapshot, otherwise scan.
    fn startup(&mut self) -> Result<()> {
        let snapshot_fresh = match snapshot::store_mtime(&self.graph_dir) {
            Some(snapshot_time) => self
                .scanner
                .latest_source_mtime()
                .is_none_or(|source_time| snapshot_time >= source_time),
            None => false,
        };

        if snapshot_fresh {
            match snapshot::load_store(&self.graph_dir) {
                Ok(store) => {
                    info!(
                        files = store.node_count().unwrap_or(0),
                        "Store restored from snapshot"
                    );
                    self.store = Arc::new(store);
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "Snapshot unreadable, falling back to scan"),
            }
        }

        let store = GraphStore::new();
        let report = scan::full_scan(
            &self.scanner,
            &store,
            &self.registry,
            self.config.worker_parallelism(),
            |_| {},
        )?;
        info!(
            scanned = report.scanned,
            failed = report.failed,
            "Initial scan complete"
        );
        for _ in 0..report.failed {
            self.metrics.record_error();
        }
        self.store = Arc::new(store);
        Ok(())
    }

    fn enqueue_full_rescan(&self, queue: &mut Scheduler) {
        let now = Instant::now();
        for path in self.scanner.eligible_files() {
            if let Some(rel) = self.scanner.relative(&path) {
                queue.record(
                    WatchEvent {
                        path: rel,
                        kind: ChangeKind::Modified,
                    },
                    now,
                );
            }
        }
        debug!(pending = queue.pending_len(), "Full re-scan queued");
    }

    /// Apply one batch: deletions first, then concurrent extraction of
    /// the surviving paths with a per-file timeout, then in-order
    /// application and one resolution sweep.
    ///
    /// Per-file extraction failures never escalate past the batch; a
    /// store failure does (the store may no longer be trusted).
    async fn process_batch(
        &self,
        batch: Batch,
        queue_depth: usize,
    ) -> std::result::Result<(), crate::error::StoreError> {
        let extract_timeout = Duration::from_secs(self.config.daemon.extract_timeout_s);
        let semaphore = Arc::new(Semaphore::new(self.config.worker_parallelism().max(1)));

        let mut extractions: JoinSet<(String, Duration, std::result::Result<Option<ExtractionRecord>, ExtractError>)> =
            JoinSet::new();

        for item in &batch.items {
            match item.kind {
                ChangeKind::Deleted => {
                    let started = Instant::now();
                    self.store.remove_file(&item.path)?;
                    self.metrics.record_update(started.elapsed());
                }
                ChangeKind::Created | ChangeKind::Modified => {
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        continue;
                    };
                    let registry = self.registry.clone();
                    let scanner = self.scanner.clone();
                    let rel = item.path.clone();
                    let abs = self.scanner.root().join(&item.path);
                    extractions.spawn(async move {
                        let _permit = permit;
                        let started = Instant::now();
                        let extraction = tokio::time::timeout(
                            extract_timeout,
                            tokio::task::spawn_blocking(move || {
                                scan::extract_file(&registry, &scanner, &abs)
                            }),
                        )
                        .await;
                        let result = match extraction {
                            Err(_) => Err(ExtractError::Failed {
                                path: rel.clone(),
                                reason: "extraction timed out".into(),
                            }),
                            Ok(Err(join_error)) => Err(ExtractError::Failed {
                                path: rel.clone(),
                                reason: join_error.to_string(),
                            }),
                            Ok(Ok(Err(io_error))) => Err(ExtractError::Io(io_error)),
                            Ok(Ok(Ok(record))) => Ok(record),
                        };
                        (rel, started.elapsed(), result)
                    });
                }
            }
        }

        let mut results: HashMap<String, (Duration, std::result::Result<Option<ExtractionRecord>, ExtractError>)> =
            HashMap::new();
        while let Some(joined) = extractions.join_next().await {
            match joined {
                Ok((path, duration, result)) => {
                    results.insert(path, (duration, result));
                }
                Err(e) => {
                    error!(error = %e, "Extraction task panicked");
                    self.metrics.record_error();
                }
            }
        }

        // Apply in the batch's deterministic order.
        for item in &batch.items {
            let Some((duration, result)) = results.remove(&item.path) else {
                continue;
            };
            match result {
                Ok(Some(record)) => {
                    let change = self.store.apply_delta(&record)?;
                    debug!(
                        file = %item.path,
                        added = change.added.len(),
                        removed = change.removed.len(),
                        "Delta applied"
                    );
                    self.metrics.record_update(duration);
                }
                Ok(None) => {}
                Err(e) => {
                    // A file deleted between the event and the read is
                    // a removal, not an extraction failure.
                    if matches!(&e, ExtractError::Io(io) if io.kind() == std::io::ErrorKind::NotFound)
                    {
                        self.store.remove_file(&item.path)?;
                        continue;
                    }
                    warn!(file = %item.path, error = %e, "Extraction failed");
                    self.metrics.record_error();
                }
            }
        }

        self.store.resolve_sweep()?;

        self.metrics
            .check_health(self.config.daemon.memory_warn_mb, queue_depth);
        self.rebuild_clusters_if_due().await;
        self.write_snapshot(queue_depth).await;
        Ok(())
    }

    async fn rebuild_clusters_if_due(&self) {
        let count = self.store.node_count().unwrap_or(0);
        if !self.clusterer.should_run(count) {
            return;
        }
        match self.clusterer.build(&self.store) {
            Ok(graph) => {
                *self.supergraph.write().await = Some(graph);
            }
            Err(e) => error!(error = %e, "Cluster rebuild failed"),
        }
    }

    /// Best-effort artifact flush; failures leave the prior snapshot in
    /// place and the daemon running.
    async fn write_snapshot(&self, queue_depth: usize) {
        if let Err(e) = snapshot::write_store(&self.graph_dir, &self.store) {
            error!(error = %e, "Store snapshot failed");
        }

        let files_by_language = self
            .store
            .stats()
            .map(|s| s.files_by_language)
            .unwrap_or_default();
        let extractors = self
            .registry
            .availability()
            .into_iter()
            .map(|(language, extractor)| ExtractorAvailability {
                language,
                extractor: extractor.to_string(),
            })
            .collect();
        let metrics = self
            .metrics
            .snapshot(files_by_language, extractors, queue_depth);
        if let Err(e) = snapshot::write_metrics(&self.graph_dir, &metrics) {
            error!(error = %e, "Metrics snapshot failed");
        }

        if let Some(graph) = self.supergraph.read().await.as_ref() {
            if let Err(e) = snapshot::write_supergraph(&self.graph_dir, graph) {
                error!(error = %e, "Super-graph snapshot failed");
            }
        }
    }
}

/// Map an error to the daemon's process exit code.
pub fn exit_code_for(error: &AtlasError) -> i32 {
    match error {
        AtlasError::Daemon(crate::error::DaemonError::LockHeld { .. }) => 2,
        AtlasError::Snapshot(_) => 3,
        AtlasError::Config(_) => 4,
        _ => 1,
    }
}
