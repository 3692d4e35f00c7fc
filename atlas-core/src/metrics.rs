// Daemon counters and gauges. All counters are atomics so any thread
// may record; the snapshot written to disk is a point-in-time copy.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::Language;

/// EMA smoothing factor for the average update duration.
const EMA_ALPHA: f64 = 0.2;
/// Sliding window length for the error-rate health check.
const ERROR_WINDOW: usize = 50;
/// Error rate above which a health warning is emitted.
const ERROR_RATE_WARN: f64 = 0.25;
/// Event-queue depth above which a health warning is emitted.
pub const QUEUE_DEPTH_WARN: usize = 1000;

/// Live metric state owned by the daemon supervisor.
#[derive(Debug, Default)]
pub struct DaemonMetrics {
    updates: AtomicU64,
    errors: AtomicU64,
    /// Milliseconds since the Unix epoch; 0 = never.
    last_update_ms: AtomicU64,
    /// EMA of update duration, stored as f64 bits.
    avg_update_ms: AtomicU64,
    /// Recent outcomes (true = error) for the sliding error rate.
    window: Mutex<VecDeque<bool>>,
}

impl DaemonMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(&self, duration: Duration) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        let now_ms = u64::try_from(Utc::now().timestamp_millis().max(0)).unwrap_or(0);
        self.last_update_ms.store(now_ms, Ordering::Relaxed);

        let sample = duration.as_secs_f64() * 1000.0;
        let prev = f64::from_bits(self.avg_update_ms.load(Ordering::Relaxed));
        let next = if prev == 0.0 {
            sample
        } else {
            prev * (1.0 - EMA_ALPHA) + sample * EMA_ALPHA
        };
        self.avg_update_ms.store(next.to_bits(), Ordering::Relaxed);
        self.push_outcome(false);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.push_outcome(true);
    }

    fn push_outcome(&self, is_error: bool) {
        if let Ok(mut window) = self.window.lock() {
            window.push_back(is_error);
            while window.len() > ERROR_WINDOW {
                window.pop_front();
            }
        }
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Error fraction over the recent outcome window.
    pub fn windowed_error_rate(&self) -> f64 {
        let Ok(window) = self.window.lock() else {
            return 0.0;
        };
        if window.is_empty() {
            return 0.0;
        }
        let errors = window.iter().filter(|e| **e).count();
        errors as f64 / window.len() as f64
    }

    /// Emit health warnings for out-of-bound gauges.
    pub fn check_health(&self, memory_warn_mb: u64, queue_depth: usize) {
        if let Some(memory_mb) = sample_memory_mb() {
            if memory_mb > memory_warn_mb {
                warn!(memory_mb, threshold = memory_warn_mb, "Memory above threshold");
            }
        }
        let rate = self.windowed_error_rate();
        if rate > ERROR_RATE_WARN {
            warn!(error_rate = rate, "Extraction error rate above threshold");
        }
        if queue_depth > QUEUE_DEPTH_WARN {
            warn!(queue_depth, "Event queue backlog above threshold");
        }
    }

    /// Point-in-time copy for the metrics artifact.
    pub fn snapshot(
        &self,
        files_by_language: BTreeMap<Language, usize>,
        extractors: Vec<ExtractorAvailability>,
        queue_depth: usize,
    ) -> MetricsSnapshot {
        let last_ms = self.last_update_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            updated_at: Utc::now(),
            updates: self.updates(),
            errors: self.errors(),
            error_rate: self.windowed_error_rate(),
            avg_update_ms: f64::from_bits(self.avg_update_ms.load(Ordering::Relaxed)),
            last_update: (last_ms > 0)
                .then(|| DateTime::from_timestamp_millis(last_ms as i64))
                .flatten(),
            memory_mb: sample_memory_mb(),
            queue_depth,
            files_by_language,
            extractors,
        }
    }
}

/// One entry of the per-analyzer availability listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorAvailability {
    pub language: Language,
    pub extractor: String,
}

/// The metrics artifact written alongside every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub updated_at: DateTime<Utc>,
    pub updates: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub avg_update_ms: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub memory_mb: Option<u64>,
    pub queue_depth: usize,
    pub files_by_language: BTreeMap<Language, usize>,
    pub extractors: Vec<ExtractorAvailability>,
}

/// Resident set size in MiB, when the platform exposes it.
#[cfg(target_os = "linux")]
fn sample_memory_mb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096 / (1024 * 1024))
}

#[cfg(not(target_os = "linux"))]
fn sample_memory_mb() -> Option<u64> {
    None
}
