use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Classifies a recovered failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanEventKind {
    /// A directory entry could not be visited during collection
    Traversal,
    /// A candidate file could not be read
    Read,
    /// Bytes were malformed for the requested encoding and were
    /// replaced while decoding; the file was still scanned
    Decode,
    /// A worker chunk failed unexpectedly and contributed nothing
    Chunk,
}

/// A recovered failure, kept queryable so callers can assert on what a
/// search skipped instead of scraping logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEvent {
    pub kind: ScanEventKind,
    pub path: PathBuf,
    pub message: String,
}

/// Counters and recovered-failure records for a single search run
#[derive(Debug, Clone)]
pub struct SearchMetrics {
    files_collected: Arc<AtomicU64>,
    files_scanned: Arc<AtomicU64>,
    files_failed: Arc<AtomicU64>,
    matches_found: Arc<AtomicU64>,
    events: Arc<Mutex<Vec<ScanEvent>>>,
}

/// Point-in-time snapshot of the counters
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub files_collected: u64,
    pub files_scanned: u64,
    pub files_failed: u64,
    pub matches_found: u64,
    pub events_recorded: usize,
}

impl SearchMetrics {
    pub fn new() -> Self {
        Self {
            files_collected: Arc::new(AtomicU64::new(0)),
            files_scanned: Arc::new(AtomicU64::new(0)),
            files_failed: Arc::new(AtomicU64::new(0)),
            matches_found: Arc::new(AtomicU64::new(0)),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Clears all counters and events. Called at the start of a search
    /// so the metrics always describe the most recent run.
    pub fn reset(&self) {
        self.files_collected.store(0, Ordering::Relaxed);
        self.files_scanned.store(0, Ordering::Relaxed);
        self.files_failed.store(0, Ordering::Relaxed);
        self.matches_found.store(0, Ordering::Relaxed);
        self.events.lock().clear();
    }

    pub(crate) fn record_files_collected(&self, count: u64) {
        self.files_collected.store(count, Ordering::Relaxed);
    }

    pub(crate) fn record_file_scanned(&self) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_matches(&self, count: u64) {
        self.matches_found.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a recovered failure and emits the matching warning.
    pub(crate) fn record_event(
        &self,
        kind: ScanEventKind,
        path: &Path,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!("Recovered {:?} failure at {}: {}", kind, path.display(), message);
        self.events.lock().push(ScanEvent {
            kind,
            path: path.to_path_buf(),
            message,
        });
    }

    /// All events recorded since the last reset, in arrival order
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events of one kind
    pub fn count_events(&self, kind: ScanEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn stats(&self) -> SearchStats {
        SearchStats {
            files_collected: self.files_collected.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            matches_found: self.matches_found.load(Ordering::Relaxed),
            events_recorded: self.events.lock().len(),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            "Search stats: {} files collected, {} scanned, {} failed, {} matches, {} events",
            stats.files_collected,
            stats.files_scanned,
            stats.files_failed,
            stats.matches_found,
            stats.events_recorded
        );
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
