//! Concurrent search pipeline.
//!
//! A search runs in two phases. The collector walks the tree on the
//! coordinator thread and produces the full candidate list up front;
//! the scheduler then partitions that list into contiguous chunks and
//! fans them out across a dedicated worker pool sized for the request.
//! Each worker scans its chunk file by file and sends the chunk's
//! matches over a channel; the coordinator drains that channel,
//! delivers each batch to the caller as it lands, and merges it into
//! the running total.
//!
//! Ordering: matches within one file arrive in line order, then left
//! to right within a line. Across files the order follows chunk
//! completion and is unspecified.
//!
//! Cancellation is cooperative. Every search installs a fresh
//! [`SearchSession`] whose token is polled at the traversal loop, at
//! each file boundary inside a chunk, and at each line inside a file.
//! A cancelled search stops merging, abandons stragglers, and returns
//! the partial results collected so far; it never returns an error.
//!
//! The compiled pattern is built once, before dispatch. Workers clone
//! it cheaply and only read it; the only mutable shared state during
//! scanning is the session (cancellation flag, progress counter) and
//! the metrics, all atomic.

pub mod collector;
pub mod engine;
pub mod matcher;
pub mod processor;
pub mod scheduler;

pub use engine::SearchEngine;
pub use matcher::{CacheStats, MatchStrategy, PatternCache, PatternMatcher};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Per-invocation mutable state: the cancellation token and the
/// files-completed counter behind progress reporting.
///
/// A fresh session is installed at the start of every search and
/// cancellation targets the session, not the engine, so a straggler
/// from an abandoned run can never be revived by a later search
/// resetting a shared flag.
#[derive(Debug, Default)]
pub struct SearchSession {
    cancelled: AtomicBool,
    finished: AtomicBool,
    files_completed: AtomicUsize,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Marks the session complete. A finished session stays finished;
    /// it only ever transitions once.
    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Bumps the files-completed counter, returning the new value
    pub(crate) fn record_file_completed(&self) -> usize {
        self.files_completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn files_completed(&self) -> usize {
        self.files_completed.load(Ordering::Relaxed)
    }
}
