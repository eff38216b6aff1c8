use crossbeam_channel::{bounded, unbounded, Receiver};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::collector::collect_candidates;
use super::matcher::{CacheStats, PatternCache};
use super::processor::FileScanner;
use super::scheduler::{build_pool, default_worker_count, partition};
use super::SearchSession;
use crate::config::{resolve_encoding, SearchRequest};
use crate::errors::{SearchError, SearchResult};
use crate::filters::ExcludeMatcher;
use crate::metrics::{ScanEventKind, SearchMetrics};
use crate::results::SearchMatch;

/// How long `cancel` waits for an in-flight search to wind down before
/// abandoning it
const CANCEL_WAIT: Duration = Duration::from_secs(1);

/// Orchestrates the full search pipeline: validation, pattern
/// compilation, candidate collection, and fan-out of file scanning
/// across a dedicated worker pool.
///
/// Cloning is cheap and shares the pattern cache, metrics, and the
/// active session slot; the asynchronous entry point hands a clone to
/// its worker thread.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    worker_count: usize,
    pattern_cache: Arc<PatternCache>,
    metrics: SearchMetrics,
    /// Most recently started session; `cancel` and `is_searching`
    /// target whatever lives here.
    session: Arc<Mutex<Option<Arc<SearchSession>>>>,
    /// Completion signal of the in-flight asynchronous search, if any
    in_flight: Arc<Mutex<Option<Receiver<()>>>>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::build(default_worker_count())
    }

    pub fn with_worker_count(workers: NonZeroUsize) -> Self {
        Self::build(workers.get())
    }

    fn build(worker_count: usize) -> Self {
        debug!("Creating search engine with {} workers", worker_count);
        Self {
            worker_count,
            pattern_cache: Arc::new(PatternCache::new()),
            metrics: SearchMetrics::new(),
            session: Arc::new(Mutex::new(None)),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Metrics for the most recent search; reset whenever a new run
    /// passes validation
    pub fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.pattern_cache.stats()
    }

    pub fn clear_pattern_cache(&self) {
        self.pattern_cache.clear();
    }

    /// True while a session is running, from either entry point
    pub fn is_searching(&self) -> bool {
        self.session.lock().as_ref().map_or(false, |s| !s.is_finished())
    }

    /// Runs a search to completion and returns every match found.
    pub fn search(&self, request: &SearchRequest) -> SearchResult<Vec<SearchMatch>> {
        self.search_with_callbacks(request, |_, _, _| {}, |_| {})
    }

    /// Runs a search on the calling thread, streaming results as they
    /// are found.
    ///
    /// `on_progress` fires once per processed file with the number of
    /// files completed so far, the total candidate count, and the file's
    /// path; it is called from worker threads, so it must be cheap and
    /// thread-safe. `on_batch` fires on the calling thread with each
    /// chunk's matches before they are merged into the returned vector.
    ///
    /// The synchronous paths do not guard against overlap; only
    /// [`search_async`](Self::search_async) refuses to start while
    /// another session is active.
    pub fn search_with_callbacks<P, B>(
        &self,
        request: &SearchRequest,
        on_progress: P,
        on_batch: B,
    ) -> SearchResult<Vec<SearchMatch>>
    where
        P: Fn(usize, usize, &Path) + Send + Sync,
        B: FnMut(&[SearchMatch]),
    {
        let session = Arc::new(SearchSession::new());
        *self.session.lock() = Some(session.clone());
        let outcome = self.run(request, &session, &on_progress, on_batch);
        session.mark_finished();
        outcome
    }

    /// Starts a search on a background thread and returns immediately.
    ///
    /// Returns `false` without side effects if a session is already
    /// active. All three callbacks run on the background thread;
    /// `on_done` fires exactly once with the search outcome, after
    /// cancellation as well.
    pub fn search_async<P, B, D>(
        &self,
        request: SearchRequest,
        on_progress: P,
        on_batch: B,
        on_done: D,
    ) -> bool
    where
        P: Fn(usize, usize, &Path) + Send + Sync + 'static,
        B: FnMut(&[SearchMatch]) + Send + 'static,
        D: FnOnce(SearchResult<Vec<SearchMatch>>) + Send + 'static,
    {
        let session = Arc::new(SearchSession::new());
        let (done_tx, done_rx) = bounded::<()>(1);
        {
            let mut slot = self.session.lock();
            if slot.as_ref().map_or(false, |s| !s.is_finished()) {
                debug!("Rejecting search: a session is already active");
                return false;
            }
            *slot = Some(session.clone());
            // Pair the completion signal with the session while the lock
            // is held; a cancel that sees this session waits on this
            // receiver, never on a receiver left by an earlier search.
            *self.in_flight.lock() = Some(done_rx);
        }

        let engine = self.clone();
        thread::spawn(move || {
            let outcome = engine.run(&request, &session, &on_progress, on_batch);
            session.mark_finished();
            let _ = done_tx.send(());
            on_done(outcome);
        });
        true
    }

    /// Requests cancellation of the active session, then waits a short,
    /// bounded time for an asynchronous search to wind down.
    ///
    /// Idempotent and safe to call when idle. A search that is still
    /// draining after [`CANCEL_WAIT`] is abandoned; it keeps its own
    /// session token, so it can never affect a later search.
    pub fn cancel(&self) {
        if let Some(session) = self.session.lock().as_ref() {
            debug!("Cancellation requested");
            session.cancel();
        }

        let in_flight = self.in_flight.lock().take();
        if let Some(done) = in_flight {
            match done.recv_timeout(CANCEL_WAIT) {
                Ok(()) => debug!("Cancelled search wound down"),
                Err(_) => warn!(
                    "Search still winding down after {:?}; abandoning it",
                    CANCEL_WAIT
                ),
            }
        }
    }

    fn run<P, B>(
        &self,
        request: &SearchRequest,
        session: &SearchSession,
        on_progress: &P,
        mut on_batch: B,
    ) -> SearchResult<Vec<SearchMatch>>
    where
        P: Fn(usize, usize, &Path) + Send + Sync,
        B: FnMut(&[SearchMatch]),
    {
        let started = Instant::now();
        info!(
            "Starting search for '{}' under {}",
            request.keyword,
            request.root_path.display()
        );

        // Validation comes before any traversal or file IO.
        if !request.root_path.is_dir() {
            return Err(SearchError::invalid_directory(&request.root_path));
        }
        if request.keyword.trim().is_empty() {
            return Err(SearchError::EmptyKeyword);
        }
        let matcher = self.pattern_cache.get_or_compile(
            &request.keyword,
            request.use_regex,
            request.case_sensitive,
            request.whole_word,
        )?;

        self.metrics.reset();
        let excludes = ExcludeMatcher::new(&request.exclude_patterns);
        let encoding = resolve_encoding(&request.file_encoding);

        let files = collect_candidates(
            &request.root_path,
            &request.file_extensions,
            &excludes,
            session,
            &self.metrics,
        );
        self.metrics.record_files_collected(files.len() as u64);
        if files.is_empty() {
            info!("No candidate files under {}", request.root_path.display());
            return Ok(Vec::new());
        }

        let worker_count = request
            .thread_count
            .map(NonZeroUsize::get)
            .unwrap_or(self.worker_count);
        let chunks = partition(&files, worker_count);
        let pool = build_pool(worker_count)?;
        let scanner = FileScanner::new(matcher, encoding, self.metrics.clone());
        let total = files.len();
        debug!("Scanning {} files across {} chunks", total, chunks.len());

        let mut results: Vec<SearchMatch> = Vec::new();
        let (tx, rx) = unbounded::<Vec<SearchMatch>>();
        let scanner = &scanner;
        let metrics = &self.metrics;
        pool.in_place_scope(|scope| {
            for &chunk in &chunks {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let scanned = catch_unwind(AssertUnwindSafe(|| {
                        scan_chunk(chunk, scanner, session, metrics, total, on_progress)
                    }));
                    let batch = match scanned {
                        Ok(batch) => batch,
                        Err(panic) => {
                            let anchor = chunk
                                .first()
                                .map(PathBuf::as_path)
                                .unwrap_or_else(|| Path::new(""));
                            metrics.record_event(
                                ScanEventKind::Chunk,
                                anchor,
                                panic_message(panic.as_ref()),
                            );
                            Vec::new()
                        }
                    };
                    let _ = tx.send(batch);
                });
            }
            drop(tx);

            // Merge chunk batches as they land. Once cancellation is
            // observed, remaining batches are discarded unseen.
            while let Ok(batch) = rx.recv() {
                if session.is_cancelled() {
                    debug!("Cancellation observed; discarding remaining batches");
                    break;
                }
                if batch.is_empty() {
                    continue;
                }
                on_batch(&batch);
                results.extend(batch);
            }
        });

        self.metrics.log_stats();
        if session.is_cancelled() {
            info!(
                "Search cancelled after {:?} with {} matches merged",
                started.elapsed(),
                results.len()
            );
        } else {
            let matched_files: HashSet<&Path> =
                results.iter().map(|m| m.file_path.as_path()).collect();
            info!(
                "Search complete. Found {} matches in {} files ({:?})",
                results.len(),
                matched_files.len(),
                started.elapsed()
            );
        }
        Ok(results)
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Scans one contiguous chunk of candidates, reporting per-file
/// progress and recovered failures along the way.
fn scan_chunk<P>(
    chunk: &[PathBuf],
    scanner: &FileScanner,
    session: &SearchSession,
    metrics: &SearchMetrics,
    total: usize,
    on_progress: &P,
) -> Vec<SearchMatch>
where
    P: Fn(usize, usize, &Path) + Send + Sync,
{
    let mut batch = Vec::new();
    for path in chunk {
        if session.is_cancelled() {
            debug!("Chunk abandoned after cancellation");
            break;
        }
        match scanner.scan_file(path, session) {
            Ok(found) => {
                metrics.record_file_scanned();
                metrics.record_matches(found.len() as u64);
                batch.extend(found);
            }
            Err(e) => {
                metrics.record_file_failed();
                metrics.record_event(ScanEventKind::Read, path, e.to_string());
            }
        }
        let completed = session.record_file_completed();
        on_progress(completed, total, path);
    }
    batch
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unidentified panic in scan worker".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write_file(root: &Path, name: &str, contents: &str) {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_missing_directory_is_rejected() {
        let engine = SearchEngine::new();
        let request = SearchRequest::new("/no/such/directory/anywhere", "x");

        match engine.search(&request) {
            Err(SearchError::InvalidDirectory(path)) => {
                assert!(path.ends_with("anywhere"));
            }
            other => panic!("expected InvalidDirectory, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_keyword_is_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = SearchEngine::new();
        let request = SearchRequest::new(dir.path(), "   ");

        assert!(matches!(
            engine.search(&request),
            Err(SearchError::EmptyKeyword)
        ));
    }

    #[test]
    fn test_invalid_regex_is_rejected_before_any_io() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.txt", "should never be read\n");
        let engine = SearchEngine::new();
        let mut request = SearchRequest::new(dir.path(), "(unclosed");
        request.use_regex = true;

        match engine.search(&request) {
            Err(SearchError::InvalidPattern { pattern, .. }) => {
                assert_eq!(pattern, "(unclosed");
            }
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
        // Collection never ran, so the counters stay at zero.
        assert_eq!(engine.metrics().stats().files_collected, 0);
    }

    #[test]
    fn test_empty_directory_yields_no_matches() {
        let dir = TempDir::new().unwrap();
        let engine = SearchEngine::new();
        let request = SearchRequest::new(dir.path(), "needle");

        let results = engine.search(&request).unwrap();
        assert!(results.is_empty());
        assert_eq!(engine.metrics().stats().files_collected, 0);
    }

    #[test]
    fn test_finds_matches_across_files() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.txt", "alpha beta\ngamma alpha\n");
        write_file(dir.path(), "b.txt", "no hits here\n");
        let engine = SearchEngine::new();

        let results = engine.search(&SearchRequest::new(dir.path(), "alpha")).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|m| m.matched_text == "alpha"));
        assert!(results.iter().all(|m| m.file_name == "a.txt"));
        let lines: HashSet<usize> = results.iter().map(|m| m.line_number).collect();
        assert_eq!(lines, HashSet::from([1, 2]));
    }

    #[test]
    fn test_batches_and_progress_cover_every_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "f1.txt", "needle\n");
        write_file(dir.path(), "f2.txt", "clean\n");
        write_file(dir.path(), "f3.txt", "a needle b\nneedle\n");
        let engine = SearchEngine::new();
        let request = SearchRequest::new(dir.path(), "needle");

        let progress: Mutex<Vec<(usize, usize)>> = Mutex::new(Vec::new());
        let mut batched = 0usize;
        let results = engine
            .search_with_callbacks(
                &request,
                |completed, total, _path| progress.lock().push((completed, total)),
                |batch| batched += batch.len(),
            )
            .unwrap();

        assert_eq!(results.len(), 3);
        // Every streamed batch ends up in the merged result set.
        assert_eq!(batched, results.len());

        let progress = progress.lock();
        assert_eq!(progress.len(), 3);
        assert!(progress.iter().all(|&(_, total)| total == 3));
        let completed: HashSet<usize> = progress.iter().map(|&(done, _)| done).collect();
        assert_eq!(completed, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn test_repeat_searches_agree_and_hit_the_cache() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.rs", "fn main() {}\n");
        write_file(dir.path(), "b.rs", "fn helper() {}\nfn main2() {}\n");
        let engine = SearchEngine::new();
        let request = SearchRequest::new(dir.path(), "fn ");

        let first: HashSet<SearchMatch> = engine.search(&request).unwrap().into_iter().collect();
        let second: HashSet<SearchMatch> = engine.search(&request).unwrap().into_iter().collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        let stats = engine.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_thread_count_override() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            write_file(dir.path(), &format!("f{}.txt", i), "needle\n");
        }
        let engine = SearchEngine::new();
        let mut request = SearchRequest::new(dir.path(), "needle");
        request.thread_count = NonZeroUsize::new(2);

        let results = engine.search(&request).unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_panicking_chunk_is_isolated() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.txt", "needle\n");
        write_file(dir.path(), "b.txt", "needle\n");
        write_file(dir.path(), "boom.txt", "needle\n");
        write_file(dir.path(), "c.txt", "needle\n");
        let engine = SearchEngine::new();
        let request = SearchRequest::new(dir.path(), "needle");

        // A progress callback that panics runs inside the chunk, so it
        // takes down exactly that chunk.
        let results = engine
            .search_with_callbacks(
                &request,
                |_, _, path: &Path| {
                    if path.ends_with("boom.txt") {
                        panic!("injected failure");
                    }
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(engine.metrics().count_events(ScanEventKind::Chunk), 1);
        let events = engine.metrics().events();
        let chunk_event = events
            .iter()
            .find(|e| e.kind == ScanEventKind::Chunk)
            .unwrap();
        assert_eq!(chunk_event.message, "injected failure");
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_recovered() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "open.txt", "needle\n");
        write_file(dir.path(), "locked.txt", "needle\n");
        let locked = dir.path().join("locked.txt");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0)).unwrap();
        if fs::read(&locked).is_ok() {
            // Privileged users bypass mode bits; nothing to verify here.
            return;
        }

        let engine = SearchEngine::new();
        let results = engine.search(&SearchRequest::new(dir.path(), "needle")).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "open.txt");
        let stats = engine.metrics().stats();
        assert_eq!(stats.files_failed, 1);
        assert_eq!(engine.metrics().count_events(ScanEventKind::Read), 1);
    }

    #[test]
    fn test_cancel_when_idle_is_a_noop() {
        let engine = SearchEngine::new();
        engine.cancel();
        engine.cancel();
        assert!(!engine.is_searching());
    }

    #[test]
    fn test_async_search_rejects_overlap_and_cancels_in_bounded_time() {
        let dir = TempDir::new().unwrap();
        for i in 0..6 {
            write_file(dir.path(), &format!("f{}.txt", i), "needle\n");
        }
        let engine = SearchEngine::new();

        let (started_tx, started_rx) = bounded::<()>(1);
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let (outcome_tx, outcome_rx) = bounded::<SearchResult<Vec<SearchMatch>>>(1);

        // The first progress call parks its worker until the test
        // releases the gate, holding the session open.
        let calls = AtomicUsize::new(0);
        let accepted = engine.search_async(
            SearchRequest::new(dir.path(), "needle"),
            move |_, _, _| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let _ = started_tx.send(());
                    let _ = gate_rx.recv_timeout(Duration::from_secs(5));
                }
            },
            |_| {},
            move |outcome| {
                let _ = outcome_tx.send(outcome);
            },
        );
        assert!(accepted);
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(engine.is_searching());

        // A second session is refused while the first is active.
        let refused = engine.search_async(
            SearchRequest::new(dir.path(), "needle"),
            |_, _, _| {},
            |_| {},
            |_| {},
        );
        assert!(!refused);

        // A separate engine instance shares nothing and runs freely.
        let other = SearchEngine::new();
        assert_eq!(other.search(&SearchRequest::new(dir.path(), "needle")).unwrap().len(), 6);

        gate_tx.send(()).unwrap();
        let before_cancel = Instant::now();
        engine.cancel();
        assert!(before_cancel.elapsed() <= CANCEL_WAIT + Duration::from_secs(1));

        let outcome = outcome_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(outcome.is_ok());
        assert!(!engine.is_searching());

        // The engine is immediately reusable.
        let results = engine.search(&SearchRequest::new(dir.path(), "needle")).unwrap();
        assert_eq!(results.len(), 6);
    }

    #[test]
    fn test_cancel_waits_on_the_search_it_cancels() {
        let dir = TempDir::new().unwrap();
        for i in 0..6 {
            write_file(dir.path(), &format!("f{}.txt", i), "needle\n");
        }
        let engine = SearchEngine::new();
        let request = SearchRequest::new(dir.path(), "needle");

        // A first search runs to completion, leaving its buffered
        // completion signal behind in the engine.
        let (first_tx, first_rx) = bounded::<()>(1);
        let accepted = engine.search_async(
            request.clone(),
            |_, _, _| {},
            |_| {},
            move |_| {
                let _ = first_tx.send(());
            },
        );
        assert!(accepted);
        first_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!engine.is_searching());

        // A second search parks one worker on a gate that outlives the
        // cancellation wait.
        let (started_tx, started_rx) = bounded::<()>(1);
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let (outcome_tx, outcome_rx) = bounded::<SearchResult<Vec<SearchMatch>>>(1);
        let calls = AtomicUsize::new(0);
        let accepted = engine.search_async(
            request,
            move |_, _, _| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let _ = started_tx.send(());
                    let _ = gate_rx.recv_timeout(Duration::from_secs(10));
                }
            },
            |_| {},
            move |outcome| {
                let _ = outcome_tx.send(outcome);
            },
        );
        assert!(accepted);
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(engine.is_searching());

        // Cancel blocks for the full bounded wait: the receiver it holds
        // belongs to the parked session, not to the finished first one.
        let before_cancel = Instant::now();
        engine.cancel();
        assert!(before_cancel.elapsed() >= CANCEL_WAIT);

        gate_tx.send(()).unwrap();
        let outcome = outcome_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(outcome.is_ok());
        assert!(!engine.is_searching());
    }
}
