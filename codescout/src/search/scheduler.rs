use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::PathBuf;
use tracing::debug;

use crate::errors::{SearchError, SearchResult};

/// Upper bound on the computed default worker count
const MAX_DEFAULT_WORKERS: usize = 8;

/// Default worker count: `min(8, available parallelism + 4)`, sized
/// for I/O-bound scanning
pub fn default_worker_count() -> usize {
    MAX_DEFAULT_WORKERS.min(num_cpus::get() + 4)
}

/// Splits the candidate list into contiguous chunks of roughly equal
/// size: `len / workers` files per chunk, or one file per chunk when
/// there are fewer files than workers. Order within and across chunks
/// follows the input.
pub fn partition(files: &[PathBuf], worker_count: usize) -> Vec<&[PathBuf]> {
    if files.is_empty() {
        return Vec::new();
    }
    let chunk_size = (files.len() / worker_count.max(1)).max(1);
    let chunks: Vec<&[PathBuf]> = files.chunks(chunk_size).collect();
    debug!(
        "Partitioned {} files into {} chunks of up to {}",
        files.len(),
        chunks.len(),
        chunk_size
    );
    chunks
}

/// Builds the dedicated worker pool for one search session
pub fn build_pool(worker_count: usize) -> SearchResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()
        .map_err(|e| SearchError::worker_pool(e.to_string()))
}
