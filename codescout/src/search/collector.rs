use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::SearchSession;
use crate::filters::{should_include_file, ExcludeMatcher};
use crate::metrics::{ScanEventKind, SearchMetrics};

/// Walks `root` and returns every candidate file, in traversal order.
///
/// Hidden entries are visited and no gitignore semantics apply; which
/// files qualify is governed entirely by the request's extension and
/// exclusion lists. Excluded directories are pruned, so their subtrees
/// are never descended into; the root itself is exempt from exclusion.
/// Directory entries that cannot be visited become `Traversal` scan
/// events. Cancellation stops the walk early and returns whatever was
/// collected so far.
pub fn collect_candidates(
    root: &Path,
    extensions: &[String],
    excludes: &ExcludeMatcher,
    session: &SearchSession,
    metrics: &SearchMetrics,
) -> Vec<PathBuf> {
    let pruner = excludes.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
            !(is_dir && pruner.should_skip(entry.path()))
        })
        .build();

    let mut files = Vec::new();
    for result in walker {
        if session.is_cancelled() {
            debug!("Collection cancelled after {} files", files.len());
            break;
        }
        match result {
            Ok(entry) => {
                let is_file = entry.file_type().map_or(false, |t| t.is_file());
                if is_file && should_include_file(entry.path(), extensions, excludes) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                metrics.record_event(ScanEventKind::Traversal, root, e.to_string());
            }
        }
    }

    debug!("Collected {} candidate files under {}", files.len(), root.display());
    files
}
