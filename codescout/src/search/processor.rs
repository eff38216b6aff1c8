use encoding_rs::Encoding;
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{trace, warn};

use super::matcher::PatternMatcher;
use super::SearchSession;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::{ScanEventKind, SearchMetrics};
use crate::results::SearchMatch;

// Constants for file scanning
const BUFFER_CAPACITY: usize = 65536;
const SMALL_FILE_THRESHOLD: u64 = 32 * 1024; // 32KB
const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Scans candidate files against one compiled pattern. Shared by all
/// workers of a session; holds no per-file state.
#[derive(Debug)]
pub struct FileScanner {
    matcher: PatternMatcher,
    encoding: &'static Encoding,
    metrics: SearchMetrics,
}

impl FileScanner {
    pub fn new(matcher: PatternMatcher, encoding: &'static Encoding, metrics: SearchMetrics) -> Self {
        Self {
            matcher,
            encoding,
            metrics,
        }
    }

    /// Scans one file, choosing the read strategy by file size, and
    /// returns every match in line order.
    pub fn scan_file(&self, path: &Path, session: &SearchSession) -> SearchResult<Vec<SearchMatch>> {
        trace!("Scanning file: {}", path.display());

        match path.metadata() {
            Ok(metadata) => {
                let size = metadata.len();
                if size < SMALL_FILE_THRESHOLD {
                    let bytes = std::fs::read(path).map_err(|e| SearchError::from_io(path, e))?;
                    self.scan_bytes(path, &bytes, session)
                } else if size >= LARGE_FILE_THRESHOLD {
                    self.scan_mapped(path, session)
                } else {
                    self.scan_buffered(path, session)
                }
            }
            Err(e) => {
                warn!("Failed to get metadata for {}: {}", path.display(), e);
                self.scan_buffered(path, session)
            }
        }
    }

    fn scan_buffered(&self, path: &Path, session: &SearchSession) -> SearchResult<Vec<SearchMatch>> {
        let file = File::open(path).map_err(|e| SearchError::from_io(path, e))?;
        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(SearchError::IoError)?;
        self.scan_bytes(path, &bytes, session)
    }

    fn scan_mapped(&self, path: &Path, session: &SearchSession) -> SearchResult<Vec<SearchMatch>> {
        let file = File::open(path).map_err(|e| SearchError::from_io(path, e))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(SearchError::IoError)?;
        self.scan_bytes(path, &mmap, session)
    }

    /// Decodes the bytes with the session's encoding. Malformed
    /// sequences are replaced rather than fatal; a replacement is
    /// recorded as a `Decode` event and scanning continues.
    fn decode<'a>(&self, path: &Path, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, _, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            self.metrics.record_event(
                ScanEventKind::Decode,
                path,
                format!("Malformed {} bytes were replaced", self.encoding.name()),
            );
        }
        text
    }

    fn scan_bytes(
        &self,
        path: &Path,
        bytes: &[u8],
        session: &SearchSession,
    ) -> SearchResult<Vec<SearchMatch>> {
        let text = self.decode(path, bytes);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut matches = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if session.is_cancelled() {
                break;
            }
            for (start, end) in self.matcher.find_matches(line) {
                matches.push(SearchMatch {
                    file_path: path.to_path_buf(),
                    file_name: file_name.clone(),
                    line_number: index + 1,
                    line_content: line.trim().to_string(),
                    matched_text: line[start..end].to_string(),
                });
            }
        }
        Ok(matches)
    }
}
