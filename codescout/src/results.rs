use serde::Serialize;
use std::path::PathBuf;

/// A single pattern occurrence inside a scanned file.
///
/// One record is produced per non-overlapping match, so a line that
/// contains the keyword three times yields three records sharing the
/// same `line_number`. Within one file records appear in line order,
/// then left to right; across files the overall ordering follows chunk
/// completion and is unspecified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SearchMatch {
    /// Path of the file the match was found in, as collected
    pub file_path: PathBuf,

    /// Final component of `file_path`
    pub file_name: String,

    /// 1-based line number
    pub line_number: usize,

    /// The matched line with surrounding whitespace trimmed
    pub line_content: String,

    /// The exact matched substring, in its original case
    pub matched_text: String,
}
