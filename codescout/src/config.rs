use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::warn;

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Describes one search invocation. Every field is consumed at call
/// time; the engine owns no persisted configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Directory the search starts from; must exist and be a directory
    pub root_path: PathBuf,

    /// Literal text or regular-expression source to look for
    pub keyword: String,

    /// Treat `keyword` as a regular expression instead of a literal
    #[serde(default)]
    pub use_regex: bool,

    /// When false, matching is case-insensitive via a matcher flag;
    /// the searched text is never transformed
    #[serde(default)]
    pub case_sensitive: bool,

    /// Require word boundaries on both sides of the match
    #[serde(default)]
    pub whole_word: bool,

    /// Dot-prefixed name suffixes (e.g. ".java") a candidate file must
    /// end with; an empty list admits every file
    #[serde(default)]
    pub file_extensions: Vec<String>,

    /// Exclusion patterns (regex, glob, or literal), applied to full
    /// paths and file names, in order
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Encoding label used to decode file contents, e.g. "utf-8" or
    /// "euc-kr"; unknown labels fall back to UTF-8
    #[serde(default = "default_encoding")]
    pub file_encoding: String,

    /// Worker-count override for this request; `None` uses the
    /// engine's default
    #[serde(default)]
    pub thread_count: Option<NonZeroUsize>,
}

impl SearchRequest {
    /// Creates a request with literal, case-insensitive matching and no
    /// extension or exclusion filtering.
    pub fn new(root: impl Into<PathBuf>, keyword: impl Into<String>) -> Self {
        Self {
            root_path: root.into(),
            keyword: keyword.into(),
            use_regex: false,
            case_sensitive: false,
            whole_word: false,
            file_extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            file_encoding: default_encoding(),
            thread_count: None,
        }
    }
}

/// Resolves an encoding label to a concrete encoding. Unknown labels
/// are not an error: the search proceeds in UTF-8 with a warning.
pub fn resolve_encoding(label: &str) -> &'static Encoding {
    match Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => encoding,
        None => {
            warn!("Unknown encoding label '{}', falling back to UTF-8", label);
            encoding_rs::UTF_8
        }
    }
}
