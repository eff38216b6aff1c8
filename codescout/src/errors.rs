//! Error types shared across the search pipeline.
//!
//! Only request validation and worker-pool construction abort a search.
//! Per-file failures (unreadable file, undecodable bytes) are recovered
//! by the coordinator: they are logged, recorded as scan events, and the
//! affected file simply contributes no matches. Cancellation is not an
//! error either; a cancelled search returns its partial results.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search root is not a directory: {0}")]
    InvalidDirectory(PathBuf),
    #[error("Search keyword is empty")]
    EmptyKeyword,
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SearchError {
    pub fn invalid_directory(path: impl Into<PathBuf>) -> Self {
        Self::InvalidDirectory(path.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn worker_pool(msg: impl Into<String>) -> Self {
        Self::WorkerPool(msg.into())
    }

    /// Classifies a raw IO error against the path it came from, so
    /// missing files and permission problems keep their path context.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            _ => Self::IoError(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let path = Path::new("test.txt");
        let err = SearchError::file_not_found(path);
        assert!(matches!(err, SearchError::FileNotFound(_)));

        let err = SearchError::permission_denied(path);
        assert!(matches!(err, SearchError::PermissionDenied(_)));

        let err = SearchError::invalid_directory("/no/such/dir");
        assert!(matches!(err, SearchError::InvalidDirectory(_)));

        let err = SearchError::worker_pool("spawn failed");
        assert!(matches!(err, SearchError::WorkerPool(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = SearchError::file_not_found("test.txt");
        assert_eq!(err.to_string(), "File not found: test.txt");

        let err = SearchError::invalid_directory("missing");
        assert_eq!(err.to_string(), "Search root is not a directory: missing");

        assert_eq!(SearchError::EmptyKeyword.to_string(), "Search keyword is empty");

        let bad = regex::Regex::new("[").unwrap_err();
        let err = SearchError::invalid_pattern("[", bad);
        assert!(err.to_string().starts_with("Invalid pattern '['"));
    }

    #[test]
    fn test_io_error_classification() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            SearchError::from_io("a.txt", not_found),
            SearchError::FileNotFound(_)
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        assert!(matches!(
            SearchError::from_io("a.txt", denied),
            SearchError::PermissionDenied(_)
        ));

        let other = std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr");
        assert!(matches!(
            SearchError::from_io("a.txt", other),
            SearchError::IoError(_)
        ));
    }
}
