pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod results;
pub mod search;

pub use config::SearchRequest;
pub use errors::{SearchError, SearchResult};
pub use metrics::{ScanEvent, ScanEventKind, SearchMetrics, SearchStats};
pub use results::SearchMatch;
pub use search::{CacheStats, SearchEngine};
