use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{SearchError, SearchResult};

/// Default bound on the number of cached compiled patterns
pub const PATTERN_CACHE_CAPACITY: usize = 100;

/// Strategy for pattern matching
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    Simple(String),
    Regex(Arc<Regex>),
}

/// A compiled pattern. Cheap to clone; workers share the underlying
/// regex and only read it.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    strategy: MatchStrategy,
}

/// Builds the final regex source for a keyword. Literals are escaped;
/// `whole_word` wraps boundary assertions around the literal, or around
/// the grouped raw regex so alternations stay bounded.
fn pattern_source(keyword: &str, use_regex: bool, whole_word: bool) -> String {
    let base = if use_regex {
        keyword.to_string()
    } else {
        regex::escape(keyword)
    };
    if !whole_word {
        return base;
    }
    if use_regex {
        format!(r"\b(?:{})\b", base)
    } else {
        format!(r"\b{}\b", base)
    }
}

impl PatternMatcher {
    /// Compiles a keyword into a matcher.
    ///
    /// Case-insensitivity is applied as a compile flag; the searched
    /// text is never transformed, so reported match ranges always slice
    /// the original line. A plain case-sensitive literal skips regex
    /// compilation entirely and uses substring search.
    pub fn compile(
        keyword: &str,
        use_regex: bool,
        case_sensitive: bool,
        whole_word: bool,
    ) -> SearchResult<Self> {
        if !use_regex && !whole_word && case_sensitive {
            return Ok(Self {
                strategy: MatchStrategy::Simple(keyword.to_string()),
            });
        }

        let source = pattern_source(keyword, use_regex, whole_word);
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| SearchError::invalid_pattern(keyword, e))?;
        debug!("Compiled pattern '{}' from keyword '{}'", source, keyword);

        Ok(Self {
            strategy: MatchStrategy::Regex(Arc::new(regex)),
        })
    }

    /// Finds all non-overlapping matches in `text` as byte ranges,
    /// left to right
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.strategy {
            MatchStrategy::Simple(pattern) => text
                .match_indices(pattern.as_str())
                .map(|(start, matched)| (start, start + matched.len()))
                .collect(),
            MatchStrategy::Regex(regex) => {
                regex.find_iter(text).map(|m| (m.start(), m.end())).collect()
            }
        }
    }
}

/// Cache key: the final pattern source plus the case flag, so a literal
/// `a.b` and the regex `a\.b` share one entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PatternKey {
    source: String,
    case_insensitive: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<PatternKey, PatternMatcher>,
    insertion_order: VecDeque<PatternKey>,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// Bounded, instance-owned cache of compiled patterns.
///
/// Each engine owns one of these; nothing is process-global. When the
/// cache is full, the oldest-inserted entry is evicted in constant
/// time. That is an insertion-order approximation of LRU, not true
/// LRU: lookups do not refresh an entry's age.
#[derive(Debug)]
pub struct PatternCache {
    state: Mutex<CacheState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::with_capacity(PATTERN_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the cached matcher for this keyword and flag set,
    /// compiling and inserting it on a miss.
    pub fn get_or_compile(
        &self,
        keyword: &str,
        use_regex: bool,
        case_sensitive: bool,
        whole_word: bool,
    ) -> SearchResult<PatternMatcher> {
        let key = PatternKey {
            source: pattern_source(keyword, use_regex, whole_word),
            case_insensitive: !case_sensitive,
        };

        {
            let state = self.state.lock();
            if let Some(matcher) = state.entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(matcher.clone());
            }
        }

        // Compile outside the lock; only bookkeeping is guarded.
        let matcher = PatternMatcher::compile(keyword, use_regex, case_sensitive, whole_word)?;
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        if state.entries.len() >= self.capacity && !state.entries.contains_key(&key) {
            if let Some(oldest) = state.insertion_order.pop_front() {
                state.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        if state.entries.insert(key.clone(), matcher.clone()).is_none() {
            state.insertion_order.push_back(key);
        }
        Ok(matcher)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Drops every cached pattern. Hit and miss counters keep
    /// accumulating across clears.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.insertion_order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}
