//! File filtering: exclusion patterns and extension checks.
//!
//! Exclusion strings arrive in whatever dialect the user thought in, so
//! each one is compiled through a three-tier fallback, in order:
//!
//! 1. as a regular expression (case-insensitive);
//! 2. if that fails to parse, as a glob where `*` also crosses path
//!    separators, so `*/target/*` excludes everything under any
//!    `target/` directory;
//! 3. if that fails too, as a literal substring.
//!
//! A rule matches when it hits either the full path string or the bare
//! file name, and the same matcher is applied both to directories while
//! walking (pruning whole subtrees) and to candidate files.

use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
enum ExcludeRule {
    Regex(Regex),
    Glob(Pattern),
}

fn glob_options() -> MatchOptions {
    let mut options = MatchOptions::new();
    options.case_sensitive = false;
    // A single `*` may span directory separators, like the original
    // patterns expect.
    options.require_literal_separator = false;
    options
}

impl ExcludeRule {
    fn compile(raw: &str) -> Option<Self> {
        if let Ok(regex) = RegexBuilder::new(raw).case_insensitive(true).build() {
            return Some(Self::Regex(regex));
        }
        if let Ok(pattern) = Pattern::new(raw) {
            return Some(Self::Glob(pattern));
        }
        match RegexBuilder::new(&regex::escape(raw))
            .case_insensitive(true)
            .build()
        {
            Ok(regex) => Some(Self::Regex(regex)),
            Err(e) => {
                warn!("Dropping unusable exclusion pattern '{}': {}", raw, e);
                None
            }
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(text),
            Self::Glob(pattern) => pattern.matches_with(text, glob_options()),
        }
    }
}

/// Compiled exclusion rules for one search. Construction never fails:
/// a string that parses as neither regex nor glob becomes a literal.
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    rules: Vec<ExcludeRule>,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let rules: Vec<ExcludeRule> = patterns
            .iter()
            .filter_map(|raw| ExcludeRule::compile(raw))
            .collect();
        debug!("Compiled {} exclusion rules", rules.len());
        Self { rules }
    }

    /// True when any rule matches the full path or the file name
    pub fn should_skip(&self, path: &Path) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let full_path = path.to_string_lossy().replace('\\', "/");
        let file_name = path.file_name().map(|n| n.to_string_lossy());

        self.rules.iter().any(|rule| {
            rule.matches(&full_path)
                || file_name
                    .as_deref()
                    .map_or(false, |name| rule.matches(name))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Checks a candidate's file name against the allowed suffixes. The
/// entries carry their dot (".java"); the comparison is a plain suffix
/// match, so ".java" admits `Foo.java` but not `Foo.javax`. An empty
/// list admits every file.
pub fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => extensions.iter().any(|ext| name.ends_with(ext.as_str())),
        None => false,
    }
}

/// Determines if a file should be collected for scanning
pub fn should_include_file(path: &Path, extensions: &[String], excludes: &ExcludeMatcher) -> bool {
    has_allowed_extension(path, extensions) && !excludes.should_skip(path)
}
