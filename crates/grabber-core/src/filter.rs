//! Issue-linkage commit filter
//!
//! Only commits whose message references a tracked work item are surfaced.
//! The built-in patterns recognise `#42` style references, including the
//! cross-repository `owner/repo#42` form. Deployments tracking work elsewhere
//! (e.g. `PROJ-123` keys) supply their own patterns through configuration.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

const BUILTIN_PATTERNS: &[&str] = &[
    // "#42" not glued to a word or an HTML entity ("&#39;")
    r"(?:^|[^&\w])#\d+\b",
    // "acme/widgets#42"
    r"\b[\w.-]+/[\w.-]+#\d+\b",
];

static BUILTIN_FILTER: Lazy<CommitFilter> = Lazy::new(|| CommitFilter {
    patterns: BUILTIN_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("built-in issue pattern is valid"))
        .collect(),
});

/// Whether `message` references a tracked issue, using the built-in patterns
pub fn is_commit_issue(message: &str) -> bool {
    BUILTIN_FILTER.is_relevant(message)
}

/// Compiled issue-linkage predicate shared by all provider clients
#[derive(Debug, Clone)]
pub struct CommitFilter {
    patterns: Vec<Regex>,
}

impl Default for CommitFilter {
    fn default() -> Self {
        BUILTIN_FILTER.clone()
    }
}

impl CommitFilter {
    /// Build a filter from configured patterns, or the built-in set when none are given
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    Error::Config(format!("Invalid issue pattern {:?}: {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn is_relevant(&self, message: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(message))
    }
}
