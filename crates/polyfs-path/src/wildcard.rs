//! Name-glob predicate used to filter directory listings.

use glob::{MatchOptions, Pattern};
use thiserror::Error;

/// Invalid wildcard pattern.
#[derive(Debug, Error)]
#[error("invalid wildcard {pattern:?}: {reason}")]
pub struct WildcardError {
    pub pattern: String,
    pub reason: String,
}

/// A compiled shell-style wildcard (`*`, `?`, `[...]`) matched against
/// single names, never against full paths.
#[derive(Debug, Clone)]
pub struct Wildcard {
    pattern: Pattern,
}

impl Wildcard {
    /// Compile a wildcard pattern.
    pub fn new(pattern: &str) -> Result<Self, WildcardError> {
        let compiled = Pattern::new(pattern).map_err(|e| WildcardError {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })?;
        Ok(Self { pattern: compiled })
    }

    /// Returns true if `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.pattern.matches_with(name, options)
    }

    /// The source pattern.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}
