//! Filename pattern matching.

use regex::Regex;

use crate::error::{PollerError, Result};

/// A compiled filename pattern.
///
/// Matching uses regex *search* semantics: a match anywhere in the name
/// counts. Anchor with `^`/`$` to match the whole name.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compile a pattern.
    pub fn compile(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| PollerError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    /// Check whether a file name matches.
    pub fn matches(&self, filename: &str) -> bool {
        self.regex.is_match(filename)
    }

    /// The source pattern.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}
