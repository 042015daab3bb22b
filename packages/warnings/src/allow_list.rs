//! Known-issue allow-list.
//!
//! Patterns live in `known_warnings.toml`, which is embedded at compile
//! time. A pattern matches only when it covers the whole warning text.

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Allow-list TOML embedded at compile time.
const KNOWN_WARNINGS_TOML: &str = include_str!("../known_warnings.toml");

/// Errors from loading an allow-list.
#[derive(Debug, Error)]
pub enum AllowListError {
    /// The TOML document could not be parsed.
    #[error("Allow-list TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A pattern is not a valid regular expression.
    #[error("Invalid allow-list pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Deserialize)]
struct AllowListFile {
    #[serde(default)]
    known: Vec<String>,
}

/// Set of full-match patterns for tolerated warnings.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    patterns: Vec<Regex>,
}

impl AllowList {
    /// An allow-list that tolerates nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// The embedded list of known anomalies.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (a compile-time guarantee
    /// since the file is checked in and covered by tests).
    #[must_use]
    pub fn known() -> Self {
        Self::from_toml(KNOWN_WARNINGS_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse known_warnings.toml: {e}"))
    }

    /// Parses a TOML document with a top-level `known` array of patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AllowListError`] if the TOML is malformed or a pattern is
    /// not a valid regex.
    pub fn from_toml(text: &str) -> Result<Self, AllowListError> {
        let file: AllowListFile = toml::from_str(text)?;
        Self::from_patterns(file.known)
    }

    /// Compiles a list of patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AllowListError::Pattern`] for the first invalid pattern.
    pub fn from_patterns<S: AsRef<str>>(
        patterns: impl IntoIterator<Item = S>,
    ) -> Result<Self, AllowListError> {
        let mut list = Self::empty();
        for pattern in patterns {
            list.push(pattern.as_ref())?;
        }
        Ok(list)
    }

    /// Adds one pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AllowListError::Pattern`] if the pattern is invalid.
    pub fn push(&mut self, pattern: &str) -> Result<(), AllowListError> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored).map_err(|source| AllowListError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.patterns.push(regex);
        Ok(())
    }

    /// Appends every pattern of `other`.
    pub fn extend(&mut self, other: Self) {
        self.patterns.extend(other.patterns);
    }

    /// Number of patterns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the list has no patterns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether some pattern matches all of `text`.
    #[must_use]
    pub fn allows(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}
