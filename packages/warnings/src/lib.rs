#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data-quality warning collection.
//!
//! Mergers and the roll-up report recoverable problems as [`Anomaly`]
//! values into a [`WarningCollector`]. Anomalies matching the
//! [`AllowList`] are logged and tolerated; the rest are kept and make
//! [`WarningCollector::finish`] fail once every stage has run, so a single
//! run surfaces every new problem at once.

mod allow_list;
mod anomaly;

pub use allow_list::{AllowList, AllowListError};
pub use anomaly::Anomaly;
use thiserror::Error;

/// Failure raised when unrecognized anomalies remain at scope exit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} warnings found combining data", .messages.len())]
pub struct UnrecognizedWarnings {
    /// Text of every unrecognized anomaly, in the order reported.
    pub messages: Vec<String>,
}

/// Accumulates anomalies and classifies them against an [`AllowList`].
#[derive(Debug, Default)]
pub struct WarningCollector {
    allow: AllowList,
    known: Vec<String>,
    unknown: Vec<String>,
}

impl WarningCollector {
    /// Creates a collector that tolerates what `allow` matches.
    #[must_use]
    pub const fn new(allow: AllowList) -> Self {
        Self {
            allow,
            known: Vec::new(),
            unknown: Vec::new(),
        }
    }

    /// Records an anomaly.
    pub fn warn(&mut self, anomaly: &Anomaly) {
        self.warn_text(anomaly.to_string());
    }

    /// Records a free-form warning.
    pub fn warn_text(&mut self, text: impl Into<String>) {
        let text = text.into().trim().to_string();
        if self.allow.allows(&text) {
            log::info!("Known anomaly: {text}");
            self.known.push(text);
        } else {
            log::warn!("{text}");
            self.unknown.push(text);
        }
    }

    /// Records the error of a failed lookup and discards the value.
    pub fn check<T>(&mut self, result: Result<T, Anomaly>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(anomaly) => {
                self.warn(&anomaly);
                None
            }
        }
    }

    /// Tolerated warnings so far.
    #[must_use]
    pub fn known(&self) -> &[String] {
        &self.known
    }

    /// Unrecognized warnings so far.
    #[must_use]
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    /// Whether no unrecognized warning has been reported.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty()
    }

    /// Closes the scope, returning the tolerated warnings.
    ///
    /// # Errors
    ///
    /// Returns [`UnrecognizedWarnings`] listing every unrecognized warning
    /// if there was at least one.
    pub fn finish(self) -> Result<Vec<String>, UnrecognizedWarnings> {
        if self.unknown.is_empty() {
            Ok(self.known)
        } else {
            for text in &self.unknown {
                log::error!("Unrecognized anomaly: {text}");
            }
            Err(UnrecognizedWarnings {
                messages: self.unknown,
            })
        }
    }
}

/// Runs `f` with a fresh collector and fails if it reported anything
/// `allow` does not match.
///
/// Errors returned by `f` itself are passed through unchanged, so a
/// structural failure wins over collected warnings.
///
/// # Errors
///
/// Returns the error from `f`, or [`UnrecognizedWarnings`] converted into
/// `E` if unrecognized anomalies were collected.
pub fn collecting_warnings<T, E, F>(allow: AllowList, f: F) -> Result<T, E>
where
    F: FnOnce(&mut WarningCollector) -> Result<T, E>,
    E: From<UnrecognizedWarnings>,
{
    let mut collector = WarningCollector::new(allow);
    let value = f(&mut collector)?;
    collector.finish()?;
    Ok(value)
}
