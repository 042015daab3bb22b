#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Category mergers.
//!
//! Each merger takes one source's typed records, resolves them to regions
//! through the [`Atlas`] indexes, and attaches metrics, totals, and
//! credits. Lookup failures and out-of-bounds values are reported to the
//! [`WarningCollector`] and the record is skipped; only structural
//! problems in the records themselves are returned as [`MergeError`].
//!
//! Mergers must run in pipeline order: later mergers read totals (such as
//! population) written by earlier ones.

pub mod covid;
pub mod hospital;
pub mod metric;
pub mod mobility;
pub mod mortality;
pub mod palette;
pub mod policy;
pub mod serology;
pub mod variant;
pub mod vaccine;
pub mod wastewater;

use std::collections::BTreeMap;

use covid_atlas_region_models::SeriesError;
use thiserror::Error;

pub use covid_atlas_region::Atlas;
pub use covid_atlas_warnings::WarningCollector;

/// Per-capita scale factors, one per normalization used by a metric name.
pub mod scale {
    /// "/ 100p"
    pub const PER_100: f64 = 1e2;
    /// "/ 5Kp"
    pub const PER_5K: f64 = 5e3;
    /// "/ 100Kp"
    pub const PER_100K: f64 = 1e5;
    /// "/ 1Mp"
    pub const PER_1M: f64 = 1e6;
    /// "/ 10Mp"
    pub const PER_10M: f64 = 1e7;
}

/// Structural failure while building a region's metrics.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A record group violated the series invariants.
    #[error("{what} for {path}: {source}")]
    Series {
        what: String,
        path: String,
        source: SeriesError,
    },
}

impl MergeError {
    /// Wraps a [`SeriesError`] with the metric and region it came from.
    pub fn series(what: impl Into<String>, path: impl Into<String>) -> impl FnOnce(SeriesError) -> Self {
        let what = what.into();
        let path = path.into();
        move |source| Self::Series { what, path, source }
    }
}

/// Groups `records` by `key`, keeping each group in input order.
pub fn group_by<'a, T, K: Ord>(
    records: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&T) -> K,
) -> BTreeMap<K, Vec<&'a T>>
where
    T: 'a,
{
    let mut groups: BTreeMap<K, Vec<&'a T>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record);
    }
    groups
}
