//! Data-quality anomaly taxonomy.
//!
//! Every recoverable problem found while merging or rolling up data is an
//! [`Anomaly`]. Its [`Display`](std::fmt::Display) text is what the
//! allow-list matches against, so each message names the region path or
//! identifier involved along with the numbers needed to triage it.

use thiserror::Error;

/// A recoverable data-quality problem.
///
/// Anomalies never abort the pipeline. The offending record or region is
/// skipped and the anomaly is handed to a
/// [`WarningCollector`](crate::WarningCollector).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Anomaly {
    /// A region has population but no headline case data.
    #[error("No COVID metrics: {path}")]
    NoCovidMetrics { path: String },

    /// Subregion populations add up to more than the region's.
    #[error("Overpopulation: {path} has {pop:.0}p, {parts:.0}p in parts")]
    Overpopulation { path: String, pop: f64, parts: f64 },

    /// Subregion populations cover too little of the region's.
    #[error("Underpopulation: {path} has {pop:.0}p, {parts:.0}p in parts")]
    Underpopulation { path: String, pop: f64, parts: f64 },

    /// A source table had an entry for a region but no rows.
    #[error("No {source_name} data: {path}")]
    NoData { source_name: String, path: String },

    /// A matched region has no usable population.
    #[error("No population: {path} (pop={pop})")]
    NoPopulation { path: String, pop: f64 },

    /// A reported count falls outside its sanity bound.
    #[error("Bad {what}: {path} ({value}/{pop}p)")]
    OutOfBounds {
        what: String,
        path: String,
        value: f64,
        pop: f64,
    },

    /// A well-formed identifier has no region in the atlas.
    #[error("Missing {what}: {key}")]
    MissingRegion { what: String, key: String },

    /// An identifier could not be interpreted at all.
    #[error("Unknown {what}: {key}")]
    UnknownIdentifier { what: String, key: String },

    /// The same key was claimed by two regions in one index.
    #[error("Duplicate {index} key {key}: kept {kept}, ignored {ignored}")]
    DuplicateIndexKey {
        index: String,
        key: String,
        kept: String,
        ignored: String,
    },

    /// A variant table listed the same variant twice for one region.
    #[error("Duplicate covariant ({path}): {variant}")]
    DuplicateVariant { path: String, variant: String },

    /// A variant series does not line up with its totals.
    #[error("Bad covariant data ({path}): len totals={totals} len data={data}")]
    BadVariantData {
        path: String,
        totals: usize,
        data: usize,
    },

    /// Two samples for one site share a date.
    #[error("Duplicate {source_name} wastewater data: ({site}) {date}")]
    DuplicateSample {
        source_name: String,
        site: String,
        date: String,
    },
}

impl Anomaly {
    /// Shorthand for [`Anomaly::MissingRegion`].
    #[must_use]
    pub fn missing(what: impl Into<String>, key: impl ToString) -> Self {
        Self::MissingRegion {
            what: what.into(),
            key: key.to_string(),
        }
    }

    /// Shorthand for [`Anomaly::UnknownIdentifier`].
    #[must_use]
    pub fn unknown(what: impl Into<String>, key: impl ToString) -> Self {
        Self::UnknownIdentifier {
            what: what.into(),
            key: key.to_string(),
        }
    }

    /// Shorthand for [`Anomaly::OutOfBounds`].
    #[must_use]
    pub fn out_of_bounds(what: impl Into<String>, path: impl Into<String>, value: f64, pop: f64) -> Self {
        Self::OutOfBounds {
            what: what.into(),
            path: path.into(),
            value,
            pop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_messages_round_to_whole_people() {
        let a = Anomaly::Underpopulation {
            path: "World/FR".into(),
            pop: 67_000_000.4,
            parts: 65_000_000.0,
        };
        assert_eq!(
            a.to_string(),
            "Underpopulation: World/FR has 67000000p, 65000000p in parts"
        );
    }

    #[test]
    fn bounds_message_carries_value_and_population() {
        let a = Anomaly::out_of_bounds("deaths", "World/AU", -3.0, 25_000_000.0);
        assert_eq!(a.to_string(), "Bad deaths: World/AU (-3/25000000p)");
    }

    #[test]
    fn lookup_messages() {
        assert_eq!(
            Anomaly::missing("CDC vax FIPS", 66010).to_string(),
            "Missing CDC vax FIPS: 66010"
        );
        assert_eq!(
            Anomaly::unknown("OWID vax state", "Dept of Defense").to_string(),
            "Unknown OWID vax state: Dept of Defense"
        );
    }
}
