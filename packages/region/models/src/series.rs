//! Date-indexed numeric series backing every [`Metric`](crate::Metric).
//!
//! A [`Series`] is a strictly increasing sequence of dated [`Sample`]s.
//! Each sample carries a (possibly smoothed) `value` and an optional `raw`
//! reading. Missing readings are `None` rather than NaN so that "no data"
//! is visible in the type.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One dated observation in a [`Series`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Calendar date of the observation.
    pub date: NaiveDate,
    /// Displayed value (smoothed for flow metrics).
    pub value: Option<f64>,
    /// Unsmoothed reading, when the metric keeps one.
    pub raw: Option<f64>,
}

impl Sample {
    /// Creates a sample with a value and no raw reading.
    #[must_use]
    pub const fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self {
            date,
            value,
            raw: None,
        }
    }
}

/// Error returned when samples violate the series ordering invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesError {
    /// Two samples share the same date.
    DuplicateDate(NaiveDate),
    /// The value and raw columns have different lengths.
    LengthMismatch {
        /// Number of values supplied.
        values: usize,
        /// Number of raw readings supplied.
        raw: usize,
    },
}

impl std::fmt::Display for SeriesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateDate(date) => write!(f, "duplicate series date {date}"),
            Self::LengthMismatch { values, raw } => {
                write!(f, "series has {values} values but {raw} raw readings")
            }
        }
    }
}

impl std::error::Error for SeriesError {}

/// A strictly date-increasing time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Builds a series from samples in any order.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DuplicateDate`] if two samples share a date.
    pub fn from_samples(mut samples: Vec<Sample>) -> Result<Self, SeriesError> {
        samples.sort_by_key(|s| s.date);
        if let Some(dup) = samples.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(SeriesError::DuplicateDate(dup[0].date));
        }
        Ok(Self { samples })
    }

    /// Builds a value-only series from `(date, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DuplicateDate`] if two points share a date.
    pub fn from_values(
        points: impl IntoIterator<Item = (NaiveDate, Option<f64>)>,
    ) -> Result<Self, SeriesError> {
        Self::from_samples(
            points
                .into_iter()
                .map(|(date, value)| Sample::new(date, value))
                .collect(),
        )
    }

    /// All samples, in date order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples (including those with missing values).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series has no samples at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Dates of all samples, in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.samples.iter().map(|s| s.date)
    }

    /// Date of the first sample.
    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.samples.first().map(|s| s.date)
    }

    /// Date of the last sample, whether or not it has a value.
    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.samples.last().map(|s| s.date)
    }

    /// Number of samples with a non-missing value.
    #[must_use]
    pub fn count(&self) -> usize {
        self.samples.iter().filter(|s| s.value.is_some()).count()
    }

    /// The last sample that has a value.
    #[must_use]
    pub fn last_valid(&self) -> Option<(NaiveDate, f64)> {
        self.samples
            .iter()
            .rev()
            .find_map(|s| s.value.map(|v| (s.date, v)))
    }

    /// Whether any sample keeps a raw reading.
    #[must_use]
    pub fn has_raw(&self) -> bool {
        self.samples.iter().any(|s| s.raw.is_some())
    }

    /// Returns the samples dated on or before `end`.
    #[must_use]
    pub fn truncated(&self, end: NaiveDate) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .take_while(|s| s.date <= end)
                .copied()
                .collect(),
        }
    }

    /// Multiplies both value and raw readings by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .map(|s| Sample {
                    date: s.date,
                    value: s.value.map(|v| v * factor),
                    raw: s.raw.map(|r| r * factor),
                })
                .collect(),
        }
    }

    /// Drops every raw reading.
    #[must_use]
    pub fn without_raw(mut self) -> Self {
        for sample in &mut self.samples {
            sample.raw = None;
        }
        self
    }

    /// Adds two series over the union of their dates.
    ///
    /// Where only one side has a reading the other counts as zero; where
    /// neither does the result stays missing.
    #[must_use]
    pub fn add_filled(&self, other: &Self) -> Self {
        fn add(a: Option<f64>, b: Option<f64>) -> Option<f64> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
            }
        }

        let mut out = Vec::with_capacity(self.samples.len().max(other.samples.len()));
        let (mut i, mut j) = (0, 0);
        while i < self.samples.len() || j < other.samples.len() {
            let a = self.samples.get(i);
            let b = other.samples.get(j);
            let sample = match (a, b) {
                (Some(a), Some(b)) if a.date == b.date => {
                    i += 1;
                    j += 1;
                    Sample {
                        date: a.date,
                        value: add(a.value, b.value),
                        raw: add(a.raw, b.raw),
                    }
                }
                (Some(a), Some(b)) if a.date < b.date => {
                    i += 1;
                    *a
                }
                (Some(a), None) => {
                    i += 1;
                    *a
                }
                (_, Some(b)) => {
                    j += 1;
                    *b
                }
                (None, None) => break,
            };
            out.push(sample);
        }
        Self { samples: out }
    }

    /// Linearly interpolates the value at `date`.
    ///
    /// Dates before the first sample take the first value and dates after
    /// the last sample take the last value. A missing value on either side
    /// of the bracketing interval yields `None`.
    #[must_use]
    pub fn interpolate(&self, date: NaiveDate) -> Option<f64> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        if date <= first.date {
            return first.value;
        }
        if date >= last.date {
            return last.value;
        }

        let after = self.samples.partition_point(|s| s.date < date);
        let hi = self.samples[after];
        if hi.date == date {
            return hi.value;
        }
        let lo = self.samples[after - 1];
        let (lo_v, hi_v) = (lo.value?, hi.value?);

        #[allow(clippy::cast_precision_loss)]
        let frac = (date - lo.date).num_days() as f64 / (hi.date - lo.date).num_days() as f64;
        Some(lo_v + (hi_v - lo_v) * frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, day).unwrap()
    }

    #[test]
    fn sorts_samples_and_rejects_duplicates() {
        let s = Series::from_values([(d(3), Some(3.0)), (d(1), Some(1.0))]).unwrap();
        assert_eq!(s.first_date(), Some(d(1)));
        assert_eq!(s.last_date(), Some(d(3)));

        let err = Series::from_values([(d(2), Some(1.0)), (d(2), Some(2.0))]).unwrap_err();
        assert_eq!(err, SeriesError::DuplicateDate(d(2)));
    }

    #[test]
    fn counts_only_present_values() {
        let s = Series::from_values([(d(1), None), (d(2), Some(5.0)), (d(3), None)]).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.count(), 1);
        assert_eq!(s.last_valid(), Some((d(2), 5.0)));
    }

    #[test]
    fn add_filled_treats_one_sided_gaps_as_zero() {
        let a = Series::from_values([(d(1), Some(1.0)), (d(2), None), (d(3), None)]).unwrap();
        let b = Series::from_values([(d(2), Some(2.0)), (d(3), None), (d(4), Some(4.0))]).unwrap();
        let sum = a.add_filled(&b);
        let values: Vec<_> = sum.samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![Some(1.0), Some(2.0), None, Some(4.0)]);
    }

    #[test]
    fn truncates_through_end_date() {
        let s = Series::from_values((1..=5).map(|i| (d(i), Some(f64::from(i))))).unwrap();
        let t = s.truncated(d(3));
        assert_eq!(t.len(), 3);
        assert_eq!(t.last_date(), Some(d(3)));
    }

    #[test]
    fn interpolates_between_and_clamps_outside() {
        let s = Series::from_values([(d(1), Some(0.0)), (d(5), Some(8.0))]).unwrap();
        assert!((s.interpolate(d(2)).unwrap() - 2.0).abs() < 1e-9);
        assert!((s.interpolate(d(9)).unwrap() - 8.0).abs() < 1e-9);
        assert!((s.interpolate(NaiveDate::from_ymd_opt(2021, 2, 1).unwrap()).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn interpolation_next_to_missing_value_is_missing() {
        let s = Series::from_values([(d(1), None), (d(3), Some(3.0))]).unwrap();
        assert_eq!(s.interpolate(d(2)), None);
        assert_eq!(s.interpolate(d(3)), Some(3.0));
    }
}
