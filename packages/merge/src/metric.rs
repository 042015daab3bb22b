//! Series preparation shared by the mergers.
//!
//! Level metrics (occupancy, percent vaccinated) are stored as-is. Flow
//! metrics (new cases per day) keep the unsmoothed reading as `raw` and a
//! trailing rolling mean as `value`; cumulative counts are differenced
//! into flows first.

use chrono::NaiveDate;
use covid_atlas_region_models::{Credits, Metric, Sample, Series, SeriesError};

/// Width of the trailing smoothing window, in samples.
pub const SMOOTHING_WINDOW: usize = 7;

/// Smoothing always covers at least this many trailing samples.
pub const MIN_SMOOTHED_SAMPLES: usize = 14;

/// A dated column of optional readings.
pub type Column = Vec<(NaiveDate, Option<f64>)>;

/// Display attributes of a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub color: &'static str,
    pub emphasis: i32,
    pub order: f64,
}

/// Shorthand for a [`Style`].
#[must_use]
pub const fn style(color: &'static str, emphasis: i32, order: f64) -> Style {
    Style {
        color,
        emphasis,
        order,
    }
}

impl Style {
    /// Wraps `series` into a credited metric.
    #[must_use]
    pub fn metric(self, series: Series, credits: &Credits) -> Metric {
        Metric::new(series, self.color, self.emphasis, self.order).with_credits(credits)
    }
}

/// Builds a level series from `(date, value)` pairs.
///
/// # Errors
///
/// Returns [`SeriesError::DuplicateDate`] if two readings share a date.
pub fn levels(column: Column) -> Result<Series, SeriesError> {
    Series::from_values(column)
}

/// Builds a series from parallel smoothed and raw columns.
///
/// # Errors
///
/// Returns [`SeriesError::LengthMismatch`] if the columns differ in length
/// or [`SeriesError::DuplicateDate`] if two readings share a date.
pub fn levels_with_raw(values: Column, raw: &[Option<f64>]) -> Result<Series, SeriesError> {
    if values.len() != raw.len() {
        return Err(SeriesError::LengthMismatch {
            values: values.len(),
            raw: raw.len(),
        });
    }
    Series::from_samples(
        values
            .into_iter()
            .zip(raw)
            .map(|((date, value), raw)| Sample {
                date,
                value,
                raw: *raw,
            })
            .collect(),
    )
}

/// Builds a smoothed flow series from daily readings.
///
/// The series start is one sample before the first positive reading, but
/// never later than [`MIN_SMOOTHED_SAMPLES`] before the end. From there,
/// negative readings are clipped to zero and `value` is the mean of the
/// trailing [`SMOOTHING_WINDOW`] samples, left blank until a full window is
/// available or when any sample in the window is missing. `raw` keeps every
/// unclipped reading.
///
/// # Errors
///
/// Returns [`SeriesError::DuplicateDate`] if two readings share a date.
pub fn smoothed(column: Column) -> Result<Series, SeriesError> {
    let sorted = Series::from_values(column)?;
    let raw: Vec<Option<f64>> = sorted.samples().iter().map(|s| s.value).collect();

    let first_positive = raw
        .iter()
        .position(|v| v.is_some_and(|v| v > 0.0))
        .unwrap_or(raw.len());
    let start = first_positive
        .saturating_sub(1)
        .min(raw.len().saturating_sub(MIN_SMOOTHED_SAMPLES));

    let clipped: Vec<Option<f64>> = raw
        .iter()
        .enumerate()
        .map(|(i, v)| if i < start { None } else { v.map(|v| v.max(0.0)) })
        .collect();

    let samples = sorted
        .samples()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let value = if i + 1 >= start + SMOOTHING_WINDOW {
                trailing_mean(&clipped[i + 1 - SMOOTHING_WINDOW..=i])
            } else {
                None
            };
            Sample {
                date: s.date,
                value,
                raw: s.value,
            }
        })
        .collect();
    Series::from_samples(samples)
}

#[allow(clippy::cast_precision_loss)]
fn trailing_mean(window: &[Option<f64>]) -> Option<f64> {
    let sum = window.iter().copied().sum::<Option<f64>>()?;
    Some(sum / window.len() as f64)
}

/// Builds a smoothed flow series from cumulative counts.
///
/// # Errors
///
/// Returns [`SeriesError::DuplicateDate`] if two readings share a date.
pub fn from_cumulative(column: Column) -> Result<Series, SeriesError> {
    smoothed(differenced(column))
}

/// Day-over-day differences of a cumulative column, sorted by date.
///
/// The first reading has no predecessor and becomes missing.
#[must_use]
pub fn differenced(mut column: Column) -> Column {
    column.sort_by_key(|(d, _)| *d);
    let mut prev: Option<f64> = None;
    let mut first = true;
    column
        .into_iter()
        .map(|(date, v)| {
            let diff = if first {
                None
            } else {
                match (v, prev) {
                    (Some(v), Some(p)) => Some(v - p),
                    _ => None,
                }
            };
            first = false;
            prev = v;
            (date, diff)
        })
        .collect()
}

/// Replaces missing readings with the last reading before them.
#[must_use]
pub fn forward_filled(column: Column) -> Column {
    let mut last = None;
    column
        .into_iter()
        .map(|(date, v)| {
            if v.is_some() {
                last = v;
            }
            (date, v.or(last))
        })
        .collect()
}

/// Multiplies every present reading by `factor`.
#[must_use]
pub fn scaled(column: Column, factor: f64) -> Column {
    column
        .into_iter()
        .map(|(date, v)| (date, v.map(|v| v * factor)))
        .collect()
}

/// The last reading of a column, whether or not it is present.
#[must_use]
pub fn last_reading(column: &[(NaiveDate, Option<f64>)]) -> Option<f64> {
    column.last().and_then(|(_, v)| *v)
}
