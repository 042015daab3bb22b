//! Shared parsing utilities for source tables.
//!
//! Providers disagree on date formats and on how they spell "no value";
//! these helpers absorb the differences.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;

use crate::SourceError;

/// Date layouts seen across sources, tried in order.
///
/// `%m/%d/%y` must come before the four-digit-year layouts: both `%Y`
/// layouts accept short years, so `3/1/21` would otherwise land in year 21
/// or 3. A four-digit year leaves trailing input under `%y` and falls
/// through.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d"];

/// Parses a calendar date, ignoring any time-of-day suffix
/// (`"2021-03-01T00:00:00.000"`, `"2021/03/01 12:00:00 AM"`).
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let day = text.split(['T', ' ']).next().unwrap_or(text);
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(day, format).ok())
}

/// Parses a date that must be present, naming the source on failure.
///
/// # Errors
///
/// Returns [`SourceError::Format`] if `text` is not a recognized date.
pub fn require_date(source_name: &'static str, text: &str) -> Result<NaiveDate, SourceError> {
    parse_date(text).ok_or_else(|| SourceError::format(source_name, format!("bad date \"{text}\"")))
}

/// Combines coordinates, treating zeros as unknown.
#[must_use]
pub fn lat_lon(lat: Option<f64>, lon: Option<f64>) -> Option<(f64, f64)> {
    let (lat, lon) = (lat?, lon?);
    if lat == 0.0 && lon == 0.0 {
        return None;
    }
    Some((lat, lon))
}

/// Deserializes every row of a headed CSV table.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if a row does not fit `T`.
pub fn read_csv<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, SourceError> {
    csv::Reader::from_reader(text.as_bytes())
        .deserialize()
        .map(|row| row.map_err(SourceError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_every_source_date_layout() {
        assert_eq!(parse_date("2021-03-01"), Some(d("2021-03-01")));
        assert_eq!(parse_date("03/01/2021"), Some(d("2021-03-01")));
        assert_eq!(parse_date("2021/03/01"), Some(d("2021-03-01")));
        assert_eq!(parse_date("3/1/21"), Some(d("2021-03-01")));
        assert_eq!(parse_date("2021-03-01T00:00:00.000"), Some(d("2021-03-01")));
        assert_eq!(parse_date("2021/03/01 12:00:00 AM"), Some(d("2021-03-01")));
    }

    #[test]
    fn two_digit_years_are_in_this_century() {
        assert_eq!(parse_date("3/1/21"), Some(d("2021-03-01")));
        assert_eq!(parse_date("12/31/20"), Some(d("2020-12-31")));
        assert_eq!(parse_date("12/31/2020"), Some(d("2020-12-31")));
        assert_eq!(parse_date("2020/12/31"), Some(d("2020-12-31")));
        assert_eq!(require_date("JHU", "1/22/20").unwrap(), d("2020-01-22"));
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(parse_date("not-a-date").is_none());
        assert!(require_date("JHU", "1/0/1900").is_err());
    }

    #[test]
    fn zero_coordinates_are_unknown() {
        assert_eq!(lat_lon(Some(37.2), Some(-121.7)), Some((37.2, -121.7)));
        assert!(lat_lon(Some(0.0), Some(0.0)).is_none());
        assert!(lat_lon(None, Some(-121.7)).is_none());
    }

    #[test]
    fn reads_headed_rows() {
        #[derive(serde::Deserialize)]
        struct Row {
            name: String,
            #[serde(deserialize_with = "csv::invalid_option")]
            value: Option<f64>,
        }
        let rows: Vec<Row> = read_csv("name,value\na,1.5\nb,NA\nc,\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "a");
        assert_eq!(rows[0].value, Some(1.5));
        assert!(rows[1].value.is_none() && rows[2].value.is_none());
    }
}
