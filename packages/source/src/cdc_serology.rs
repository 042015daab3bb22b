//! US CDC blood-donor seroprevalence estimates.
//!
//! The survey publishes two tables with the same layout: antibodies from
//! infection only, and from infection or vaccination. They are joined on
//! (region code, region name, month); a month present in only one table
//! keeps the other value empty.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use covid_atlas_source_models::SeroPrevalence;
use serde::Deserialize;

use crate::parsing::parse_date;
use crate::{SourceError, fetch_text};

pub const INFECTION_URL: &str = "https://data.cdc.gov/api/views/mtc3-kq6r/rows.csv";
pub const COMBINED_URL: &str = "https://data.cdc.gov/api/views/wi5c-cscz/rows.csv";

const SOURCE_NAME: &str = "CDC serology";

#[derive(Deserialize)]
struct Row {
    #[serde(rename = "Region Abbreviation")]
    region_code: String,
    #[serde(rename = "Region")]
    region_name: String,
    #[serde(rename = "Year and Month")]
    month: String,
    #[serde(rename = "Rate %[Total Prevalence]", default, deserialize_with = "csv::invalid_option")]
    rate: Option<f64>,
}

type RowKey = (String, String, NaiveDate);

/// Parses a survey month: `2021-03`, `March 2021`, or a full date.
fn parse_month(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    parse_date(text)
        .or_else(|| NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("1 {text}"), "%d %B %Y").ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("1 {text}"), "%d %b %Y").ok())
}

/// Reads one survey table into rates keyed by region and month.
///
/// Header names are whitespace-normalized first; the published headers
/// carry line breaks and doubled spaces.
fn parse_table(text: &str) -> Result<BTreeMap<RowKey, Option<f64>>, SourceError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers: csv::StringRecord = reader
        .headers()?
        .iter()
        .map(|h| h.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    reader.set_headers(headers);

    let mut rates = BTreeMap::new();
    for row in reader.deserialize::<Row>() {
        let row = row?;
        let month = parse_month(&row.month)
            .ok_or_else(|| SourceError::format(SOURCE_NAME, format!("bad month \"{}\"", row.month)))?;
        let key = (row.region_code.trim().to_string(), row.region_name.trim().to_string(), month);
        if rates.contains_key(&key) {
            return Err(SourceError::format(
                SOURCE_NAME,
                format!("duplicate row for {} ({}) {month}", key.0, key.1),
            ));
        }
        rates.insert(key, row.rate);
    }
    Ok(rates)
}

/// Joins the infection-only and combined tables.
///
/// # Errors
///
/// Returns [`SourceError`] if either table is malformed, has a bad month,
/// or repeats a (region, month) row.
pub fn parse_prevalence(infection: &str, combined: &str) -> Result<Vec<SeroPrevalence>, SourceError> {
    let infection = parse_table(infection)?;
    let mut combined = parse_table(combined)?;

    let mut out = Vec::with_capacity(infection.len().max(combined.len()));
    for (key, rate) in infection {
        let combined_rate = combined.remove(&key).flatten();
        out.push(record(key, rate, combined_rate));
    }
    out.extend(combined.into_iter().map(|(key, rate)| record(key, None, rate)));
    out.sort_by(|a, b| {
        (&a.region_code, &a.region_name, a.month).cmp(&(&b.region_code, &b.region_name, b.month))
    });
    Ok(out)
}

fn record((region_code, region_name, month): RowKey, infection: Option<f64>, combined: Option<f64>) -> SeroPrevalence {
    SeroPrevalence {
        region_code,
        region_name,
        month,
        infection,
        combined,
    }
}

/// Fetches both survey tables and joins them.
///
/// # Errors
///
/// Returns [`SourceError`] if either download or the parse fails.
pub async fn fetch_prevalence(client: &reqwest::Client) -> Result<Vec<SeroPrevalence>, SourceError> {
    let infection = fetch_text(client, INFECTION_URL).await?;
    let combined = fetch_text(client, COMBINED_URL).await?;
    let rows = parse_prevalence(&infection, &combined)?;
    log::info!("Loaded {} CDC seroprevalence rows", rows.len());
    Ok(rows)
}
