//! The Economist's excess-deaths model.

use covid_atlas_source_models::ExcessDeaths;
use serde::Deserialize;

use crate::parsing::{read_csv, require_date};
use crate::{SourceError, fetch_text};

pub const DATA_URL: &str = "https://raw.githubusercontent.com/TheEconomist/covid-19-the-economist-global-excess-deaths-model/main/output-data/export_country.csv";

#[derive(Deserialize)]
struct Row {
    iso3c: String,
    date: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    daily_excess_deaths: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    estimated_daily_excess_deaths: Option<f64>,
}

/// Parses the per-country export. `NA` cells become `None`.
///
/// # Errors
///
/// Returns [`SourceError`] if the table is malformed or a date is bad.
pub fn parse_mortality(text: &str) -> Result<Vec<ExcessDeaths>, SourceError> {
    read_csv::<Row>(text)?
        .into_iter()
        .map(|row| {
            Ok(ExcessDeaths {
                date: require_date("Economist mortality", &row.date)?,
                iso3: row.iso3c,
                daily: row.daily_excess_deaths,
                estimated_daily: row.estimated_daily_excess_deaths,
            })
        })
        .collect()
}

/// Fetches modeled excess deaths.
///
/// # Errors
///
/// Returns [`SourceError`] if the download or parse fails.
pub async fn fetch_mortality(client: &reqwest::Client) -> Result<Vec<ExcessDeaths>, SourceError> {
    let rows = parse_mortality(&fetch_text(client, DATA_URL).await?)?;
    log::info!("Loaded {} Economist excess-death rows", rows.len());
    Ok(rows)
}
