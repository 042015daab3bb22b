//! Google Community Mobility Reports.

use covid_atlas_region_models::fips;
use covid_atlas_source_models::{MobilityChanges, MobilityReport};
use serde::Deserialize;

use crate::parsing::{read_csv, require_date};
use crate::{SourceError, fetch_text};

pub const DATA_URL: &str = "https://www.gstatic.com/covid19/mobility/Global_Mobility_Report.csv";

#[derive(Deserialize)]
struct Row {
    country_region_code: String,
    #[serde(default)]
    sub_region_1: String,
    #[serde(default)]
    sub_region_2: String,
    #[serde(default)]
    metro_area: String,
    #[serde(default)]
    iso_3166_2_code: String,
    #[serde(default)]
    census_fips_code: String,
    date: String,
    #[serde(
        rename = "retail_and_recreation_percent_change_from_baseline",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    retail_and_recreation: Option<f64>,
    #[serde(
        rename = "grocery_and_pharmacy_percent_change_from_baseline",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    grocery_and_pharmacy: Option<f64>,
    #[serde(
        rename = "transit_stations_percent_change_from_baseline",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    transit_stations: Option<f64>,
    #[serde(
        rename = "workplaces_percent_change_from_baseline",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    workplaces: Option<f64>,
    #[serde(
        rename = "residential_percent_change_from_baseline",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    residential: Option<f64>,
}

/// Parses the global report. State rows carry no census FIPS code, so it
/// is filled in from their `US-XX` subdivision code.
///
/// # Errors
///
/// Returns [`SourceError`] if the table is malformed or a date is bad.
pub fn parse_mobility(text: &str) -> Result<Vec<MobilityReport>, SourceError> {
    read_csv::<Row>(text)?
        .into_iter()
        .map(|row| {
            let fips = fips::parse(&row.census_fips_code)
                .filter(|f| *f > 0)
                .or_else(|| fips::from_iso_3166_2(&row.iso_3166_2_code).map(|s| s.fips));
            Ok(MobilityReport {
                date: require_date("Google mobility", &row.date)?,
                country_code: row.country_region_code,
                sub_region_1: row.sub_region_1,
                sub_region_2: row.sub_region_2,
                metro_area: row.metro_area,
                fips,
                changes: MobilityChanges {
                    retail_and_recreation: row.retail_and_recreation,
                    grocery_and_pharmacy: row.grocery_and_pharmacy,
                    transit_stations: row.transit_stations,
                    workplaces: row.workplaces,
                    residential: row.residential,
                },
            })
        })
        .collect()
}

/// Fetches the global mobility report.
///
/// # Errors
///
/// Returns [`SourceError`] if the download or parse fails.
pub async fn fetch_mobility(client: &reqwest::Client) -> Result<Vec<MobilityReport>, SourceError> {
    let rows = parse_mobility(&fetch_text(client, DATA_URL).await?)?;
    log::info!("Loaded {} Google mobility rows", rows.len());
    Ok(rows)
}
