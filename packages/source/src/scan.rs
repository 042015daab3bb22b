//! Wastewater SCAN per-plant samples.

use covid_atlas_source_models::WastewaterSample;
use serde::Deserialize;

use crate::parsing::{read_csv, require_date};
use crate::{SourceError, fetch_text};

pub const DATA_URL: &str = "http://publichealth.verily.com/api/data?format=csv";

#[derive(Deserialize)]
struct Row {
    #[serde(rename = "Site_Name")]
    site: String,
    #[serde(rename = "County_FIPS", default)]
    county_fips: String,
    #[serde(rename = "Collection_Date")]
    date: String,
    #[serde(rename = "SC2_S_gc_g_dry_weight", default, deserialize_with = "csv::invalid_option")]
    all_variants: Option<f64>,
    #[serde(rename = "HV_69_70_Del_gc_g_dry_weight", default, deserialize_with = "csv::invalid_option")]
    ba4_ba5: Option<f64>,
}

/// Parses the sample table. FIPS codes are kept as reported; duplicate
/// samples are left for the merge to report.
///
/// # Errors
///
/// Returns [`SourceError`] if the table is malformed or a date is bad.
pub fn parse_wastewater(text: &str) -> Result<Vec<WastewaterSample>, SourceError> {
    read_csv::<Row>(text)?
        .into_iter()
        .map(|row| {
            Ok(WastewaterSample {
                date: require_date("SCAN wastewater", &row.date)?,
                site: row.site,
                county_fips: row.county_fips,
                all_variants: row.all_variants,
                ba4_ba5: row.ba4_ba5,
            })
        })
        .collect()
}

/// Fetches wastewater samples.
///
/// # Errors
///
/// Returns [`SourceError`] if the download or parse fails.
pub async fn fetch_wastewater(client: &reqwest::Client) -> Result<Vec<WastewaterSample>, SourceError> {
    let rows = parse_wastewater(&fetch_text(client, DATA_URL).await?)?;
    log::info!("Loaded {} SCAN wastewater samples", rows.len());
    Ok(rows)
}
