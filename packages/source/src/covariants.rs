//! `CoVariants.org` weekly sequence counts by variant.
//!
//! Each cluster table maps places to parallel arrays: the week start
//! dates, the total sequences, and one count array per variant. The EU
//! table is keyed by country; the US table by state.

use std::collections::BTreeMap;

use covid_atlas_source_models::VariantCount;
use serde::Deserialize;

use crate::parsing::require_date;
use crate::{SourceError, fetch_text};

const CLUSTER_TABLES: &str = "https://raw.githubusercontent.com/hodcroftlab/covariants/master/cluster_tables";

/// Cluster tables, with the country their places belong to (if one).
pub const TABLES: &[(Option<&str>, &str)] = &[
    (None, "EUClusters_data.json"),
    (Some("United States"), "USAClusters_data.json"),
];

/// Key of the total-sequences array.
const TOTAL: &str = "total_sequences";

#[derive(Deserialize)]
struct ClusterTable {
    countries: BTreeMap<String, PlaceTable>,
}

#[derive(Deserialize)]
struct PlaceTable {
    week: Vec<String>,
    #[serde(flatten)]
    counts: BTreeMap<String, Vec<f64>>,
}

/// Parses one cluster table. Totals come out as the variant `""`.
///
/// # Errors
///
/// Returns [`SourceError`] if the JSON is malformed or an array does not
/// line up with the week list.
pub fn parse_table(json: &str, country: Option<&str>) -> Result<Vec<VariantCount>, SourceError> {
    let table: ClusterTable = serde_json::from_str(json)?;
    let mut out = Vec::new();
    for (place, data) in table.countries {
        let weeks = data
            .week
            .iter()
            .map(|w| require_date("covariant", w))
            .collect::<Result<Vec<_>, _>>()?;
        let (country, region) = match country {
            Some(country) => (country.to_string(), place.clone()),
            None => (place.clone(), String::new()),
        };

        for (key, counts) in data.counts {
            if counts.len() != weeks.len() {
                return Err(SourceError::format(
                    "covariant",
                    format!(
                        "country=\"{country}\" place=\"{place}\" {key}: dates={} != data={}",
                        weeks.len(),
                        counts.len()
                    ),
                ));
            }
            let variant = if key == TOTAL { String::new() } else { key };
            out.extend(weeks.iter().zip(counts).map(|(date, found)| VariantCount {
                country: country.clone(),
                region: region.clone(),
                variant: variant.clone(),
                date: *date,
                found,
            }));
        }
    }
    Ok(out)
}

/// Fetches every cluster table.
///
/// # Errors
///
/// Returns [`SourceError`] if a download or parse fails.
pub async fn fetch_variants(client: &reqwest::Client) -> Result<Vec<VariantCount>, SourceError> {
    let mut out = Vec::new();
    for (country, file) in TABLES {
        let json = fetch_text(client, &format!("{CLUSTER_TABLES}/{file}")).await?;
        out.extend(parse_table(&json, *country)?);
    }
    log::info!("Loaded {} covariant counts", out.len());
    Ok(out)
}
