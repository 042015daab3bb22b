//! US CDC county vaccination counts.

use covid_atlas_region_models::fips;
use covid_atlas_source_models::CdcVaccination;
use serde::Deserialize;

use crate::parsing::{read_csv, require_date};
use crate::{SourceError, fetch_text};

pub const DATA_URL: &str = "https://data.cdc.gov/api/views/8xkx-amqh/rows.csv";

#[derive(Deserialize)]
struct Row {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "FIPS")]
    fips: String,
    #[serde(rename = "Administered_Dose1_Recip", default, deserialize_with = "csv::invalid_option")]
    first_dose: Option<f64>,
    #[serde(rename = "Series_Complete_Yes", default, deserialize_with = "csv::invalid_option")]
    series_complete: Option<f64>,
    #[serde(rename = "Booster_Doses", default, deserialize_with = "csv::invalid_option")]
    boosters: Option<f64>,
}

/// Parses the county vaccination table. Rows without a numeric FIPS code
/// (`UNK`) are dropped.
///
/// # Errors
///
/// Returns [`SourceError`] if the table is malformed or a date is bad.
pub fn parse_vaccinations(text: &str) -> Result<Vec<CdcVaccination>, SourceError> {
    let rows: Vec<Row> = read_csv(text)?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(fips) = fips::parse(&row.fips) else {
            continue;
        };
        out.push(CdcVaccination {
            fips,
            date: require_date("CDC vaccination", &row.date)?,
            first_dose: row.first_dose,
            series_complete: row.series_complete,
            boosters: row.boosters,
        });
    }
    Ok(out)
}

/// Fetches county vaccination counts.
///
/// # Errors
///
/// Returns [`SourceError`] if the download or parse fails.
pub async fn fetch_vaccinations(client: &reqwest::Client) -> Result<Vec<CdcVaccination>, SourceError> {
    let rows = parse_vaccinations(&fetch_text(client, DATA_URL).await?)?;
    log::info!("Loaded {} CDC county vaccination rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_counties_are_dropped() {
        let text = "\
Date,FIPS,MMWR_week,Recip_County,Administered_Dose1_Recip,Series_Complete_Yes,Booster_Doses
03/01/2022,06085,9,Santa Clara County,1700000,1500000,900000
03/01/2022,UNK,9,Unknown County,10,5,
";
        let rows = parse_vaccinations(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fips, 6085);
        assert_eq!(rows[0].date.to_string(), "2022-03-01");
        assert_eq!(rows[0].boosters, Some(900_000.0));
    }

    #[test]
    fn missing_counts_are_none() {
        let text = "Date,FIPS,Administered_Dose1_Recip,Series_Complete_Yes,Booster_Doses\n03/02/2022,06085,,1,\n";
        let rows = parse_vaccinations(text).unwrap();
        assert!(rows[0].first_dose.is_none());
        assert!(rows[0].boosters.is_none());
        assert_eq!(rows[0].series_complete, Some(1.0));
    }
}
