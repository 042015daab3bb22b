//! Our World In Data vaccination and hospitalization tables.
//!
//! The US state vaccination table has no ISO code column; its rows are
//! tagged `USA` and keep the state name so the merge can place them.

use covid_atlas_source_models::{OwidCadence, OwidHospitalValue, OwidVaccination};
use serde::Deserialize;

use crate::parsing::{read_csv, require_date};
use crate::{SourceError, fetch_text};

pub const VACCINATIONS_URL: &str = "https://raw.githubusercontent.com/owid/covid-19-data/master/public/data/vaccinations/vaccinations.csv";
pub const US_VACCINATIONS_URL: &str = "https://raw.githubusercontent.com/owid/covid-19-data/master/public/data/vaccinations/us_state_vaccinations.csv";
pub const HOSPITALIZATIONS_URL: &str = "https://raw.githubusercontent.com/owid/covid-19-data/master/public/data/hospitalizations/covid-hospitalizations.csv";

/// Suffix of per-capita indicators, which are recomputed downstream.
const PER_MILLION: &str = " per million";

#[derive(Deserialize)]
struct VaccinationRow {
    location: String,
    #[serde(default)]
    iso_code: Option<String>,
    date: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    people_vaccinated: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    people_fully_vaccinated: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    total_boosters: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    daily_vaccinations: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    daily_vaccinations_raw: Option<f64>,
}

fn vaccinations(text: &str, us_states: bool) -> Result<Vec<OwidVaccination>, SourceError> {
    read_csv::<VaccinationRow>(text)?
        .into_iter()
        .map(|row| {
            let (iso_code, state) = if us_states {
                ("USA".to_string(), row.location)
            } else {
                (row.iso_code.unwrap_or_default(), String::new())
            };
            Ok(OwidVaccination {
                iso_code,
                state,
                date: require_date("OWID vaccination", &row.date)?,
                people_vaccinated: row.people_vaccinated,
                people_fully_vaccinated: row.people_fully_vaccinated,
                total_boosters: row.total_boosters,
                daily_vaccinations: row.daily_vaccinations,
                daily_vaccinations_raw: row.daily_vaccinations_raw,
            })
        })
        .collect()
}

/// Parses the country and US state vaccination tables into one list.
///
/// # Errors
///
/// Returns [`SourceError`] if either table is malformed.
pub fn parse_vaccinations(countries: &str, us_states: &str) -> Result<Vec<OwidVaccination>, SourceError> {
    let mut rows = vaccinations(countries, false)?;
    rows.extend(vaccinations(us_states, true)?);
    Ok(rows)
}

#[derive(Deserialize)]
struct HospitalRow {
    iso_code: String,
    date: String,
    indicator: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    value: Option<f64>,
}

/// Parses the long-format hospitalization table.
///
/// Indicators are split into cadence and name; per-million indicators
/// and rows without a value are dropped, and weekly totals are divided
/// into daily rates.
///
/// # Errors
///
/// Returns [`SourceError`] if the table is malformed.
pub fn parse_hospitalizations(text: &str) -> Result<Vec<OwidHospitalValue>, SourceError> {
    let mut out = Vec::new();
    for row in read_csv::<HospitalRow>(text)? {
        if row.indicator.ends_with(PER_MILLION) {
            continue;
        }
        let Some((cadence, indicator)) = row.indicator.split_once(' ') else {
            continue;
        };
        let Ok(cadence) = cadence.parse::<OwidCadence>() else {
            continue;
        };
        let Some(value) = row.value else {
            continue;
        };
        let value = match cadence {
            OwidCadence::Daily => value,
            OwidCadence::Weekly => value / 7.0,
        };
        out.push(OwidHospitalValue {
            date: require_date("OWID hospitalization", &row.date)?,
            iso_code: row.iso_code,
            cadence,
            indicator: indicator.to_string(),
            value,
        });
    }
    Ok(out)
}

/// Fetches country and US state vaccinations.
///
/// # Errors
///
/// Returns [`SourceError`] if a download or parse fails.
pub async fn fetch_vaccinations(client: &reqwest::Client) -> Result<Vec<OwidVaccination>, SourceError> {
    let countries = fetch_text(client, VACCINATIONS_URL).await?;
    let us_states = fetch_text(client, US_VACCINATIONS_URL).await?;
    let rows = parse_vaccinations(&countries, &us_states)?;
    log::info!("Loaded {} OWID vaccination rows", rows.len());
    Ok(rows)
}

/// Fetches hospital occupancy and admissions.
///
/// # Errors
///
/// Returns [`SourceError`] if the download or parse fails.
pub async fn fetch_hospitalizations(client: &reqwest::Client) -> Result<Vec<OwidHospitalValue>, SourceError> {
    let rows = parse_hospitalizations(&fetch_text(client, HOSPITALIZATIONS_URL).await?)?;
    log::info!("Loaded {} OWID hospital values", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_state_rows_are_tagged_usa() {
        let countries = "\
location,iso_code,date,total_vaccinations,people_vaccinated,people_fully_vaccinated,total_boosters,daily_vaccinations_raw,daily_vaccinations
Germany,DEU,2021-06-01,100,80,40,,5,4
World,OWID_WRL,2021-06-01,1000,800,400,,,
";
        let states = "\
date,location,total_vaccinations,people_vaccinated,people_fully_vaccinated,daily_vaccinations_raw,daily_vaccinations
2021-06-01,New York State,50,40,20,3,2
";
        let rows = parse_vaccinations(countries, states).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].iso_code.as_str(), rows[0].state.as_str()), ("DEU", ""));
        assert_eq!(rows[0].daily_vaccinations_raw, Some(5.0));
        assert_eq!(rows[1].iso_code, "OWID_WRL");
        assert_eq!((rows[2].iso_code.as_str(), rows[2].state.as_str()), ("USA", "New York State"));
        assert!(rows[2].total_boosters.is_none());
    }

    #[test]
    fn hospital_indicators_split_by_cadence() {
        let text = "\
entity,iso_code,date,indicator,value
Germany,DEU,2021-06-01,Daily ICU occupancy,700
Germany,DEU,2021-06-01,Daily ICU occupancy per million,8.4
Germany,DEU,2021-06-06,Weekly new hospital admissions,1400
Germany,DEU,2021-06-06,Weekly new ICU admissions,
";
        let rows = parse_hospitalizations(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cadence, OwidCadence::Daily);
        assert_eq!(rows[0].indicator, "ICU occupancy");
        assert!((rows[0].value - 700.0).abs() < 1e-9);
        assert_eq!(rows[1].indicator, "new hospital admissions");
        assert!((rows[1].value - 200.0).abs() < 1e-9);
    }
}
