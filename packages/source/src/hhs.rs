//! US HHS per-facility weekly hospital capacity.
//!
//! Suppressed cells are reported as large negative numbers; they are kept
//! as-is and clipped by the merge.

use std::collections::BTreeSet;

use covid_atlas_region_models::fips;
use covid_atlas_source_models::{HhsFacilityWeek, HhsValues};
use serde::Deserialize;

use crate::parsing::{read_csv, require_date};
use crate::{SourceError, fetch_text};

pub const DATA_URL: &str = "https://healthdata.gov/api/views/anag-cw7u/rows.csv";

const SOURCE: &str = "HHS hospital";

#[derive(Deserialize)]
struct Row {
    hospital_pk: String,
    collection_week: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    zip: String,
    #[serde(default)]
    fips_code: String,
    #[serde(rename = "inpatient_beds_7_day_avg", default, deserialize_with = "csv::invalid_option")]
    inpatient_beds: Option<f64>,
    #[serde(rename = "inpatient_beds_used_7_day_avg", default, deserialize_with = "csv::invalid_option")]
    inpatient_beds_used: Option<f64>,
    #[serde(
        rename = "inpatient_beds_used_covid_7_day_avg",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    inpatient_beds_used_covid: Option<f64>,
    #[serde(
        rename = "previous_day_admission_adult_covid_confirmed_7_day_sum",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    admission_adult_confirmed: Option<f64>,
    #[serde(
        rename = "previous_day_admission_adult_covid_suspected_7_day_sum",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    admission_adult_suspected: Option<f64>,
    #[serde(
        rename = "previous_day_admission_pediatric_covid_confirmed_7_day_sum",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    admission_pediatric_confirmed: Option<f64>,
    #[serde(
        rename = "previous_day_admission_pediatric_covid_suspected_7_day_sum",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    admission_pediatric_suspected: Option<f64>,
    #[serde(
        rename = "total_staffed_adult_icu_beds_7_day_avg",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    icu_beds: Option<f64>,
    #[serde(
        rename = "staffed_adult_icu_bed_occupancy_7_day_avg",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    icu_beds_used: Option<f64>,
    #[serde(
        rename = "staffed_icu_adult_patients_confirmed_and_suspected_covid_7_day_avg",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    icu_beds_used_covid: Option<f64>,
}

/// Parses the facility table. Rows without a FIPS code are dropped.
///
/// # Errors
///
/// Returns [`SourceError`] if the table is malformed, a date is bad, or
/// a facility reports twice for one week.
pub fn parse_hospitalizations(text: &str) -> Result<Vec<HhsFacilityWeek>, SourceError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for row in read_csv::<Row>(text)? {
        let Some(fips) = fips::parse(&row.fips_code) else {
            continue;
        };
        let collection_week = require_date(SOURCE, &row.collection_week)?;
        if !seen.insert((fips, row.hospital_pk.clone(), collection_week)) {
            return Err(SourceError::format(
                SOURCE,
                format!("duplicate report from {} for {collection_week}", row.hospital_pk),
            ));
        }
        out.push(HhsFacilityWeek {
            fips,
            hospital_pk: row.hospital_pk,
            collection_week,
            city: row.city,
            state: row.state,
            zip: row.zip,
            values: HhsValues {
                inpatient_beds: row.inpatient_beds,
                inpatient_beds_used: row.inpatient_beds_used,
                inpatient_beds_used_covid: row.inpatient_beds_used_covid,
                admission_adult_confirmed: row.admission_adult_confirmed,
                admission_adult_suspected: row.admission_adult_suspected,
                admission_pediatric_confirmed: row.admission_pediatric_confirmed,
                admission_pediatric_suspected: row.admission_pediatric_suspected,
                icu_beds: row.icu_beds,
                icu_beds_used: row.icu_beds_used,
                icu_beds_used_covid: row.icu_beds_used_covid,
            },
        });
    }
    Ok(out)
}

/// Fetches per-facility weekly reports.
///
/// # Errors
///
/// Returns [`SourceError`] if the download or parse fails.
pub async fn fetch_hospitalizations(client: &reqwest::Client) -> Result<Vec<HhsFacilityWeek>, SourceError> {
    let rows = parse_hospitalizations(&fetch_text(client, DATA_URL).await?)?;
    log::info!("Loaded {} HHS facility weeks", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "hospital_pk,collection_week,state,city,zip,fips_code,inpatient_beds_7_day_avg,inpatient_beds_used_covid_7_day_avg,previous_day_admission_adult_covid_confirmed_7_day_sum";

    #[test]
    fn facility_weeks_parse_with_suppressed_cells() {
        let text = format!(
            "{HEADER}\n050441,2021/01/08,CA,PALO ALTO,94305,06085,600.5,-999999,70\n999999,2021/01/08,PR,SAN JUAN,00901,,10,1,1\n"
        );
        let rows = parse_hospitalizations(&text).unwrap();
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.fips, 6085);
        assert_eq!(r.collection_week.to_string(), "2021-01-08");
        assert_eq!(r.values.inpatient_beds, Some(600.5));
        assert_eq!(r.values.inpatient_beds_used_covid, Some(-999_999.0));
        assert_eq!(r.values.admission_adult_confirmed, Some(70.0));
        assert!(r.values.icu_beds.is_none());
    }

    #[test]
    fn duplicate_facility_weeks_are_rejected() {
        let line = "050441,2021/01/08,CA,PALO ALTO,94305,06085,1,1,1";
        let err = parse_hospitalizations(&format!("{HEADER}\n{line}\n{line}\n")).unwrap_err();
        assert!(err.to_string().contains("duplicate report from 050441"), "{err}");
    }
}
