#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Typed record shapes produced by the source adapters.
//!
//! Each provider's CSV or JSON layout is parsed by its adapter into one of
//! the record types here. The merge engine only ever sees these types,
//! never raw rows, so column quirks stay inside the adapters.

use chrono::NaiveDate;
use covid_atlas_region_models::Credits;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Every data provider the pipeline knows about.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceId {
    /// JHU CSSE place list and case counts.
    Jhu,
    /// US CDC county vaccinations.
    CdcVaccinations,
    /// Our World In Data vaccinations.
    OwidVaccinations,
    /// US CDC blood-donor seroprevalence survey.
    CdcSerology,
    /// Our World In Data hospitalizations.
    OwidHospitalizations,
    /// The Economist excess-deaths model.
    Economist,
    /// US HHS per-facility hospital capacity.
    Hhs,
    /// `CoVariants.org` sequence counts.
    CoVariants,
    /// Wastewater SCAN sampling.
    Scan,
    /// Google Community Mobility Reports.
    GoogleMobility,
    /// COVID-19 US State Policy Database.
    StatePolicy,
}

impl SourceId {
    /// Every source.
    pub const ALL: &[Self] = &[
        Self::Jhu,
        Self::CdcVaccinations,
        Self::OwidVaccinations,
        Self::CdcSerology,
        Self::OwidHospitalizations,
        Self::Economist,
        Self::Hhs,
        Self::CoVariants,
        Self::Scan,
        Self::GoogleMobility,
        Self::StatePolicy,
    ];

    /// Attribution URL and label shown next to data from this source.
    #[must_use]
    pub const fn credit(self) -> (&'static str, &'static str) {
        match self {
            Self::Jhu => ("https://coronavirus.jhu.edu/", "JHU COVID Resource Center"),
            Self::CdcVaccinations | Self::CdcSerology => (
                "https://covid.cdc.gov/covid-data-tracker/",
                "US CDC COVID Data Tracker",
            ),
            Self::OwidVaccinations => (
                "https://ourworldindata.org/covid-vaccinations",
                "Our World In Data",
            ),
            Self::OwidHospitalizations => ("https://ourworldindata.org/", "Our World In Data"),
            Self::Economist => (
                "https://www.economist.com/graphic-detail/coronavirus-excess-deaths-estimates",
                "The Economist",
            ),
            Self::Hhs => ("https://healthdata.gov/", "HealthData.gov"),
            Self::CoVariants => ("https://covariants.org/", "CoVariants.org"),
            Self::Scan => (
                "https://wastewaterscan.org/",
                "Sewer Coronavirus Alert Network",
            ),
            Self::GoogleMobility => (
                "https://www.google.com/covid19/mobility/",
                "Google Community Mobility Reports",
            ),
            Self::StatePolicy => (
                "https://tinyurl.com/statepolicies",
                "COVID-19 US State Policy Database",
            ),
        }
    }

    /// Attribution as a [`Credits`] map.
    #[must_use]
    pub fn credits(self) -> Credits {
        let (url, label) = self.credit();
        Credits::from([(url.to_string(), label.to_string())])
    }
}

// ── Places ────────────────────────────────────────────────────────────

/// One row of the base place list (country, state, or county).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    /// Source-specific place ID (JHU UID).
    pub place_id: String,
    /// ISO 3166-1 alpha-2 hint carried by the record.
    pub iso2: String,
    /// Country name as spelled by the source.
    pub country_region: String,
    /// State or province name, empty for country rows.
    pub province_state: String,
    /// County-equivalent name, empty above county level.
    pub admin2: String,
    /// US FIPS code, if any.
    pub fips: Option<u32>,
    /// Representative coordinates.
    pub lat_lon: Option<(f64, f64)>,
    /// Population, if known.
    pub population: Option<f64>,
}

// ── Cases ─────────────────────────────────────────────────────────────

/// Cumulative case and death counts for one place on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseCount {
    /// Place ID matching [`PlaceRecord::place_id`].
    pub place_id: String,
    /// Report date.
    pub date: NaiveDate,
    /// Cumulative confirmed cases.
    pub confirmed: Option<f64>,
    /// Cumulative deaths.
    pub deaths: Option<f64>,
}

// ── Mortality ─────────────────────────────────────────────────────────

/// Modeled excess deaths for one country on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcessDeaths {
    /// ISO 3166-1 alpha-3 country code.
    pub iso3: String,
    /// Observation date.
    pub date: NaiveDate,
    /// Measured daily excess deaths, where reported.
    pub daily: Option<f64>,
    /// Model estimate of daily excess deaths.
    pub estimated_daily: Option<f64>,
}

// ── Hospitals ─────────────────────────────────────────────────────────

/// Reporting cadence of an OWID hospital indicator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum OwidCadence {
    /// Point-in-time occupancy.
    Daily,
    /// Weekly admission totals.
    Weekly,
}

/// One OWID hospital indicator value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwidHospitalValue {
    /// ISO alpha-3 code or an `OWID_*` pseudo-code.
    pub iso_code: String,
    /// Observation date.
    pub date: NaiveDate,
    /// Cadence prefix of the indicator.
    pub cadence: OwidCadence,
    /// Indicator name with the cadence prefix removed (for example
    /// `"hospital occupancy"` or `"new ICU admissions"`).
    pub indicator: String,
    /// Reported value; weekly totals are already divided into daily rates.
    pub value: f64,
}

/// Weekly averages reported by one US hospital facility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HhsValues {
    pub inpatient_beds: Option<f64>,
    pub inpatient_beds_used: Option<f64>,
    pub inpatient_beds_used_covid: Option<f64>,
    pub admission_adult_confirmed: Option<f64>,
    pub admission_adult_suspected: Option<f64>,
    pub admission_pediatric_confirmed: Option<f64>,
    pub admission_pediatric_suspected: Option<f64>,
    pub icu_beds: Option<f64>,
    pub icu_beds_used: Option<f64>,
    pub icu_beds_used_covid: Option<f64>,
}

/// One facility's report for one collection week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HhsFacilityWeek {
    /// County FIPS code of the facility.
    pub fips: u32,
    /// Facility identifier.
    pub hospital_pk: String,
    /// First day of the collection week.
    pub collection_week: NaiveDate,
    /// Facility city, for diagnostics.
    pub city: String,
    /// Facility state abbreviation, for diagnostics.
    pub state: String,
    /// Facility ZIP code, for diagnostics.
    pub zip: String,
    /// Reported measures.
    pub values: HhsValues,
}

// ── Vaccinations ──────────────────────────────────────────────────────

/// Cumulative county vaccination counts from the US CDC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdcVaccination {
    /// County FIPS code.
    pub fips: u32,
    /// Report date.
    pub date: NaiveDate,
    /// People with at least one dose.
    pub first_dose: Option<f64>,
    /// People with a completed primary series.
    pub series_complete: Option<f64>,
    /// Booster doses administered.
    pub boosters: Option<f64>,
}

/// Country or US-state vaccination counts from OWID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwidVaccination {
    /// ISO alpha-3 code or an `OWID_*` pseudo-code.
    pub iso_code: String,
    /// US state name for state rows, empty for country rows.
    pub state: String,
    /// Report date.
    pub date: NaiveDate,
    /// People with at least one dose.
    pub people_vaccinated: Option<f64>,
    /// People fully vaccinated.
    pub people_fully_vaccinated: Option<f64>,
    /// Booster doses administered.
    pub total_boosters: Option<f64>,
    /// Smoothed daily doses.
    pub daily_vaccinations: Option<f64>,
    /// Unsmoothed daily doses.
    pub daily_vaccinations_raw: Option<f64>,
}

// ── Serology ──────────────────────────────────────────────────────────

/// Monthly seroprevalence for one survey region from the US CDC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeroPrevalence {
    /// Survey region code: `All`, a state (`CA`), a state part (`CA-2`),
    /// or a multi-state census region (`CR1`).
    pub region_code: String,
    /// Survey region name as spelled by the source.
    pub region_name: String,
    /// First day of the surveyed month.
    pub month: NaiveDate,
    /// Percent with antibodies from infection.
    pub infection: Option<f64>,
    /// Percent with antibodies from infection or vaccination.
    pub combined: Option<f64>,
}

// ── Variants ──────────────────────────────────────────────────────────

/// Sequence count for one variant in one place and week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantCount {
    /// Country name as spelled by the source.
    pub country: String,
    /// Subregion (US state) name, empty for country rows.
    pub region: String,
    /// Variant name; empty for the total-sequences row.
    pub variant: String,
    /// Week start date.
    pub date: NaiveDate,
    /// Sequences found.
    pub found: f64,
}

// ── Wastewater ────────────────────────────────────────────────────────

/// One wastewater sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WastewaterSample {
    /// Treatment plant name.
    pub site: String,
    /// County FIPS code as reported (may be blank or malformed).
    pub county_fips: String,
    /// Collection date.
    pub date: NaiveDate,
    /// SARS-CoV-2 gene copies per gram of dry solids.
    pub all_variants: Option<f64>,
    /// BA.4/5 marker gene copies per gram of dry solids.
    pub ba4_ba5: Option<f64>,
}

// ── Mobility ──────────────────────────────────────────────────────────

/// Percent change from baseline by place category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MobilityChanges {
    pub retail_and_recreation: Option<f64>,
    pub grocery_and_pharmacy: Option<f64>,
    pub transit_stations: Option<f64>,
    pub workplaces: Option<f64>,
    pub residential: Option<f64>,
}

/// One day of community mobility for one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobilityReport {
    /// ISO alpha-2 country code.
    pub country_code: String,
    /// First-level subdivision name.
    pub sub_region_1: String,
    /// Second-level subdivision name.
    pub sub_region_2: String,
    /// Metro area name.
    pub metro_area: String,
    /// US FIPS code (state FIPS filled in from `US-XX` codes).
    pub fips: Option<u32>,
    /// Report date.
    pub date: NaiveDate,
    /// Percent changes from baseline.
    pub changes: MobilityChanges,
}

impl MobilityReport {
    /// Grouping key identifying the place this report covers.
    #[must_use]
    pub fn place_key(&self) -> (String, String, String, String, Option<u32>) {
        (
            self.country_code.clone(),
            self.sub_region_1.clone(),
            self.sub_region_2.clone(),
            self.metro_area.clone(),
            self.fips,
        )
    }
}

// ── Policy ────────────────────────────────────────────────────────────

/// A dated US state policy action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvent {
    /// State FIPS code.
    pub state_fips: u32,
    /// Effective date.
    pub date: NaiveDate,
    /// Policy area (spreadsheet tab).
    pub area: String,
    /// Policy name (column header).
    pub policy: String,
    /// Signed significance: negative closes, positive reopens.
    pub score: i32,
    /// Emoji summarizing the policy area.
    pub emoji: String,
}
