#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Assembles the world region tree from every enabled source.
//!
//! [`get_world`] returns the cached tree for the enabled [`Stage`]s when
//! one exists, and otherwise fetches the sources, merges them in pipeline
//! order, rolls metrics up the tree, derives map series, and caches the
//! result. Every data-quality anomaly of the run is collected; if any is
//! not on the known-issue list the run fails with all of them and nothing
//! is cached.

pub mod cache;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use covid_atlas_merge::{
    MergeError, covid, hospital, mobility, mortality, policy, serology, vaccine, variant, wastewater,
};
use covid_atlas_region::Atlas;
use covid_atlas_region_models::Region;
use covid_atlas_rollup::{MapConfig, RollupConfig, make_map_metrics, roll_up};
use covid_atlas_source::progress::{ProgressCallback, null_progress};
use covid_atlas_source::{
    SourceError, cdc, cdc_serology, covariants, economist, google_mobility, hhs, http_client, jhu, owid, scan, state_policy,
};
use covid_atlas_source_models::{
    CaseCount, CdcVaccination, ExcessDeaths, HhsFacilityWeek, MobilityReport, OwidHospitalValue, OwidVaccination,
    PlaceRecord, PolicyEvent, SeroPrevalence, VariantCount, WastewaterSample,
};
use covid_atlas_warnings::{AllowList, UnrecognizedWarnings, collecting_warnings};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub use cache::AtlasCache;

/// Prefix of every cache key.
const CACHE_KEY_BASE: &str = "https://plague.wtf/world";

/// A separately selectable part of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// JHU cases and deaths.
    Covid,
    /// Economist excess deaths.
    Mortality,
    /// OWID and HHS hospital capacity.
    Hospital,
    /// CDC and OWID vaccinations.
    Vaccine,
    /// `CoVariants` sequence shares.
    Variant,
    /// CDC blood-donor seroprevalence.
    Serology,
    /// SCAN wastewater sampling.
    Wastewater,
    /// Google mobility.
    Mobility,
    /// US state policy events.
    Policy,
    /// Weekly map series.
    Maps,
}

impl Stage {
    pub const ALL: &[Self] = &[
        Self::Covid,
        Self::Mortality,
        Self::Hospital,
        Self::Vaccine,
        Self::Variant,
        Self::Serology,
        Self::Wastewater,
        Self::Mobility,
        Self::Policy,
        Self::Maps,
    ];

    /// Stages run when none are named: everything except wastewater.
    #[must_use]
    pub fn defaults() -> BTreeSet<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| *s != Self::Wastewater)
            .collect()
    }
}

/// Builds the cache key for a set of stages.
#[must_use]
pub fn cache_key(stages: &BTreeSet<Stage>) -> String {
    let names: Vec<&str> = stages.iter().map(AsRef::as_ref).collect();
    format!("{CACHE_KEY_BASE}:{}", names.join(","))
}

/// Errors that can end a combine run.
#[derive(Debug, Error)]
pub enum CombineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to encode world: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode cached world: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Unrecognized anomalies, one message each.
    #[error("{} warnings found combining data", .0.len())]
    Validation(Vec<String>),
}

impl CombineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<UnrecognizedWarnings> for CombineError {
    fn from(value: UnrecognizedWarnings) -> Self {
        Self::Validation(value.messages)
    }
}

/// What to build and where to cache it.
#[derive(Debug, Clone)]
pub struct CombineOptions {
    pub stages: BTreeSet<Stage>,
    pub cache_dir: PathBuf,
    /// Delete any cached artifact before running.
    pub rebuild: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            stages: Stage::defaults(),
            cache_dir: AtlasCache::default_dir(),
            rebuild: false,
        }
    }
}

impl CombineOptions {
    fn enabled(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Every source record the enabled stages need. Disabled stages leave
/// their lists empty.
#[derive(Debug, Default)]
pub struct SourceData {
    pub places: Vec<PlaceRecord>,
    pub cases: Vec<CaseCount>,
    pub mortality: Vec<ExcessDeaths>,
    pub owid_hospital: Vec<OwidHospitalValue>,
    pub hhs_hospital: Vec<HhsFacilityWeek>,
    pub cdc_vaccine: Vec<CdcVaccination>,
    pub owid_vaccine: Vec<OwidVaccination>,
    pub variants: Vec<VariantCount>,
    pub serology: Vec<SeroPrevalence>,
    pub wastewater: Vec<WastewaterSample>,
    pub mobility: Vec<MobilityReport>,
    pub policy: Vec<PolicyEvent>,
}

async fn when<T>(
    enabled: bool,
    fetch: impl Future<Output = Result<Vec<T>, SourceError>>,
) -> Result<Vec<T>, SourceError> {
    if enabled { fetch.await } else { Ok(Vec::new()) }
}

/// Downloads every source the enabled stages use, concurrently.
///
/// # Errors
///
/// Returns [`CombineError::Source`] on the first failed download or parse.
pub async fn fetch_sources(client: &reqwest::Client, options: &CombineOptions) -> Result<SourceData, CombineError> {
    let places = jhu::fetch_places(client).await?;
    let on = |stage| options.enabled(stage);

    let (
        cases,
        mortality,
        owid_hospital,
        hhs_hospital,
        cdc_vaccine,
        owid_vaccine,
        variants,
        serology,
        wastewater,
        mobility,
        policy,
    ) = tokio::try_join!(
        when(on(Stage::Covid), jhu::fetch_cases(client, &places)),
        when(on(Stage::Mortality), economist::fetch_mortality(client)),
        when(on(Stage::Hospital), owid::fetch_hospitalizations(client)),
        when(on(Stage::Hospital), hhs::fetch_hospitalizations(client)),
        when(on(Stage::Vaccine), cdc::fetch_vaccinations(client)),
        when(on(Stage::Vaccine), owid::fetch_vaccinations(client)),
        when(on(Stage::Variant), covariants::fetch_variants(client)),
        when(on(Stage::Serology), cdc_serology::fetch_prevalence(client)),
        when(on(Stage::Wastewater), scan::fetch_wastewater(client)),
        when(on(Stage::Mobility), google_mobility::fetch_mobility(client)),
        when(on(Stage::Policy), state_policy::fetch_events(client)),
    )?;

    Ok(SourceData {
        places,
        cases,
        mortality,
        owid_hospital,
        hhs_hospital,
        cdc_vaccine,
        owid_vaccine,
        variants,
        serology,
        wastewater,
        mobility,
        policy,
    })
}

/// Builds the finished world tree from already-fetched records.
///
/// Mergers run in stage order, then the roll-up, then map synthesis
/// (if enabled). `extra_allow` is tolerated on top of the embedded
/// known-issue list.
///
/// # Errors
///
/// Returns [`CombineError::Merge`] for structurally bad records, or
/// [`CombineError::Validation`] listing every unrecognized anomaly.
pub fn build_world(
    data: &SourceData,
    options: &CombineOptions,
    extra_allow: AllowList,
    progress: &dyn ProgressCallback,
) -> Result<Region, CombineError> {
    let mut allow = AllowList::known();
    allow.extend(extra_allow);

    collecting_warnings(allow, |warnings| {
        let mut atlas = Atlas::from_places(&data.places, warnings);
        log::info!("Built skeleton with {} places", atlas.place_id_count());

        let merge_stages: Vec<Stage> = options.stages.iter().copied().filter(|s| *s != Stage::Maps).collect();
        progress.set_total(options.stages.len() as u64 + 1);

        for stage in merge_stages {
            progress.set_message(format!("Merging {stage}"));
            match stage {
                Stage::Covid => covid::merge(&mut atlas, &data.cases, warnings)?,
                Stage::Mortality => mortality::merge(&mut atlas, &data.mortality, warnings)?,
                Stage::Hospital => {
                    hospital::merge_owid(&mut atlas, &data.owid_hospital, warnings)?;
                    hospital::merge_hhs(&mut atlas, &data.hhs_hospital, warnings)?;
                }
                Stage::Vaccine => {
                    vaccine::merge_cdc(&mut atlas, &data.cdc_vaccine, warnings)?;
                    vaccine::merge_owid(&mut atlas, &data.owid_vaccine, warnings)?;
                }
                Stage::Variant => variant::merge(&mut atlas, &data.variants, warnings)?,
                Stage::Serology => serology::merge(&mut atlas, &data.serology, warnings)?,
                Stage::Wastewater => wastewater::merge(&mut atlas, &data.wastewater, warnings)?,
                Stage::Mobility => mobility::merge(&mut atlas, &data.mobility)?,
                Stage::Policy => policy::merge(&mut atlas, &data.policy, warnings),
                Stage::Maps => {}
            }
            progress.inc(1);
        }

        progress.set_message("Rolling up".to_string());
        let mut world = atlas.world;
        roll_up(&mut world, &RollupConfig::default(), warnings);
        progress.inc(1);

        if options.enabled(Stage::Maps) {
            progress.set_message("Making map metrics".to_string());
            make_map_metrics(&mut world, &MapConfig::default());
            progress.inc(1);
        }

        progress.finish(format!("Combined {} regions", count_regions(&world)));
        Ok(world)
    })
}

fn count_regions(world: &Region) -> usize {
    let mut count = 0;
    world.visit(&mut |_: &Region| count += 1);
    count
}

/// Fetches and builds a fresh world tree, ignoring the cache.
///
/// # Errors
///
/// See [`fetch_sources`] and [`build_world`].
pub async fn compute_world(
    options: &CombineOptions,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Region, CombineError> {
    let client = http_client()?;
    let data = fetch_sources(&client, options).await?;
    build_world(&data, options, AllowList::empty(), progress.as_ref())
}

/// Returns the world tree for `options`, from the cache when possible.
///
/// A freshly computed tree is cached only when the run was clean.
///
/// # Errors
///
/// Returns any fetch, merge, validation, or cache error.
pub async fn get_world(
    options: &CombineOptions,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<Region, CombineError> {
    let cache = AtlasCache::new(&options.cache_dir);
    let key = cache_key(&options.stages);
    if options.rebuild {
        cache.remove(&key)?;
    }
    if let Some(world) = cache.load(&key)? {
        return Ok(world);
    }

    let world = compute_world(options, progress.unwrap_or_else(null_progress)).await?;
    cache.store(&key, &world)?;
    Ok(world)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use covid_atlas_merge::covid::{DEATHS, POSITIVES};
    use covid_atlas_region_models::{Category, POPULATION};

    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn place(id: &str, country: &str, state: &str, fips: Option<u32>, pop: f64) -> PlaceRecord {
        PlaceRecord {
            place_id: id.to_string(),
            iso2: String::new(),
            country_region: country.to_string(),
            province_state: state.to_string(),
            admin2: String::new(),
            fips,
            lat_lon: None,
            population: Some(pop),
        }
    }

    /// Thirty days of steadily growing cumulative counts.
    fn counts(id: &str, per_day: f64) -> Vec<CaseCount> {
        let start = date("2021-01-01");
        (0..30_u32)
            .map(|i| CaseCount {
                place_id: id.to_string(),
                date: start + chrono::Days::new(u64::from(i)),
                confirmed: Some(per_day * f64::from(i)),
                deaths: Some(per_day * f64::from(i) / 100.0),
            })
            .collect()
    }

    fn us_data() -> SourceData {
        let mut cases = counts("84000006", 1000.0);
        cases.extend(counts("84000036", 500.0));
        SourceData {
            places: vec![
                place("840", "US", "", None, 58_000_000.0),
                place("84000006", "US", "California", Some(6), 39_000_000.0),
                place("84000036", "US", "New York", Some(36), 19_000_000.0),
            ],
            cases,
            ..SourceData::default()
        }
    }

    fn options(stages: &[Stage]) -> CombineOptions {
        CombineOptions {
            stages: stages.iter().copied().collect(),
            cache_dir: std::env::temp_dir().join("covid_atlas_combine_unused"),
            rebuild: false,
        }
    }

    #[test]
    fn default_stages_leave_out_wastewater() {
        let defaults = Stage::defaults();
        assert_eq!(defaults.len(), Stage::ALL.len() - 1);
        assert!(!defaults.contains(&Stage::Wastewater));
        assert!(defaults.contains(&Stage::Maps));
    }

    #[test]
    fn stage_names_parse_and_print_in_snake_case() {
        assert_eq!("wastewater".parse::<Stage>().unwrap(), Stage::Wastewater);
        assert_eq!(Stage::Maps.to_string(), "maps");
        assert!("nope".parse::<Stage>().is_err());
    }

    #[test]
    fn cache_key_lists_sorted_stage_names() {
        let stages: BTreeSet<Stage> = [Stage::Maps, Stage::Covid, Stage::Policy].into_iter().collect();
        assert_eq!(cache_key(&stages), "https://plague.wtf/world:covid,policy,maps");
        let reordered: BTreeSet<Stage> = [Stage::Policy, Stage::Maps, Stage::Covid].into_iter().collect();
        assert_eq!(cache_key(&stages), cache_key(&reordered));
    }

    #[test]
    fn covid_stage_builds_metrics_for_every_state() {
        let world = build_world(&us_data(), &options(&[Stage::Covid]), AllowList::empty(), &*null_progress()).unwrap();
        let us = &world.subregions["US"];
        for state in ["California", "New York"] {
            let covid = us.subregions[state].metrics.category(Category::Covid).unwrap();
            assert!(covid.contains_key(POSITIVES), "{state}");
            assert!(covid.contains_key(DEATHS), "{state}");
        }
        assert!(us.metrics.total(POPULATION) > 0.0);
        assert!(world.metrics.category(Category::Map).is_none_or(std::collections::BTreeMap::is_empty));
    }

    #[test]
    fn serology_stage_tolerates_census_regions() {
        let sero = |code: &str, name: &str| {
            ["2021-01-01", "2021-02-01", "2021-03-01"].map(|month| SeroPrevalence {
                region_code: code.to_string(),
                region_name: name.to_string(),
                month: date(month),
                infection: Some(12.0),
                combined: Some(30.0),
            })
        };
        let mut data = us_data();
        data.serology.extend(sero("CA", "California"));
        data.serology.extend(sero("CR2", "Census Region 2"));

        let world = build_world(
            &data,
            &options(&[Stage::Covid, Stage::Serology]),
            AllowList::empty(),
            &*null_progress(),
        )
        .unwrap();
        let california = &world.subregions["US"].subregions["California"];
        assert!(california.metrics.metric(Category::Serology, serology::INFECTED_OR_VAX).is_some());
        assert!(world.subregions["US"].metrics.is_empty(Category::Serology));
    }

    #[test]
    fn maps_stage_adds_map_metrics() {
        let world = build_world(
            &us_data(),
            &options(&[Stage::Covid, Stage::Maps]),
            AllowList::empty(),
            &*null_progress(),
        )
        .unwrap();
        let california = &world.subregions["US"].subregions["California"];
        assert!(california.metrics.category(Category::Map).is_some_and(|m| !m.is_empty()));
    }

    #[test]
    fn unrecognized_anomalies_fail_the_run() {
        let mut data = us_data();
        data.policy.push(PolicyEvent {
            state_fips: 99,
            date: date("2020-03-19"),
            area: "Stay at home".to_string(),
            policy: "Stay at home order".to_string(),
            score: -3,
            emoji: "🏠".to_string(),
        });
        let err = build_world(&data, &options(&[Stage::Covid, Stage::Policy]), AllowList::empty(), &*null_progress())
            .unwrap_err();
        let CombineError::Validation(messages) = err else {
            panic!("expected validation failure, got {err}");
        };
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("99"), "{messages:?}");
    }

    #[test]
    fn extra_allow_list_tolerates_anomalies() {
        let mut data = us_data();
        data.policy.push(PolicyEvent {
            state_fips: 99,
            date: date("2020-03-19"),
            area: "Stay at home".to_string(),
            policy: "Stay at home order".to_string(),
            score: -3,
            emoji: "🏠".to_string(),
        });
        let allow = AllowList::from_patterns([r".*\b99\b.*"]).unwrap();
        let world = build_world(&data, &options(&[Stage::Covid, Stage::Policy]), allow, &*null_progress()).unwrap();
        assert!(world.subregions.contains_key("US"));
    }
}
