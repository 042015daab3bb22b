//! Vaccination progress.

use chrono::NaiveDate;
use covid_atlas_region::require_population;
use covid_atlas_region_models::{Category, Credits, Region, countries, fips};
use covid_atlas_source_models::{CdcVaccination, OwidVaccination, SourceId};
use covid_atlas_warnings::Anomaly;

use crate::metric::{self, Column, Style, style};
use crate::scale::{PER_5K, PER_100};
use crate::{Atlas, MergeError, WarningCollector, group_by};

pub const ANY_DOSE: &str = "people given any doses / 100p";
pub const FULLY_VACCINATED: &str = "people fully vaccinated / 100p";
pub const BOOSTERS_GIVEN: &str = "booster doses given / 100p";
pub const TOTAL_BOOSTERS: &str = "total booster doses / 100p";
pub const DAILY_DOSES: &str = "doses / day / 5Kp";

const ANY_DOSE_STYLE: Style = style("tab:olive", 0, 1.2);
const FULLY_VACCINATED_STYLE: Style = style("tab:green", 1, 1.3);
const BOOSTERS_STYLE: Style = style("tab:purple", 1, 1.4);
const DAILY_DOSES_STYLE: Style = style("tab:cyan", 0, 1.5);

/// Total recording the fully vaccinated head count.
pub const VACCINATED: &str = "vaccinated";

/// Whether a vaccinated head count is plausible for `pop`.
fn in_bounds(vaxxed: f64, pop: f64) -> bool {
    (0.0..=pop.mul_add(1.1, 10_000.0)).contains(&vaxxed)
}

fn sorted_column<T>(rows: &[&T], date: impl Fn(&T) -> NaiveDate, field: impl Fn(&T) -> Option<f64>) -> Column {
    let mut column: Column = rows.iter().map(|r| (date(r), field(r))).collect();
    column.sort_by_key(|(d, _)| *d);
    column
}

/// Attaches CDC county vaccination counts.
///
/// Counties whose completed-series column is entirely blank are skipped
/// without a warning.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a county reports twice on one day.
pub fn merge_cdc(
    atlas: &mut Atlas,
    rows: &[CdcVaccination],
    warnings: &mut WarningCollector,
) -> Result<(), MergeError> {
    let credits = SourceId::CdcVaccinations.credits();
    let mut merged = 0_usize;

    for (fips, rows) in group_by(rows, |r| r.fips) {
        let Some(region) = warnings.check(atlas.resolve_fips(fips, "CDC vax")) else {
            continue;
        };
        let Some(pop) = warnings.check(require_population(region)) else {
            continue;
        };

        let first_dose = metric::forward_filled(sorted_column(&rows, |r| r.date, |r| r.first_dose));
        let complete = metric::forward_filled(sorted_column(&rows, |r| r.date, |r| r.series_complete));
        let boosters = metric::forward_filled(sorted_column(&rows, |r| r.date, |r| r.boosters));
        if complete.iter().all(|(_, v)| v.is_none()) {
            continue;
        }

        let vaxxed = metric::last_reading(&complete).unwrap_or(f64::NAN);
        if !in_bounds(vaxxed, pop) {
            warnings.warn(&Anomaly::out_of_bounds("CDC vax", region.debug_path(), vaxxed, pop));
            continue;
        }

        attach_levels(
            region,
            &credits,
            vaxxed,
            [
                (ANY_DOSE, ANY_DOSE_STYLE, first_dose),
                (FULLY_VACCINATED, FULLY_VACCINATED_STYLE, complete),
                (BOOSTERS_GIVEN, BOOSTERS_STYLE, boosters),
            ],
        )?;
        merged += 1;
    }

    log::info!("Merged CDC vaccinations into {merged} counties");
    Ok(())
}

/// Stores the vaccinated total and per-100 level metrics on `region`.
fn attach_levels<const N: usize>(
    region: &mut Region,
    credits: &Credits,
    vaxxed: f64,
    columns: [(&str, Style, Column); N],
) -> Result<(), MergeError> {
    let pop = region.metrics.population();
    let path = region.debug_path();
    region.add_credits(credits);
    region.metrics.set_total(VACCINATED, vaxxed);
    let vaccine = region.metrics.category_mut(Category::Vaccine);
    for (name, style, column) in columns {
        let series = metric::levels(metric::scaled(column, PER_100 / pop))
            .map_err(MergeError::series(name, &path))?;
        vaccine.insert(name.to_string(), style.metric(series, credits));
    }
    Ok(())
}

const OWID_WHAT: &str = "OWID vax";

/// UK nations reported under OWID pseudo-codes.
const OWID_UK_NATIONS: &[(&str, &str)] = &[
    ("OWID_ENG", "England"),
    ("OWID_SCT", "Scotland"),
    ("OWID_NIR", "Northern Ireland"),
    ("OWID_WLS", "Wales"),
];

/// Finds the region for an OWID `(iso_code, state)` group.
fn owid_region<'a>(atlas: &'a mut Atlas, iso_code: &str, state: &str) -> Result<&'a mut Region, Anomaly> {
    if iso_code == "OWID_WRL" {
        return Ok(&mut atlas.world);
    }

    if let Some((_, nation)) = OWID_UK_NATIONS.iter().find(|(code, _)| *code == iso_code) {
        let gb = atlas.resolve_iso2("GB", OWID_WHAT)?;
        return gb
            .subregions
            .get_mut(*nation)
            .ok_or_else(|| Anomaly::unknown("OWID vax subregion", nation));
    }

    // US states resolve through FIPS.
    if !state.is_empty() && countries::by_alpha3(iso_code).is_some_and(|c| c.alpha2 == "US") {
        let name = state.replace(" State", "");
        let us_state =
            fips::by_name(&name).ok_or_else(|| Anomaly::unknown("OWID vax state", state))?;
        return atlas
            .by_fips_mut(us_state.fips)
            .ok_or_else(|| Anomaly::missing("OWID vax FIPS", format!("{:02}", us_state.fips)));
    }

    let country = atlas.resolve_iso3(iso_code, OWID_WHAT)?;
    if state.is_empty() {
        return Ok(country);
    }
    country
        .subregions
        .get_mut(state)
        .ok_or_else(|| Anomaly::unknown("OWID vax subregion", state))
}

/// Attaches OWID country, UK nation, US state, and world vaccination data.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a place reports twice on one day.
pub fn merge_owid(
    atlas: &mut Atlas,
    rows: &[OwidVaccination],
    warnings: &mut WarningCollector,
) -> Result<(), MergeError> {
    let credits = SourceId::OwidVaccinations.credits();
    let mut merged = 0_usize;

    for ((iso_code, state), rows) in group_by(rows, |r| (r.iso_code.clone(), r.state.clone())) {
        let Some(region) = warnings.check(owid_region(atlas, &iso_code, &state)) else {
            continue;
        };
        let Some(pop) = warnings.check(require_population(region)) else {
            continue;
        };

        let column = |field: fn(&OwidVaccination) -> Option<f64>| sorted_column(&rows, |r| r.date, field);
        let fully = metric::forward_filled(column(|r| r.people_fully_vaccinated));
        if fully.iter().all(|(_, v)| v.is_none()) {
            continue;
        }
        let vaxxed = metric::last_reading(&fully).unwrap_or(f64::NAN);
        if !in_bounds(vaxxed, pop) {
            warnings.warn(&Anomaly::out_of_bounds("OWID vax", region.debug_path(), vaxxed, pop));
            continue;
        }

        attach_levels(
            region,
            &credits,
            vaxxed,
            [
                (ANY_DOSE, ANY_DOSE_STYLE, metric::forward_filled(column(|r| r.people_vaccinated))),
                (FULLY_VACCINATED, FULLY_VACCINATED_STYLE, fully),
                (TOTAL_BOOSTERS, BOOSTERS_STYLE, metric::forward_filled(column(|r| r.total_boosters))),
            ],
        )?;

        let daily = metric::scaled(column(|r| r.daily_vaccinations), PER_5K / pop);
        let raw: Vec<Option<f64>> = metric::scaled(column(|r| r.daily_vaccinations_raw), PER_5K / pop)
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        let series = metric::levels_with_raw(daily, &raw)
            .map_err(MergeError::series(DAILY_DOSES, region.debug_path()))?;
        region
            .metrics
            .category_mut(Category::Vaccine)
            .insert(DAILY_DOSES.into(), DAILY_DOSES_STYLE.metric(series, &credits));
        merged += 1;
    }

    log::info!("Merged OWID vaccinations into {merged} regions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{atlas, collector, days};

    fn cdc(fips: u32, complete: &[Option<f64>]) -> Vec<CdcVaccination> {
        days("2021-03-01", complete.len() as u64)
            .zip(complete)
            .map(|(date, c)| CdcVaccination {
                fips,
                date,
                first_dose: c.map(|c| c * 2.0),
                series_complete: *c,
                boosters: None,
            })
            .collect()
    }

    #[test]
    fn cdc_counts_become_percentages() {
        let mut atlas = atlas();
        let mut warnings = collector();
        merge_cdc(&mut atlas, &cdc(6085, &[Some(19_000.0), None, Some(190_000.0)]), &mut warnings).unwrap();
        assert!(warnings.is_clean());

        let sc = atlas.by_fips(6085).unwrap();
        assert!((sc.metrics.total(VACCINATED) - 190_000.0).abs() < 1e-9);
        let fully = &sc.metrics.metric(Category::Vaccine, FULLY_VACCINATED).unwrap().series;
        let v: Vec<_> = fully.samples().iter().map(|s| s.value.unwrap()).collect();
        assert!((v[1] - 1.0).abs() < 1e-9, "forward filled");
        assert!((v[2] - 10.0).abs() < 1e-9);
        assert!(sc.metrics.metric(Category::Vaccine, BOOSTERS_GIVEN).is_some());
    }

    #[test]
    fn cdc_skips_blank_counties_and_bounds_values() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let mut rows = cdc(6085, &[Some(1e9)]);
        rows.extend(cdc(36, &[None, None]));
        rows.extend(cdc(66010, &[Some(1.0)]));
        merge_cdc(&mut atlas, &rows, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            [
                "Bad CDC vax: World/US/California/Santa Clara (1000000000/1900000p)",
                "Missing CDC vax FIPS: 66010",
            ]
        );
        assert!(atlas.by_fips(36).unwrap().metrics.is_empty(Category::Vaccine));
    }

    fn owid(iso_code: &str, state: &str, fully: f64) -> OwidVaccination {
        OwidVaccination {
            iso_code: iso_code.into(),
            state: state.into(),
            date: days("2021-03-01", 1).next().unwrap(),
            people_vaccinated: Some(fully),
            people_fully_vaccinated: Some(fully),
            total_boosters: None,
            daily_vaccinations: Some(5.0),
            daily_vaccinations_raw: Some(7.0),
        }
    }

    #[test]
    fn owid_routes_world_states_and_nations() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let rows = vec![
            owid("OWID_WRL", "", 1000.0),
            owid("USA", "New York State", 1900.0),
            owid("USA", "Bureau of Prisons", 1.0),
            owid("OWID_ENG", "", 5600.0),
            owid("OWID_SCT", "", 1.0),
            owid("OWID_KOS", "", 1.0),
        ];
        merge_owid(&mut atlas, &rows, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            [
                "Unknown OWID vax country code: OWID_KOS",
                "Unknown OWID vax subregion: Scotland",
                "Unknown OWID vax state: Bureau of Prisons",
            ]
        );

        assert!(atlas.world.metrics.total(VACCINATED) > 0.0);
        let ny = atlas.by_fips(36).unwrap();
        let fully = ny.metrics.metric(Category::Vaccine, FULLY_VACCINATED).unwrap();
        assert!((fully.series.last_valid().unwrap().1 - 0.01).abs() < 1e-12);
        let daily = ny.metrics.metric(Category::Vaccine, DAILY_DOSES).unwrap();
        let sample = daily.series.samples()[0];
        assert!((sample.value.unwrap() - 5.0 * 5000.0 / 19e6).abs() < 1e-12);
        assert!((sample.raw.unwrap() - 7.0 * 5000.0 / 19e6).abs() < 1e-12);

        let england = &atlas.by_iso2("GB").unwrap().subregions["England"];
        assert!((england.metrics.total(VACCINATED) - 5600.0).abs() < 1e-9);
    }
}
