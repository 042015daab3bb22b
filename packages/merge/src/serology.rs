//! US blood-donor seroprevalence.
//!
//! Survey regions are the whole US (`All`), states, and parts of states
//! (`CA-1`). A state part is stored on its state with the part name as a
//! suffix, so one region can carry several pairs of serology metrics.

use chrono::Days;
use covid_atlas_region_models::{Category, fips};
use covid_atlas_source_models::{SeroPrevalence, SourceId};
use covid_atlas_warnings::Anomaly;

use crate::metric::{self, Column, style};
use crate::palette::{TAB20B, TAB20C, cycle};
use crate::{Atlas, MergeError, WarningCollector, group_by};

/// Percent with antibodies from infection or vaccination.
pub const INFECTED_OR_VAX: &str = "infected or vax";
/// Percent with antibodies from infection.
pub const INFECTED: &str = "infected";

/// Survey months are plotted mid-month.
const MID_MONTH: Days = Days::new(14);

/// Code of the nationwide survey region.
const NATIONWIDE: &str = "all";

/// Shortened spellings for survey part names; compound directions first.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("Southeastern", "SE."),
    ("Northeastern", "NE."),
    ("Southwestern", "SW."),
    ("Northwestern", "NW."),
    ("Southern", "S."),
    ("Northern", "N."),
    ("Western", "W."),
    ("Eastern", "E."),
];

/// Suffix distinguishing a survey part from its whole state, e.g.
/// `" (N. CA)"`, or empty when the survey covers the whole region.
fn part_suffix(survey_name: &str, region_name: &str) -> String {
    let name = survey_name.replace("Region", "");
    let mut name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() || name.eq_ignore_ascii_case(region_name) {
        return String::new();
    }

    let mut states: Vec<_> = fips::US_STATES.iter().collect();
    states.sort_by_key(|s| std::cmp::Reverse(s.name.len()));
    for state in states {
        name = name.replace(state.name, state.abbr);
    }
    for (long, short) in ABBREVIATIONS {
        name = name.replace(long, short);
    }
    format!(" ({name})")
}

/// Attaches seroprevalence levels to the US and its states.
///
/// Codes that are not a state (multi-state census regions) and states
/// without a region are reported as anomalies.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a survey region repeats a month.
pub fn merge(atlas: &mut Atlas, rows: &[SeroPrevalence], warnings: &mut WarningCollector) -> Result<(), MergeError> {
    let credits = SourceId::CdcSerology.credits();
    let mut merged = 0_usize;

    for ((code, survey_name), rows) in group_by(rows, |r| (r.region_code.clone(), r.region_name.clone())) {
        let region = if code.eq_ignore_ascii_case(NATIONWIDE) {
            warnings.check(atlas.resolve_iso2("US", "CDC sero"))
        } else {
            let state_code = code.split('-').next().unwrap_or_default();
            let Some(state) = fips::by_abbr(state_code) else {
                warnings.warn(&Anomaly::unknown("CDC sero state", format!("{code} ({survey_name})")));
                continue;
            };
            warnings.check(
                atlas
                    .by_fips_mut(state.fips)
                    .ok_or_else(|| Anomaly::missing("CDC sero FIPS", format!("{} ({})", state.fips, state.name))),
            )
        };
        let Some(region) = region else {
            continue;
        };

        let suffix = if code.eq_ignore_ascii_case(NATIONWIDE) {
            String::new()
        } else {
            part_suffix(&survey_name, &region.name)
        };
        let path = region.debug_path();

        let mid_month = |r: &&SeroPrevalence| r.month.checked_add_days(MID_MONTH).unwrap_or(r.month);
        let combined: Column = rows.iter().map(|r| (mid_month(r), r.combined)).collect();
        let infection: Column = rows.iter().map(|r| (mid_month(r), r.infection)).collect();

        let serology = region.metrics.category_mut(Category::Serology);
        let index = serology.len() / 2;
        for (name, column, style) in [
            (INFECTED_OR_VAX, combined, style(cycle(&TAB20B, index), 1, 1.0)),
            (INFECTED, infection, style(cycle(&TAB20C, index + 4), 0, 1.1)),
        ] {
            let name = format!("{name}{suffix}");
            let series = metric::levels(column).map_err(MergeError::series(name.as_str(), &path))?;
            serology.insert(name, style.metric(series, &credits));
        }
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged {merged} CDC seroprevalence survey regions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use covid_atlas_warnings::AllowList;

    use super::*;
    use crate::test_support::{atlas, collector, date};

    fn rows(code: &str, name: &str, infection: f64, combined: f64) -> Vec<SeroPrevalence> {
        ["2021-01-01", "2021-02-01", "2021-03-01"]
            .into_iter()
            .map(|month| SeroPrevalence {
                region_code: code.into(),
                region_name: name.into(),
                month: date(month),
                infection: Some(infection),
                combined: Some(combined),
            })
            .collect()
    }

    fn last(atlas: &Atlas, fips: u32, name: &str) -> (NaiveDate, f64) {
        atlas
            .by_fips(fips)
            .and_then(|r| r.metrics.metric(Category::Serology, name))
            .and_then(|m| m.series.last_valid())
            .unwrap()
    }

    #[test]
    fn state_parts_become_suffixed_metric_pairs() {
        let mut atlas = atlas();
        let mut data = rows("CA", "California", 10.0, 30.0);
        data.extend(rows("CA-1", "Northern California Region", 12.0, 35.0));
        let mut warnings = collector();
        merge(&mut atlas, &data, &mut warnings).unwrap();
        assert!(warnings.is_clean(), "{:?}", warnings.unknown());

        assert_eq!(last(&atlas, 6, "infected or vax"), (date("2021-03-15"), 30.0));
        assert_eq!(last(&atlas, 6, "infected"), (date("2021-03-15"), 10.0));
        assert_eq!(last(&atlas, 6, "infected or vax (N. CA)").1, 35.0);

        let ca = atlas.by_fips(6).unwrap();
        let whole = ca.metrics.metric(Category::Serology, "infected or vax").unwrap();
        let part = ca.metrics.metric(Category::Serology, "infected or vax (N. CA)").unwrap();
        assert_eq!((whole.emphasis, part.emphasis), (1, 1));
        assert_ne!(whole.color, part.color);
        assert_eq!(ca.metrics.metric(Category::Serology, "infected (N. CA)").unwrap().emphasis, 0);
    }

    #[test]
    fn nationwide_rows_go_to_the_country() {
        let mut atlas = atlas();
        merge(&mut atlas, &rows("All", "All", 20.0, 50.0), &mut collector()).unwrap();
        let us = atlas.by_iso2("US").unwrap();
        assert!(us.metrics.metric(Category::Serology, "infected or vax").is_some());
        assert!(us.credits.contains_key("https://covid.cdc.gov/covid-data-tracker/"));
    }

    #[test]
    fn census_regions_and_missing_states_are_reported() {
        let mut atlas = atlas();
        let mut data = rows("CR1", "Census Region 1", 10.0, 30.0);
        data.extend(rows("TX", "Texas", 10.0, 30.0));
        let mut warnings = collector();
        merge(&mut atlas, &data, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            [
                "Unknown CDC sero state: CR1 (Census Region 1)",
                "Missing CDC sero FIPS: 48 (Texas)",
            ]
        );

        let mut tolerant = WarningCollector::new(AllowList::known());
        merge(&mut atlas, &rows("CR1", "Census Region 1", 1.0, 2.0), &mut tolerant).unwrap();
        assert!(tolerant.is_clean());
    }

    #[test]
    fn part_names_are_abbreviated() {
        assert_eq!(part_suffix("California", "California"), "");
        assert_eq!(part_suffix("Region", "California"), "");
        assert_eq!(part_suffix("Southwestern Virginia", "Virginia"), " (SW. VA)");
        assert_eq!(part_suffix("Eastern West Virginia", "West Virginia"), " (E. WV)");
    }
}
