//! Hospital occupancy and admissions.
//!
//! Country data comes from OWID, keyed by ISO-3 code (the UK nations use
//! `OWID_*` pseudo-codes). US county data comes from HHS facility
//! reports, summed per county and collection week.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use covid_atlas_region::require_population;
use covid_atlas_region_models::{Category, Region};
use covid_atlas_source_models::{HhsFacilityWeek, HhsValues, OwidCadence, OwidHospitalValue, SourceId};
use covid_atlas_warnings::Anomaly;

use crate::metric::{self, Column, Style, style};
use crate::scale::{PER_1M, PER_10M, PER_100K};
use crate::{Atlas, MergeError, WarningCollector, group_by};

pub const CAPACITY: &str = "capacity / 100Kp";
pub const TOTAL_USE: &str = "total use / 100Kp";
pub const COVID_USE: &str = "COVID use / 100Kp";
pub const COVID_ADMITS: &str = "COVID admits / day / 1Mp";
pub const ICU_CAPACITY: &str = "ICU capacity / 1Mp";
pub const ICU_TOTAL_USE: &str = "ICU total use / 1Mp";
pub const ICU_COVID_USE: &str = "ICU COVID use / 1Mp";
pub const ICU_COVID_ADMITS: &str = "ICU COVID admits / day / 10Mp";

/// An OWID indicator and the metric it feeds.
struct OwidMetric {
    cadence: OwidCadence,
    indicator: &'static str,
    name: &'static str,
    factor: f64,
    style: Style,
}

const OWID_METRICS: &[OwidMetric] = &[
    OwidMetric {
        cadence: OwidCadence::Weekly,
        indicator: "new hospital admissions",
        name: COVID_ADMITS,
        factor: PER_1M,
        style: style("black", 0, 1.3),
    },
    OwidMetric {
        cadence: OwidCadence::Weekly,
        indicator: "new ICU admissions",
        name: ICU_COVID_ADMITS,
        factor: PER_10M,
        style: style("tab:purple", 0, 1.7),
    },
    OwidMetric {
        cadence: OwidCadence::Daily,
        indicator: "hospital occupancy",
        name: COVID_USE,
        factor: PER_100K,
        style: style("tab:gray", 1, 1.2),
    },
    OwidMetric {
        cadence: OwidCadence::Daily,
        indicator: "ICU occupancy",
        name: ICU_COVID_USE,
        factor: PER_1M,
        style: style("tab:pink", 1, 1.6),
    },
];

const OWID_WHAT: &str = "OWID";

/// UK nations reported under OWID pseudo-codes.
const OWID_SUBREGIONS: &[(&str, &str, &str)] = &[
    ("OWID_ENG", "GBR", "England"),
    ("OWID_SCT", "GBR", "Scotland"),
    ("OWID_WLS", "GBR", "Wales"),
    ("OWID_NIR", "GBR", "Northern Ireland"),
];

/// Resolves an OWID ISO-3 or pseudo-code to a region with population.
fn owid_region<'a>(atlas: &'a mut Atlas, code: &str) -> Result<&'a mut Region, Anomaly> {
    let (iso3, sub) = OWID_SUBREGIONS
        .iter()
        .find(|(owid, _, _)| *owid == code)
        .map_or((code, None), |(_, iso3, sub)| (*iso3, Some(*sub)));

    let mut region = atlas.resolve_iso3(iso3, OWID_WHAT)?;
    if let Some(sub) = sub {
        let path = region.debug_path();
        region = region
            .subregions
            .get_mut(sub)
            .ok_or_else(|| Anomaly::missing("OWID subregion", format!("{path}/{sub}")))?;
    }
    require_population(region)?;
    Ok(region)
}

/// Attaches OWID occupancy and admissions metrics.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if an indicator has two values for one
/// day in one place.
pub fn merge_owid(
    atlas: &mut Atlas,
    values: &[OwidHospitalValue],
    warnings: &mut WarningCollector,
) -> Result<(), MergeError> {
    let credits = SourceId::OwidHospitalizations.credits();
    let mut merged = 0_usize;

    for (code, rows) in group_by(values, |v| v.iso_code.clone()) {
        let Some(region) = warnings.check(owid_region(atlas, &code)) else {
            continue;
        };
        let path = region.debug_path();
        let pop = region.metrics.population();

        let mut hospital = BTreeMap::new();
        for def in OWID_METRICS {
            let column: Column = rows
                .iter()
                .filter(|v| v.cadence == def.cadence && v.indicator == def.indicator)
                .map(|v| (v.date, Some(v.value)))
                .collect();
            if column.is_empty() {
                continue;
            }
            let series = metric::levels(metric::scaled(column, def.factor / pop))
                .map_err(MergeError::series(def.name, &path))?;
            hospital.insert(def.name.to_string(), def.style.metric(series, &credits));
        }

        region.metrics.category_mut(Category::Hospital).extend(hospital);
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged OWID hospital data into {merged} regions");
    Ok(())
}

/// Sum over facilities of one measure, with negative reports ignored.
///
/// Blank when no facility reported the measure.
fn facility_sum(rows: &[&HhsFacilityWeek], field: impl Fn(&HhsValues) -> Option<f64>) -> Option<f64> {
    rows.iter()
        .filter_map(|r| field(&r.values))
        .map(|v| v.max(0.0))
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Adult plus pediatric, confirmed plus suspected; blank if none reported.
fn admissions(v: &HhsValues) -> Option<f64> {
    [
        v.admission_adult_confirmed,
        v.admission_adult_suspected,
        v.admission_pediatric_confirmed,
        v.admission_pediatric_suspected,
    ]
    .into_iter()
    .flatten()
    .map(|v| v.max(0.0))
    .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// An HHS measure and the metric it feeds.
struct HhsMetric {
    name: &'static str,
    field: fn(&HhsValues) -> Option<f64>,
    factor: f64,
    style: Style,
}

const HHS_METRICS: &[HhsMetric] = &[
    HhsMetric {
        name: CAPACITY,
        field: |v: &HhsValues| v.inpatient_beds,
        factor: PER_100K,
        style: style("tab:gray", -1, 1.0),
    },
    HhsMetric {
        name: TOTAL_USE,
        field: |v: &HhsValues| v.inpatient_beds_used,
        factor: PER_100K,
        style: style("tab:gray", 0, 1.1),
    },
    HhsMetric {
        name: COVID_USE,
        field: |v: &HhsValues| v.inpatient_beds_used_covid,
        factor: PER_100K,
        style: style("tab:gray", 1, 1.2),
    },
    HhsMetric {
        name: COVID_ADMITS,
        field: admissions,
        // Admissions are reported as 7-day sums.
        factor: PER_1M / 7.0,
        style: style("black", 0, 1.3),
    },
    HhsMetric {
        name: ICU_CAPACITY,
        field: |v: &HhsValues| v.icu_beds,
        factor: PER_1M,
        style: style("tab:pink", -1, 1.4),
    },
    HhsMetric {
        name: ICU_TOTAL_USE,
        field: |v: &HhsValues| v.icu_beds_used,
        factor: PER_1M,
        style: style("tab:pink", 0, 1.5),
    },
    HhsMetric {
        name: ICU_COVID_USE,
        field: |v: &HhsValues| v.icu_beds_used_covid,
        factor: PER_1M,
        style: style("tab:pink", 1, 1.6),
    },
];

/// Attaches HHS facility data, summed per county, to county regions.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a weekly series cannot be built.
pub fn merge_hhs(
    atlas: &mut Atlas,
    facilities: &[HhsFacilityWeek],
    warnings: &mut WarningCollector,
) -> Result<(), MergeError> {
    let credits = SourceId::Hhs.credits();
    let mut merged = 0_usize;

    for (fips, rows) in group_by(facilities, |f| f.fips) {
        let Some(region) = atlas.by_fips_mut(fips) else {
            let first = rows[0];
            warnings.warn(&Anomaly::missing(
                "HHS hospital FIPS",
                format!("{fips} ({} {} {})", first.city, first.state, first.zip),
            ));
            continue;
        };
        let Some(pop) = warnings.check(require_population(region)) else {
            continue;
        };
        let path = region.debug_path();

        let weeks: BTreeMap<NaiveDate, Vec<&HhsFacilityWeek>> =
            group_by(rows.iter().copied(), |f| f.collection_week);

        let hospital = region.metrics.category_mut(Category::Hospital);
        for def in HHS_METRICS {
            let column: Column = weeks
                .iter()
                .map(|(week, rows)| (*week, facility_sum(rows, def.field)))
                .collect();
            let series = metric::levels(metric::scaled(column, def.factor / pop))
                .map_err(MergeError::series(def.name, &path))?;
            hospital.insert(def.name.to_string(), def.style.metric(series, &credits));
        }
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged HHS hospital data into {merged} counties");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{atlas, collector, date};

    fn owid(code: &str, day: &str, cadence: OwidCadence, indicator: &str, value: f64) -> OwidHospitalValue {
        OwidHospitalValue {
            iso_code: code.into(),
            date: date(day),
            cadence,
            indicator: indicator.into(),
            value,
        }
    }

    #[test]
    fn owid_indicators_become_per_capita_metrics() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let values = vec![
            owid("DEU", "2021-01-01", OwidCadence::Daily, "hospital occupancy", 830.0),
            owid("DEU", "2021-01-02", OwidCadence::Daily, "hospital occupancy", 1660.0),
            owid("DEU", "2021-01-03", OwidCadence::Weekly, "new hospital admissions", 83.0),
        ];
        merge_owid(&mut atlas, &values, &mut warnings).unwrap();
        assert!(warnings.is_clean());

        let de = atlas.by_iso2("DE").unwrap();
        let use_ = de.metrics.metric(Category::Hospital, COVID_USE).unwrap();
        assert_eq!(use_.series.len(), 2);
        assert!((use_.series.last_valid().unwrap().1 - 2.0).abs() < 1e-9);
        let admits = de.metrics.metric(Category::Hospital, COVID_ADMITS).unwrap();
        assert!((admits.series.last_valid().unwrap().1 - 1.0).abs() < 1e-9);
        assert_eq!(admits.color, "black");
        assert!(de.metrics.metric(Category::Hospital, ICU_COVID_USE).is_none());
    }

    #[test]
    fn owid_pseudo_codes_resolve_to_uk_nations() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let values = vec![
            owid("OWID_ENG", "2021-01-01", OwidCadence::Daily, "ICU occupancy", 56.0),
            owid("OWID_SCT", "2021-01-01", OwidCadence::Daily, "ICU occupancy", 5.0),
            owid("OWID_WRL", "2021-01-01", OwidCadence::Daily, "ICU occupancy", 5.0),
        ];
        merge_owid(&mut atlas, &values, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            [
                "Missing OWID subregion: World/GB/Scotland",
                "Unknown OWID country code: OWID_WRL",
            ]
        );
        let gb = atlas.by_iso2("GB").unwrap();
        let england = &gb.subregions["England"];
        assert!(england.metrics.metric(Category::Hospital, ICU_COVID_USE).is_some());
    }

    fn facility(pk: &str, week: &str, covid_use: f64, admits: f64) -> HhsFacilityWeek {
        HhsFacilityWeek {
            fips: 6085,
            hospital_pk: pk.into(),
            collection_week: date(week),
            city: "San Jose".into(),
            state: "CA".into(),
            zip: "95128".into(),
            values: HhsValues {
                inpatient_beds_used_covid: Some(covid_use),
                admission_adult_confirmed: Some(admits),
                admission_pediatric_suspected: Some(0.0),
                ..HhsValues::default()
            },
        }
    }

    #[test]
    fn hhs_sums_facilities_per_week() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let rows = vec![
            facility("a", "2021-01-01", 10.0, 70.0),
            facility("b", "2021-01-01", -999_999.0, 63.0),
            facility("a", "2021-01-08", 9.0, 0.0),
            facility("b", "2021-01-08", 10.0, 0.0),
        ];
        merge_hhs(&mut atlas, &rows, &mut warnings).unwrap();
        assert!(warnings.is_clean());

        let sc = atlas.by_fips(6085).unwrap();
        let covid_use = &sc.metrics.metric(Category::Hospital, COVID_USE).unwrap().series;
        let values: Vec<_> = covid_use.samples().iter().map(|s| s.value.unwrap()).collect();
        assert!((values[0] - 10.0 * 1e5 / 1.9e6).abs() < 1e-9);
        assert!((values[1] - 19.0 * 1e5 / 1.9e6).abs() < 1e-9);

        let admits = &sc.metrics.metric(Category::Hospital, COVID_ADMITS).unwrap().series;
        assert!((admits.samples()[0].value.unwrap() - 133.0 / 7.0 * 1e6 / 1.9e6).abs() < 1e-9);

        let capacity = &sc.metrics.metric(Category::Hospital, CAPACITY).unwrap().series;
        assert_eq!(capacity.count(), 0);
    }

    #[test]
    fn hhs_unknown_county_names_the_facility() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let mut row = facility("a", "2021-01-01", 1.0, 1.0);
        row.fips = 66010;
        row.city = "Tamuning".into();
        row.state = "GU".into();
        row.zip = "96913".into();
        merge_hhs(&mut atlas, &[row], &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            ["Missing HHS hospital FIPS: 66010 (Tamuning GU 96913)"]
        );
    }
}
