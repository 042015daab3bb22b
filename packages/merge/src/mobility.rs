//! Community mobility relative to the pre-pandemic baseline.

use covid_atlas_region_models::{Category, Region};
use covid_atlas_source_models::{MobilityChanges, MobilityReport, SourceId};

use crate::metric::{self, Column, Style, style};
use crate::{Atlas, MergeError, group_by};

/// A place category and the metric it feeds.
struct MobilityMetric {
    name: &'static str,
    field: fn(&MobilityChanges) -> Option<f64>,
    style: Style,
}

const METRICS: &[MobilityMetric] = &[
    MobilityMetric {
        name: "residential",
        field: |c: &MobilityChanges| c.residential,
        style: style("tab:brown", 1, 1.0),
    },
    MobilityMetric {
        name: "retail / recreation",
        field: |c: &MobilityChanges| c.retail_and_recreation,
        style: style("tab:orange", 1, 1.1),
    },
    MobilityMetric {
        name: "workplaces",
        field: |c: &MobilityChanges| c.workplaces,
        style: style("tab:red", 1, 1.2),
    },
    MobilityMetric {
        name: "grocery / pharmacy",
        field: |c: &MobilityChanges| c.grocery_and_pharmacy,
        style: style("tab:blue", 0, 1.4),
    },
    MobilityMetric {
        name: "transit stations",
        field: |c: &MobilityChanges| c.transit_stations,
        style: style("tab:purple", 0, 1.5),
    },
];

/// Baseline level that percent changes are relative to.
const BASELINE: f64 = 100.0;

/// Finds the region a report covers: by FIPS when present, else by
/// country code and then subregion names.
fn report_region<'a>(atlas: &'a mut Atlas, report: &MobilityReport) -> Option<&'a mut Region> {
    if let Some(fips) = report.fips.filter(|f| *f > 0) {
        return atlas.by_fips_mut(fips);
    }
    let mut region = atlas.by_iso2_mut(&report.country_code)?;
    for name in [&report.sub_region_1, &report.sub_region_2, &report.metro_area] {
        if !name.is_empty() {
            region = region.subregions.get_mut(name.as_str())?;
        }
    }
    Some(region)
}

/// Attaches smoothed mobility levels (baseline = 100).
///
/// Places with no matching region are skipped and logged at debug level,
/// never reported as anomalies: the report covers far more localities than
/// the place list. The smoothed
/// series are stored without their daily readings.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a place reports twice on one day.
pub fn merge(atlas: &mut Atlas, reports: &[MobilityReport]) -> Result<(), MergeError> {
    let credits = SourceId::GoogleMobility.credits();
    let mut merged = 0_usize;
    let mut skipped = 0_usize;

    for (key, rows) in group_by(reports, MobilityReport::place_key) {
        let Some(region) = report_region(atlas, rows[0]) else {
            if !rows[0].sub_region_1.is_empty() {
                log::debug!("No region for mobility place {key:?}");
            }
            skipped += 1;
            continue;
        };
        let path = region.debug_path();

        let mobility = region.metrics.category_mut(Category::Mobility);
        for def in METRICS {
            let column: Column = rows
                .iter()
                .map(|r| (r.date, (def.field)(&r.changes).map(|pct| BASELINE + pct)))
                .collect();
            let series = metric::smoothed(column)
                .map_err(MergeError::series(def.name, &path))?
                .without_raw();
            mobility.insert(def.name.to_string(), def.style.metric(series, &credits));
        }
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged mobility data into {merged} regions ({skipped} places skipped)");
    Ok(())
}
