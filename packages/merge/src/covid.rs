//! Case and death counts.

use chrono::NaiveDate;
use covid_atlas_region::require_population;
use covid_atlas_region_models::Category;
use covid_atlas_source_models::{CaseCount, SourceId};
use covid_atlas_warnings::Anomaly;

use crate::metric::{self, Column, Style, style};
use crate::scale::{PER_10M, PER_100K};
use crate::{Atlas, MergeError, WarningCollector, group_by};

pub const POSITIVES: &str = "COVID positives / day / 100Kp";
pub const DEATHS: &str = "COVID deaths / day / 10Mp";

const POSITIVES_STYLE: Style = style("tab:blue", 1, 1.0);
const DEATHS_STYLE: Style = style("tab:red", 1, 1.3);

/// Slack above population allowed for cumulative counts.
const COUNT_SLACK: f64 = 1000.0;

/// Attaches daily positives and deaths to every region with case counts.
///
/// Counts are keyed by place ID. Place IDs with no live region are
/// ignored, since the place list and the case tables come from the same
/// source.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a place reports two counts for one
/// day.
pub fn merge(atlas: &mut Atlas, counts: &[CaseCount], warnings: &mut WarningCollector) -> Result<(), MergeError> {
    let credits = SourceId::Jhu.credits();
    let groups = group_by(counts, |c| c.place_id.clone());
    let mut merged = 0_usize;

    for (place_id, rows) in groups {
        let Some(region) = atlas.by_place_id_mut(&place_id) else {
            log::debug!("No region for case place ID {place_id}");
            continue;
        };
        let path = region.debug_path();
        let Some(pop) = warnings.check(require_population(region)) else {
            continue;
        };

        let confirmed = metric::forward_filled(column(&rows, |c| c.confirmed));
        let deaths = metric::forward_filled(column(&rows, |c| c.deaths));
        if confirmed.iter().all(|(_, v)| v.is_none()) {
            warnings.warn(&Anomaly::NoData {
                source_name: "COVID".into(),
                path,
            });
            continue;
        }

        let positives = metric::last_reading(&confirmed).unwrap_or(f64::NAN);
        let dead = metric::last_reading(&deaths).unwrap_or(f64::NAN);
        if !in_bounds(positives, pop) {
            warnings.warn(&Anomaly::out_of_bounds("positives", &path, positives, pop));
            continue;
        }
        if !in_bounds(dead, pop) {
            warnings.warn(&Anomaly::out_of_bounds("deaths", &path, dead, pop));
            continue;
        }

        let positives_series = metric::from_cumulative(metric::scaled(confirmed, PER_100K / pop))
            .map_err(MergeError::series(POSITIVES, &path))?;
        let deaths_series = metric::from_cumulative(metric::scaled(deaths, PER_10M / pop))
            .map_err(MergeError::series(DEATHS, &path))?;

        region.metrics.set_total("positives", positives);
        region.metrics.set_total("deaths", dead);
        let covid = region.metrics.category_mut(Category::Covid);
        covid.insert(POSITIVES.into(), POSITIVES_STYLE.metric(positives_series, &credits));
        covid.insert(DEATHS.into(), DEATHS_STYLE.metric(deaths_series, &credits));
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged case counts into {merged} regions");
    Ok(())
}

fn in_bounds(value: f64, pop: f64) -> bool {
    (0.0..=pop + COUNT_SLACK).contains(&value)
}

fn column(rows: &[&CaseCount], field: impl Fn(&CaseCount) -> Option<f64>) -> Column {
    let mut column: Vec<(NaiveDate, Option<f64>)> = rows.iter().map(|c| (c.date, field(c))).collect();
    column.sort_by_key(|(d, _)| *d);
    column
}
