//! Modeled excess deaths by country.

use covid_atlas_region::require_population;
use covid_atlas_region_models::Category;
use covid_atlas_source_models::{ExcessDeaths, SourceId};

use crate::metric::{self, Style, style};
use crate::scale::PER_10M;
use crate::{Atlas, MergeError, WarningCollector, group_by};

pub const MEASURED: &str = "all excess deaths / day / 10Mp";
pub const ESTIMATED: &str = "est excess deaths / day / 10Mp";

const MEASURED_STYLE: Style = style("tab:orange", 1, 1.4);
const ESTIMATED_STYLE: Style = style("tab:orange", -1, 1.5);

const WHAT: &str = "Economist mortality";

/// Attaches measured and estimated excess deaths to country regions.
///
/// The estimate is blanked wherever a measured value exists, so the two
/// series never overlap.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a country reports two rows for one
/// day.
pub fn merge(atlas: &mut Atlas, rows: &[ExcessDeaths], warnings: &mut WarningCollector) -> Result<(), MergeError> {
    let credits = SourceId::Economist.credits();
    let mut merged = 0_usize;

    for (iso3, mut rows) in group_by(rows, |r| r.iso3.clone()) {
        let Some(region) = warnings.check(atlas.resolve_iso3(&iso3, WHAT)) else {
            continue;
        };
        let path = region.debug_path();
        let Some(pop) = warnings.check(require_population(region)) else {
            continue;
        };

        rows.sort_by_key(|r| r.date);
        let measured = rows.iter().map(|r| (r.date, r.daily)).collect();
        let estimated = rows
            .iter()
            .map(|r| (r.date, if r.daily.is_some() { None } else { r.estimated_daily }))
            .collect();

        let measured = metric::levels(metric::scaled(measured, PER_10M / pop))
            .map_err(MergeError::series(MEASURED, &path))?;
        let estimated = metric::levels(metric::scaled(estimated, PER_10M / pop))
            .map_err(MergeError::series(ESTIMATED, &path))?;

        let covid = region.metrics.category_mut(Category::Covid);
        covid.insert(MEASURED.into(), MEASURED_STYLE.metric(measured, &credits));
        covid.insert(ESTIMATED.into(), ESTIMATED_STYLE.metric(estimated, &credits));
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged excess deaths into {merged} countries");
    Ok(())
}
