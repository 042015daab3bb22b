//! Weekly map series derived from daily case metrics.
//!
//! Every region gets a few weekly samples of each derived series, all
//! ending on the same date so map frames line up across regions. Values
//! are scaled by population so marker sizes follow the number of people
//! affected rather than the per-capita rate.

use chrono::{NaiveDate, TimeDelta};
use covid_atlas_merge::covid;
use covid_atlas_region_models::{Category, Metric, Region, Sample, Series};

/// A weekly map series and the daily covid metric it samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDerivation {
    /// Covid metric to sample.
    pub source: &'static str,
    /// Name of the map metric.
    pub name: &'static str,
    pub color: &'static str,
    pub increase_color: Option<&'static str>,
    pub decrease_color: Option<&'static str>,
}

/// Case and death markers.
pub const DERIVATIONS: &[MapDerivation] = &[
    MapDerivation {
        source: covid::POSITIVES,
        name: "cases x2K",
        color: "#0000FF50",
        increase_color: Some("#0000FFA0"),
        decrease_color: Some("#00FF00A0"),
    },
    MapDerivation {
        source: covid::DEATHS,
        name: "deaths x200K",
        color: "#FF000050",
        increase_color: Some("#FF0000A0"),
        decrease_color: None,
    },
];

/// Map series settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    /// Population is divided by this to get the value multiplier.
    pub population_divisor: f64,
    /// Spacing of map samples.
    pub week: TimeDelta,
    pub derivations: Vec<MapDerivation>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            population_divisor: 50.0,
            week: TimeDelta::days(7),
            derivations: DERIVATIONS.to_vec(),
        }
    }
}

/// Adds map metrics to `world` and every descendant.
///
/// Samples end on the latest date of any world-level covid metric. A
/// region gets no map metric for a derivation when it lacks the source
/// metric or none of its samples has a value.
pub fn make_map_metrics(world: &mut Region, config: &MapConfig) {
    let latest = world
        .metrics
        .category(Category::Covid)
        .and_then(|named| named.values().filter_map(|m| m.series.last_date()).max());
    let Some(latest) = latest else {
        log::warn!("No world covid metrics, skipping map metrics");
        return;
    };

    let mut made = 0_usize;
    world.visit_mut(&mut |region: &mut Region| made += add_map_metrics(region, latest, config));
    log::info!("Made {made} map metrics ending {latest}");
}

fn add_map_metrics(region: &mut Region, latest: NaiveDate, config: &MapConfig) -> usize {
    let week_days = config.week.num_days();
    if week_days <= 0 {
        return 0;
    }
    let mul = region.metrics.population() / config.population_divisor;

    let mut made = Vec::new();
    for derivation in &config.derivations {
        let Some(source) = region.metrics.metric(Category::Covid, derivation.source) else {
            continue;
        };
        let Some(first) = source.series.first_date() else {
            continue;
        };

        let weeks = ((latest - first).num_days() + 1) / week_days;
        let samples: Vec<Sample> = (0..weeks.max(0))
            .rev()
            .map(|back| {
                let date = latest - TimeDelta::days(back * week_days);
                Sample::new(date, source.series.interpolate(date).map(|v| v * mul))
            })
            .collect();
        if samples.iter().all(|s| s.value.is_none()) {
            continue;
        }
        let Ok(series) = Series::from_samples(samples) else {
            continue;
        };

        made.push((
            derivation.name.to_string(),
            Metric {
                series,
                color: derivation.color.into(),
                emphasis: source.emphasis,
                order: source.order,
                increase_color: derivation.increase_color.map(Into::into),
                decrease_color: derivation.decrease_color.map(Into::into),
                credits: source.credits.clone(),
            },
        ));
    }

    let count = made.len();
    if count > 0 {
        region.metrics.category_mut(Category::Map).extend(made);
    }
    count
}
