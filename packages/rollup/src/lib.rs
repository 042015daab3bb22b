#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population-weighted roll-up of the region tree.
//!
//! [`roll_up`] walks the tree children first. Each region drops children
//! that carry no headline case data, fills in its population and totals
//! from what remains, and synthesizes any category metric it lacks (or
//! only has a stale copy of) as the population-weighted average of its
//! children. [`map`] then derives weekly series for map animation.

pub mod map;

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta};
use covid_atlas_region_models::{Category, Credits, Metric, POPULATION, Region, Series};
use covid_atlas_warnings::{Anomaly, WarningCollector};

pub use map::{MapConfig, MapDerivation, make_map_metrics};

/// Categories whose metrics are synthesized from children by name.
pub const ROLLED_UP: &[Category] = &[
    Category::Covid,
    Category::Hospital,
    Category::Mobility,
    Category::Vaccine,
];

/// Categories cleared when none of their metrics is a headline.
const HEADLINE_ONLY: &[Category] = &[Category::Vaccine, Category::Serology, Category::Mobility];

/// Roll-up thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupConfig {
    /// Largest relative gap between a region's population and the summed
    /// population of the children contributing to an aggregate.
    pub coverage_tolerance: f64,
    /// A region's own metric is replaced once it ends more than this long
    /// before the children's median end date.
    pub staleness: TimeDelta,
    /// Fewest non-missing values a metric needs to survive cleanup.
    pub min_points: usize,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            coverage_tolerance: 0.1,
            staleness: TimeDelta::days(7),
            min_points: 2,
        }
    }
}

impl RollupConfig {
    /// Whether `parts` is within tolerance of `whole`.
    fn covers(&self, parts: f64, whole: f64) -> bool {
        (parts - whole).abs() <= whole * self.coverage_tolerance
    }
}

/// Rolls the whole tree up into `world`, then clears world-level
/// mobility.
pub fn roll_up(world: &mut Region, config: &RollupConfig, warnings: &mut WarningCollector) {
    roll_up_region(world, config, warnings);
    world.metrics.clear(Category::Mobility);

    let mut regions = 0_usize;
    world.visit(&mut |_| regions += 1);
    log::info!("Rolled up {regions} regions");
}

fn has_headline_covid(region: &Region) -> bool {
    region
        .metrics
        .category(Category::Covid)
        .is_some_and(|metrics| metrics.values().any(|m| m.emphasis >= 0))
}

fn roll_up_region(region: &mut Region, config: &RollupConfig, warnings: &mut WarningCollector) {
    let children = std::mem::take(&mut region.subregions);
    region.subregions = children
        .into_iter()
        .filter_map(|(key, mut child)| {
            roll_up_region(&mut child, config, warnings);
            if !has_headline_covid(&child) {
                warnings.warn(&Anomaly::NoCovidMetrics {
                    path: child.debug_path(),
                });
                return None;
            }
            if child.metrics.population() <= 0.0 {
                log::debug!("Dropping {}: no population", child.debug_path());
                return None;
            }
            Some((key, child))
        })
        .collect();

    let pop = roll_up_population(region, config, warnings);
    roll_up_totals(region, pop, config);
    for &category in ROLLED_UP {
        let synthesized = synthesize_category(region, category, pop, config);
        if !synthesized.is_empty() {
            log::debug!(
                "{}: synthesized {} {category} metrics",
                region.debug_path(),
                synthesized.len()
            );
            region.metrics.category_mut(category).extend(synthesized);
        }
    }
    clean_up(region, config);
}

/// Fills an unset population from the children and checks the two agree.
/// Returns the region's population afterwards.
fn roll_up_population(region: &mut Region, config: &RollupConfig, warnings: &mut WarningCollector) -> f64 {
    let parts: f64 = region
        .subregions
        .values()
        .map(|c| c.metrics.population())
        .sum();
    let mut pop = region.metrics.population();
    if pop <= 0.0 && parts > 0.0 {
        region.metrics.set_total(POPULATION, parts);
        pop = parts;
    }

    let path = region.debug_path();
    if parts > pop * (1.0 + config.coverage_tolerance) {
        warnings.warn(&Anomaly::Overpopulation { path, pop, parts });
    } else if parts > 0.0 && parts < pop * (1.0 - config.coverage_tolerance) {
        warnings.warn(&Anomaly::Underpopulation { path, pop, parts });
    }
    pop
}

/// Sums child totals where the reporting children cover the region.
/// A directly reported total is never lowered.
fn roll_up_totals(region: &mut Region, pop: f64, config: &RollupConfig) {
    let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for child in region.subregions.values() {
        let child_pop = child.metrics.population();
        for (name, value) in child.metrics.totals.iter().filter(|(n, _)| *n != POPULATION) {
            let (pop_sum, value_sum) = sums.entry(name.clone()).or_default();
            *pop_sum += child_pop;
            *value_sum += value;
        }
    }

    for (name, (pop_sum, value_sum)) in sums {
        if config.covers(pop_sum, pop) {
            let existing = region.metrics.total(&name);
            region.metrics.set_total(&name, existing.max(value_sum));
        }
    }
}

/// Builds the population-weighted average of each child metric the
/// region is missing or only has a stale copy of.
fn synthesize_category(
    region: &Region,
    category: Category,
    pop: f64,
    config: &RollupConfig,
) -> BTreeMap<String, Metric> {
    let mut by_name: BTreeMap<&str, Vec<(f64, &Metric)>> = BTreeMap::new();
    for child in region.subregions.values() {
        let child_pop = child.metrics.population();
        for (name, metric) in child.metrics.category(category).into_iter().flatten() {
            by_name.entry(name.as_str()).or_default().push((child_pop, metric));
        }
    }

    by_name
        .into_iter()
        .filter_map(|(name, mut parts)| {
            let metric_pop: f64 = parts.iter().map(|(p, _)| p).sum();
            if metric_pop <= 0.0 || !config.covers(metric_pop, pop) {
                return None;
            }
            let end = median_end(&parts)?;
            if let Some(own) = region.metrics.metric(category, name) {
                let fresh = own.series.last_date().is_some_and(|last| {
                    end.checked_sub_signed(config.staleness)
                        .is_none_or(|cutoff| last > cutoff)
                });
                if fresh {
                    return None;
                }
            }

            // Most populated child first; its styling carries over.
            parts.sort_by(|a, b| b.0.total_cmp(&a.0));
            let template = parts[0].1;
            let mut credits = Credits::new();
            let weighted = parts.iter().fold(Series::default(), |sum, (child_pop, m)| {
                credits.extend(m.credits.iter().map(|(k, v)| (k.clone(), v.clone())));
                sum.add_filled(&m.series.truncated(end).scaled(*child_pop))
            });

            let metric = Metric {
                series: weighted.scaled(1.0 / metric_pop),
                color: template.color.clone(),
                emphasis: template.emphasis,
                order: template.order,
                increase_color: template.increase_color.clone(),
                decrease_color: template.decrease_color.clone(),
                credits,
            };
            Some((name.to_string(), metric))
        })
        .collect()
}

/// Upper median of the children's series end dates.
fn median_end(parts: &[(f64, &Metric)]) -> Option<NaiveDate> {
    let mut ends: Vec<NaiveDate> = parts
        .iter()
        .filter_map(|(_, m)| m.series.last_date())
        .collect();
    ends.sort_unstable();
    ends.get(ends.len() / 2).copied()
}

fn clean_up(region: &mut Region, config: &RollupConfig) {
    let metrics = &mut region.metrics;
    for named in metrics.categories.values_mut() {
        named.retain(|_, m| m.series.count() >= config.min_points);
    }
    for &category in HEADLINE_ONLY {
        let headline = metrics
            .category(category)
            .is_some_and(|named| named.values().any(|m| m.emphasis > 0));
        if !headline {
            metrics.clear(category);
        }
    }
    for site in metrics.wastewater.values_mut() {
        site.retain(|_, m| m.series.count() >= config.min_points);
    }
    metrics.wastewater.retain(|_, site| !site.is_empty());
}


#[cfg(test)]
mod tests {
    use super::test_support::{child, date, metric, series};
    use super::*;

    fn last_value(region: &Region, category: Category, name: &str) -> f64 {
        region
            .metrics
            .metric(category, name)
            .unwrap()
            .series
            .last_valid()
            .unwrap()
            .1
    }

    #[test]
    fn children_average_by_population_into_unset_parent() {
        let mut world = Region::world();
        child(&mut world, "A", 60.0, &[10.0; 5]);
        child(&mut world, "B", 40.0, &[20.0; 5])
            .metrics
            .category_mut(Category::Covid)
            .get_mut("cases")
            .unwrap()
            .color = "tab:red".into();
        let mut warnings = WarningCollector::default();
        roll_up(&mut world, &RollupConfig::default(), &mut warnings);

        assert!(warnings.is_clean(), "{:?}", warnings.unknown());
        assert!((world.metrics.population() - 100.0).abs() < 1e-9);
        assert!((last_value(&world, Category::Covid, "cases") - 14.0).abs() < 1e-9);
        let cases = world.metrics.metric(Category::Covid, "cases").unwrap();
        assert_eq!(cases.series.count(), 5);
        assert_eq!(cases.color, "tab:blue");
    }

    #[test]
    fn reported_total_is_never_lowered() {
        let mut world = Region::world();
        world.metrics.set_total(POPULATION, 100.0);
        world.metrics.set_total("positives", 100.0);
        world.metrics.set_total("deaths", 1.0);
        child(&mut world, "A", 60.0, &[1.0; 3]).metrics.set_total("positives", 50.0);
        child(&mut world, "B", 40.0, &[1.0; 3]).metrics.set_total("positives", 30.0);
        world.subregions.get_mut("A").unwrap().metrics.set_total("deaths", 2.0);
        world.subregions.get_mut("B").unwrap().metrics.set_total("deaths", 3.0);
        roll_up(&mut world, &RollupConfig::default(), &mut WarningCollector::default());

        assert!((world.metrics.total("positives") - 100.0).abs() < 1e-9);
        assert!((world.metrics.total("deaths") - 5.0).abs() < 1e-9);
        assert!((world.metrics.population() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn totals_need_population_coverage() {
        let mut world = Region::world();
        world.metrics.set_total(POPULATION, 100.0);
        child(&mut world, "A", 60.0, &[1.0; 3]).metrics.set_total("positives", 50.0);
        child(&mut world, "B", 40.0, &[1.0; 3]);
        let mut warnings = WarningCollector::default();
        roll_up(&mut world, &RollupConfig::default(), &mut warnings);

        assert!(!world.metrics.totals.contains_key("positives"));
        assert!(warnings.is_clean());
    }

    #[test]
    fn population_mismatches_warn() {
        let mut world = Region::world();
        let over = world.subregion("Over", None);
        over.metrics.set_total(POPULATION, 50.0);
        child(over, "A", 60.0, &[1.0; 3]);
        child(over, "B", 40.0, &[1.0; 3]);
        let under = world.subregion("Under", None);
        under.metrics.set_total(POPULATION, 1000.0);
        child(under, "A", 60.0, &[1.0; 3]);
        let mut warnings = WarningCollector::default();
        roll_up(&mut world, &RollupConfig::default(), &mut warnings);

        // Neither parent can average its children, so both lose their
        // headline cases too.
        assert_eq!(
            warnings.unknown(),
            [
                "Overpopulation: World/Over has 50p, 100p in parts",
                "No COVID metrics: World/Over",
                "Underpopulation: World/Under has 1000p, 60p in parts",
                "No COVID metrics: World/Under",
            ]
        );
    }

    #[test]
    fn children_without_headline_cases_are_pruned() {
        let mut world = Region::world();
        child(&mut world, "A", 60.0, &[1.0; 3]);
        world.subregion("Empty", None).metrics.set_total(POPULATION, 5.0);
        child(&mut world, "Reference", 5.0, &[1.0; 3])
            .metrics
            .category_mut(Category::Covid)
            .get_mut("cases")
            .unwrap()
            .emphasis = -1;
        child(&mut world, "Short", 5.0, &[1.0]);
        let mut warnings = WarningCollector::default();
        roll_up(&mut world, &RollupConfig::default(), &mut warnings);

        assert_eq!(
            warnings.unknown(),
            [
                "No COVID metrics: World/Empty",
                "No COVID metrics: World/Reference",
                "No COVID metrics: World/Short",
            ]
        );
        assert_eq!(world.subregions.keys().collect::<Vec<_>>(), ["A"]);
        assert!((world.metrics.population() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn children_without_population_are_dropped_quietly() {
        let mut world = Region::world();
        child(&mut world, "A", 60.0, &[1.0; 3]);
        child(&mut world, "Nobody", 0.0, &[1.0; 3]);
        let mut warnings = WarningCollector::default();
        roll_up(&mut world, &RollupConfig::default(), &mut warnings);

        assert!(warnings.is_clean());
        assert!(!world.subregions.contains_key("Nobody"));
    }

    #[test]
    fn sparse_metrics_and_headless_categories_are_cleaned_up() {
        let mut world = Region::world();
        let a = child(&mut world, "A", 60.0, &[1.0; 3]);
        a.metrics
            .category_mut(Category::Covid)
            .insert("sparse".into(), metric("2021-01-01", &[1.0], 1));
        a.metrics
            .category_mut(Category::Vaccine)
            .insert("secondary".into(), metric("2021-01-01", &[1.0; 3], 0));
        a.metrics
            .category_mut(Category::Hospital)
            .insert("beds".into(), metric("2021-01-01", &[1.0; 3], 0));
        a.metrics
            .wastewater
            .entry("Plant".into())
            .or_default()
            .insert("copies".into(), metric("2021-01-01", &[1.0], 1));
        roll_up(&mut world, &RollupConfig::default(), &mut WarningCollector::default());

        let a = &world.subregions["A"];
        assert!(a.metrics.metric(Category::Covid, "sparse").is_none());
        assert!(a.metrics.is_empty(Category::Vaccine));
        assert!(a.metrics.metric(Category::Hospital, "beds").is_some());
        assert!(a.metrics.wastewater.is_empty());

        let mut retained = 0;
        world.visit(&mut |r| {
            for named in r.metrics.categories.values() {
                for m in named.values() {
                    assert!(m.series.count() >= 2);
                    retained += 1;
                }
            }
        });
        assert!(retained > 0);
    }

    #[test]
    fn serology_needs_a_headline_and_stays_local() {
        let mut world = Region::world();
        let a = child(&mut world, "A", 60.0, &[1.0; 3]);
        a.metrics
            .category_mut(Category::Serology)
            .insert("infected or vax".into(), metric("2021-01-01", &[40.0; 3], 1));
        a.metrics
            .category_mut(Category::Serology)
            .insert("infected".into(), metric("2021-01-01", &[20.0; 3], 0));
        let b = child(&mut world, "B", 40.0, &[1.0; 3]);
        b.metrics
            .category_mut(Category::Serology)
            .insert("infected".into(), metric("2021-01-01", &[25.0; 3], 0));
        roll_up(&mut world, &RollupConfig::default(), &mut WarningCollector::default());

        assert_eq!(world.subregions["A"].metrics.category(Category::Serology).map(BTreeMap::len), Some(2));
        assert!(world.subregions["B"].metrics.is_empty(Category::Serology));
        assert!(world.metrics.is_empty(Category::Serology));
    }

    #[test]
    fn world_mobility_is_cleared() {
        let mut world = Region::world();
        child(&mut world, "A", 60.0, &[1.0; 3])
            .metrics
            .category_mut(Category::Mobility)
            .insert("residential".into(), metric("2021-01-01", &[100.0; 3], 1));
        roll_up(&mut world, &RollupConfig::default(), &mut WarningCollector::default());

        assert!(world.metrics.is_empty(Category::Mobility));
        assert!(
            world.subregions["A"]
                .metrics
                .metric(Category::Mobility, "residential")
                .is_some()
        );
    }

    #[test]
    fn coverage_tolerance_bounds_synthesis() {
        let build = || {
            let mut world = Region::world();
            world.metrics.set_total(POPULATION, 100.0);
            child(&mut world, "A", 85.0, &[1.0; 3]);
            world
        };

        let mut strict = build();
        roll_up(&mut strict, &RollupConfig::default(), &mut WarningCollector::default());
        assert!(strict.metrics.metric(Category::Covid, "cases").is_none());

        let mut loose = build();
        let config = RollupConfig {
            coverage_tolerance: 0.2,
            ..RollupConfig::default()
        };
        roll_up(&mut loose, &config, &mut WarningCollector::default());
        assert!(loose.metrics.metric(Category::Covid, "cases").is_some());
    }

    #[test]
    fn own_metric_is_replaced_only_when_stale() {
        // Children end 2021-01-10.
        let build = |own_days: usize| {
            let mut world = Region::world();
            child(&mut world, "A", 100.0, &[5.0; 10]);
            world
                .metrics
                .category_mut(Category::Covid)
                .insert("cases".into(), metric("2021-01-01", &vec![1.0; own_days], 1));
            roll_up(&mut world, &RollupConfig::default(), &mut WarningCollector::default());
            last_value(&world, Category::Covid, "cases")
        };

        assert!((build(4) - 1.0).abs() < 1e-9);
        assert!((build(3) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn synthesis_ends_at_upper_median_of_child_ends() {
        let mut world = Region::world();
        child(&mut world, "A", 30.0, &[1.0; 5]);
        child(&mut world, "B", 30.0, &[1.0; 10]);
        child(&mut world, "C", 40.0, &[1.0; 15]);
        roll_up(&mut world, &RollupConfig::default(), &mut WarningCollector::default());

        let cases = world.metrics.metric(Category::Covid, "cases").unwrap();
        assert_eq!(cases.series.last_date(), Some(date("2021-01-10")));
        // After A ends its share counts as zero.
        let values: Vec<f64> = cases.series.samples().iter().filter_map(|s| s.value).collect();
        assert!((values[4] - 1.0).abs() < 1e-9);
        assert!((values[9] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn credits_are_merged_from_every_child() {
        let mut world = Region::world();
        let mut credit = |key: &str, pop: f64, url: &str| {
            let c = child(&mut world, key, pop, &[1.0; 3]);
            c.metrics
                .category_mut(Category::Covid)
                .get_mut("cases")
                .unwrap()
                .credits
                .insert(url.into(), key.into());
        };
        credit("A", 60.0, "https://a.example");
        credit("B", 40.0, "https://b.example");
        roll_up(&mut world, &RollupConfig::default(), &mut WarningCollector::default());

        let cases = world.metrics.metric(Category::Covid, "cases").unwrap();
        assert_eq!(cases.credits.len(), 2);
        assert_eq!(cases.series.dates().collect::<Vec<_>>(), series("2021-01-01", &[0.0; 3]).dates().collect::<Vec<_>>());
    }
}
