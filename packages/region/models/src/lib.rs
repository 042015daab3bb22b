#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region tree and metric types for the COVID atlas.
//!
//! A [`Region`] is one node of the geographic hierarchy (world, country,
//! state, county, or a synthetic grouping such as "NYC"). Every region owns
//! its subregions and a [`Metrics`] bundle of named time series grouped by
//! [`Category`], plus scalar totals such as population.

pub mod countries;
pub mod fips;
pub mod series;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use series::{Sample, Series, SeriesError};

/// Source attribution, keyed by URL with a human-readable label.
pub type Credits = BTreeMap<String, String>;

/// Total name holding a region's population.
pub const POPULATION: &str = "population";

/// Key and display name of the root region.
pub const WORLD: &str = "World";

/// Metric category within a region's [`Metrics`].
///
/// Per-site wastewater metrics are kept separately in
/// [`Metrics::wastewater`] because they are keyed by site, not by name.
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
pub enum Category {
    /// Cases, deaths, and excess mortality.
    Covid,
    /// Hospital capacity, occupancy, and admissions.
    Hospital,
    /// Weekly per-capita series for map animation.
    Map,
    /// Community mobility relative to baseline.
    Mobility,
    /// Antibody prevalence from blood-donor surveys.
    Serology,
    /// Vaccination coverage.
    Vaccine,
    /// Share of sequenced samples per variant.
    Variant,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: &[Self] = &[
        Self::Covid,
        Self::Hospital,
        Self::Map,
        Self::Mobility,
        Self::Serology,
        Self::Vaccine,
        Self::Variant,
    ];
}

/// A single named time series attached to a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Dated values (and optional raw readings).
    pub series: Series,
    /// Rendering color token, opaque to the pipeline.
    pub color: String,
    /// Positive: headline. Zero: secondary. Negative: reference line.
    pub emphasis: i32,
    /// Display sort key.
    pub order: f64,
    /// Color used where a map metric is rising.
    pub increase_color: Option<String>,
    /// Color used where a map metric is falling.
    pub decrease_color: Option<String>,
    /// Sources that contributed to this series.
    pub credits: Credits,
}

impl Metric {
    /// Creates a metric with no credits and no map colors.
    #[must_use]
    pub fn new(series: Series, color: impl Into<String>, emphasis: i32, order: f64) -> Self {
        Self {
            series,
            color: color.into(),
            emphasis,
            order,
            increase_color: None,
            decrease_color: None,
            credits: Credits::new(),
        }
    }

    /// Adds every entry of `credits` to this metric's credits.
    #[must_use]
    pub fn with_credits(mut self, credits: &Credits) -> Self {
        self.credits
            .extend(credits.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// One-line summary: valid point count, last date, and last value.
    #[must_use]
    pub fn debug_line(&self) -> String {
        self.series.last_valid().map_or_else(
            || format!("{:3}d [no data]", self.series.count()),
            |(date, value)| {
                format!(
                    "{:3}d =>{} last={value:<5.1}",
                    self.series.count(),
                    date.format("%Y-%m-%d")
                )
            },
        )
    }

    /// Summary line, optionally followed by every sample.
    #[must_use]
    pub fn debug_block(&self, with_data: bool) -> String {
        let mut out = self.debug_line();
        if with_data {
            for s in self.series.samples() {
                let _ = write!(out, "\n  {}", s.date.format("%Y-%m-%d"));
                match s.value {
                    Some(v) => {
                        let _ = write!(out, " value={v:.3}");
                    }
                    None => out.push_str(" value=-"),
                }
                if let Some(r) = s.raw {
                    let _ = write!(out, " raw={r:.3}");
                }
            }
        }
        out
    }
}

/// A dated policy action (lockdown, reopening, mask order, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChange {
    /// Date the change took effect.
    pub date: NaiveDate,
    /// Signed significance: negative closes, positive reopens.
    pub score: i32,
    /// Emoji token summarizing the policy area.
    pub emoji: String,
    /// Description of the change.
    pub text: String,
    /// Source of the event.
    pub credits: Credits,
}

impl PolicyChange {
    /// Sort key putting the most significant change of each day first.
    #[must_use]
    pub const fn sort_key(&self) -> (NaiveDate, i32, i32) {
        (self.date, -self.score.abs(), self.score)
    }
}

/// Sorts policy changes by date, then by descending significance.
pub fn sort_policy_changes(changes: &mut [PolicyChange]) {
    changes.sort_by_key(PolicyChange::sort_key);
}

/// Per-region collection of metrics, totals, and policy changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Scalar totals such as `population`, `positives`, `deaths`.
    pub totals: BTreeMap<String, f64>,
    /// Policy changes, ordered by [`PolicyChange::sort_key`] after merge.
    pub policy: Vec<PolicyChange>,
    /// Named metrics per category.
    pub categories: BTreeMap<Category, BTreeMap<String, Metric>>,
    /// Per-site wastewater metrics: site name, then metric name.
    pub wastewater: BTreeMap<String, BTreeMap<String, Metric>>,
}

impl Metrics {
    /// Value of a total, or zero when it was never set.
    #[must_use]
    pub fn total(&self, name: &str) -> f64 {
        self.totals.get(name).copied().unwrap_or(0.0)
    }

    /// The `population` total, or zero.
    #[must_use]
    pub fn population(&self) -> f64 {
        self.total(POPULATION)
    }

    /// Sets a total.
    pub fn set_total(&mut self, name: &str, value: f64) {
        self.totals.insert(name.to_string(), value);
    }

    /// Metrics of one category, if any were ever added.
    #[must_use]
    pub fn category(&self, category: Category) -> Option<&BTreeMap<String, Metric>> {
        self.categories.get(&category)
    }

    /// Mutable metrics of one category, created empty on demand.
    pub fn category_mut(&mut self, category: Category) -> &mut BTreeMap<String, Metric> {
        self.categories.entry(category).or_default()
    }

    /// Looks up one metric.
    #[must_use]
    pub fn metric(&self, category: Category, name: &str) -> Option<&Metric> {
        self.categories.get(&category)?.get(name)
    }

    /// Whether a category holds no metrics.
    #[must_use]
    pub fn is_empty(&self, category: Category) -> bool {
        self.categories.get(&category).is_none_or(BTreeMap::is_empty)
    }

    /// Removes every metric in a category.
    pub fn clear(&mut self, category: Category) {
        self.categories.remove(&category);
    }

    /// One-line summary: population and populated category names.
    #[must_use]
    pub fn debug_line(&self) -> String {
        let pop = self.population();
        let mut out = format!("{:9.0}p", if pop > 0.0 { pop } else { -1.0 });
        let mut cats: Vec<&str> = self
            .categories
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(c, _)| c.as_ref())
            .collect();
        if !self.wastewater.is_empty() {
            cats.push("wastewater");
        }
        if !self.policy.is_empty() {
            cats.push("policy");
        }
        if !cats.is_empty() {
            let short: Vec<&str> = cats.iter().map(|c| &c[..c.len().min(3)]).collect();
            let _ = write!(out, " <{}>", short.join("+"));
        }
        out
    }

    /// Multi-line description of every metric and policy change.
    #[must_use]
    pub fn debug_block(&self, with_data: bool) -> String {
        let mut lines = Vec::new();
        for (cat, metrics) in &self.categories {
            let cat = &cat.as_ref()[..3];
            for (name, m) in metrics {
                let block = m.debug_block(with_data);
                let (head, data) = block.split_once('\n').unwrap_or((&block, ""));
                lines.push(format!("{head} {cat}: {name}"));
                if !data.is_empty() {
                    lines.push(data.to_string());
                }
            }
        }
        for (site, metrics) in &self.wastewater {
            for (name, m) in metrics {
                lines.push(format!("{} was[{site}]: {name}", m.debug_line()));
            }
        }
        for c in &self.policy {
            lines.push(format!(
                "       {} {:+2} {} {}",
                c.date.format("%Y-%m-%d"),
                c.score,
                c.emoji,
                c.text
            ));
        }
        lines.join("\n")
    }
}

/// One node of the geographic hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Display name.
    pub name: String,
    /// Keys from the root down to this region, starting with `"World"`.
    pub path: Vec<String>,
    /// ISO 3166-1 alpha-2 code (countries and territories).
    pub iso_code: Option<String>,
    /// Numeric US FIPS code (states and counties).
    pub fips_code: Option<u32>,
    /// Place ID from the base place-metadata source.
    pub place_id: Option<String>,
    /// Representative latitude/longitude.
    pub lat_lon: Option<(f64, f64)>,
    /// Metrics attached to this region.
    pub metrics: Metrics,
    /// Every source that contributed data to this region.
    pub credits: Credits,
    /// Child regions keyed by their path key.
    pub subregions: BTreeMap<String, Self>,
}

impl Region {
    /// Creates an empty region at `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            name: name.into(),
            path,
            iso_code: None,
            fips_code: None,
            place_id: None,
            lat_lon: None,
            metrics: Metrics::default(),
            credits: Credits::new(),
            subregions: BTreeMap::new(),
        }
    }

    /// Creates the root region.
    #[must_use]
    pub fn world() -> Self {
        Self::new(WORLD, vec![WORLD.to_string()])
    }

    /// This region's key within its parent.
    #[must_use]
    pub fn key(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }

    /// Finds or creates the subregion at `key`, naming it `name` (or the
    /// key itself) when created.
    pub fn subregion(&mut self, key: &str, name: Option<&str>) -> &mut Self {
        let path = &self.path;
        self.subregions.entry(key.to_string()).or_insert_with(|| {
            let mut sub_path = path.clone();
            sub_path.push(key.to_string());
            Self::new(name.unwrap_or(key), sub_path)
        })
    }

    /// Follows `keys` down from this region.
    #[must_use]
    pub fn descendant(&self, keys: &[String]) -> Option<&Self> {
        keys.iter()
            .try_fold(self, |region, key| region.subregions.get(key))
    }

    /// Follows `keys` down from this region, mutably.
    pub fn descendant_mut(&mut self, keys: &[String]) -> Option<&mut Self> {
        keys.iter()
            .try_fold(self, |region, key| region.subregions.get_mut(key))
    }

    /// Visits this region and every descendant, parents first.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Self)) {
        f(self);
        for sub in self.subregions.values() {
            sub.visit(f);
        }
    }

    /// Visits this region and every descendant mutably, parents first.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Self)) {
        f(self);
        for sub in self.subregions.values_mut() {
            sub.visit_mut(f);
        }
    }

    /// Merges `credits` into this region's credits.
    pub fn add_credits(&mut self, credits: &Credits) {
        self.credits
            .extend(credits.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Returns a path string like `World/US/California/Santa Clara`.
    #[must_use]
    pub fn debug_path(&self) -> String {
        self.path.join("/")
    }

    /// Whether `rx` fully matches the name, the path, or the path with
    /// spaces replaced by underscores.
    #[must_use]
    pub fn matches_regex(&self, rx: &Regex) -> bool {
        let full = |s: &str| rx.find(s).is_some_and(|m| m.start() == 0 && m.end() == s.len());
        let path = self.debug_path();
        full(&self.name) || full(&path) || full(&path.replace(' ', "_"))
    }

    /// One-line summary of this region.
    #[must_use]
    pub fn debug_line(&self) -> String {
        let mut line = format!("{} {}", self.metrics.debug_line(), self.debug_path());
        if self.name != self.key() {
            let _ = write!(line, " ({})", self.name);
        }
        line
    }

    /// Paragraph describing this region's credits and metrics.
    #[must_use]
    pub fn debug_block(&self, with_data: bool) -> String {
        let mut lines = vec![self.debug_line()];
        for (url, name) in &self.credits {
            lines.push(format!("    {name} ({url})"));
        }
        for line in self.metrics.debug_block(with_data).lines() {
            lines.push(format!("    {line}"));
        }
        lines.join("\n")
    }

    /// Text description of this whole subtree, indented by depth.
    #[must_use]
    pub fn debug_tree(&self, with_data: bool) -> String {
        let mut lines: Vec<String> = self
            .debug_block(with_data)
            .lines()
            .map(str::to_string)
            .collect();
        if lines.len() > 1 {
            lines.push(String::new());
        }
        for sub in self.subregions.values() {
            let sub_lines: Vec<String> = sub.debug_tree(with_data).lines().map(str::to_string).collect();
            let multi = sub_lines.len() > 1;
            lines.extend(sub_lines.into_iter().map(|l| format!("  {l}")));
            if multi {
                lines.push(String::new());
            }
        }
        lines.join("\n").trim_end().to_string()
    }
}
