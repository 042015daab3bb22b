//! Variant sequencing shares.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use covid_atlas_region_models::{Category, Metric, Region, countries};
use covid_atlas_source_models::{SourceId, VariantCount};
use covid_atlas_warnings::Anomaly;

use crate::metric::{self, Column};
use crate::palette::{LIGHT_GRAY, TAB20, cycle};
use crate::{Atlas, MergeError, WarningCollector, group_by};

/// Sequences not attributed to any named variant.
pub const OTHER: &str = "original/other";

/// Country names the registry does not know by these spellings.
const COUNTRY_CODES: &[(&str, &str)] = &[
    ("Curacao", "CW"),
    ("Democratic Republic of the Congo", "CD"),
    ("Laos", "LA"),
    ("Sint Maarten", "SX"),
    ("South Korea", "KR"),
];

const REGION_NAMES: &[(&str, &str)] = &[("Washington DC", "District of Columbia")];

/// Assigns palette colors to variants, least sequenced first.
fn variant_colors(counts: &[VariantCount]) -> BTreeMap<&str, &'static str> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for c in counts.iter().filter(|c| !c.variant.is_empty()) {
        *totals.entry(c.variant.as_str()).or_default() += c.found;
    }
    let mut ranked: Vec<(&str, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (variant, _))| (variant, cycle(&TAB20, i)))
        .collect()
}

fn country_region<'a>(atlas: &'a mut Atlas, country: &str, warnings: &mut WarningCollector) -> Option<&'a mut Region> {
    let iso2 = COUNTRY_CODES
        .iter()
        .find(|(name, _)| *name == country)
        .map(|(_, code)| *code)
        .or_else(|| countries::lookup(country).map(|c| c.alpha2));
    let Some(iso2) = iso2 else {
        warnings.warn_text(format!("Unknown covariant country: \"{country}\""));
        return None;
    };
    // Recognized countries without a region are outside the place list.
    atlas.by_iso2_mut(iso2)
}

/// Found counts per date for one variant row group.
fn by_date(rows: &[&VariantCount]) -> BTreeMap<NaiveDate, f64> {
    rows.iter().map(|r| (r.date, r.found)).collect()
}

fn percent_of(found: &BTreeMap<NaiveDate, f64>, totals: &BTreeMap<NaiveDate, f64>) -> Column {
    totals
        .iter()
        .map(|(date, total)| {
            let share = found
                .get(date)
                .filter(|_| *total > 0.0)
                .map(|f| f * 100.0 / total);
            (*date, share)
        })
        .collect()
}

/// Attaches per-variant share-of-sequences metrics.
///
/// Each named variant becomes a percentage of the place's sequenced
/// total; whatever the named variants leave over becomes [`OTHER`].
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a place reports one variant twice
/// for the same week.
pub fn merge(atlas: &mut Atlas, counts: &[VariantCount], warnings: &mut WarningCollector) -> Result<(), MergeError> {
    let credits = SourceId::CoVariants.credits();
    let colors = variant_colors(counts);
    let mut merged = 0_usize;

    for ((country, place), rows) in group_by(counts, |c| (c.country.clone(), c.region.clone())) {
        // The US national series also appears as its own country entry.
        if country == "United States" && place == "USA" {
            continue;
        }

        let Some(mut region) = country_region(atlas, &country, warnings) else {
            continue;
        };
        if !place.is_empty() {
            let name = REGION_NAMES
                .iter()
                .find(|(from, _)| *from == place)
                .map_or(place.as_str(), |(_, to)| *to);
            let path = region.debug_path();
            let Some(sub) = region.subregions.get_mut(name) else {
                warnings.warn(&Anomaly::unknown("covariant region", format!("{path}/{name}")));
                continue;
            };
            region = sub;
        }

        let path = region.debug_path();
        let variants = group_by(rows.iter().copied(), |r| r.variant.clone());
        let totals = variants.get("").map(|rows| by_date(rows)).unwrap_or_default();
        let mut others = totals.clone();
        let mut added = BTreeMap::new();

        for (variant, rows) in variants.iter().filter(|(v, _)| !v.is_empty()) {
            if region.metrics.metric(Category::Variant, variant).is_some() {
                warnings.warn(&Anomaly::DuplicateVariant {
                    path: path.clone(),
                    variant: variant.clone(),
                });
                continue;
            }
            if rows.len() != totals.len() {
                warnings.warn(&Anomaly::BadVariantData {
                    path: path.clone(),
                    totals: totals.len(),
                    data: rows.len(),
                });
                continue;
            }

            let found = metric::levels(rows.iter().map(|r| (r.date, Some(r.found))).collect())
                .map_err(MergeError::series(variant.as_str(), &path))?;
            let found: BTreeMap<NaiveDate, f64> = found
                .samples()
                .iter()
                .filter_map(|s| Some((s.date, s.value?)))
                .collect();
            for (date, f) in &found {
                if let Some(rest) = others.get_mut(date) {
                    *rest -= f;
                }
            }
            let color = colors.get(variant.as_str()).copied().unwrap_or(LIGHT_GRAY);
            let series = metric::levels(percent_of(&found, &totals))
                .map_err(MergeError::series(variant.as_str(), &path))?;
            added.insert(
                variant.clone(),
                Metric::new(series, color, 1, 0.0).with_credits(&credits),
            );
        }

        let series = metric::levels(percent_of(&others, &totals))
            .map_err(MergeError::series(OTHER, &path))?;
        added.insert(
            OTHER.to_string(),
            Metric::new(series, LIGHT_GRAY, 1, 0.0).with_credits(&credits),
        );

        region.metrics.category_mut(Category::Variant).extend(added);
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged variant shares into {merged} regions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{atlas, collector, date};

    fn count(country: &str, region: &str, variant: &str, day: &str, found: f64) -> VariantCount {
        VariantCount {
            country: country.into(),
            region: region.into(),
            variant: variant.into(),
            date: date(day),
            found,
        }
    }

    fn weeks(country: &str, region: &str, variant: &str, found: [f64; 2]) -> [VariantCount; 2] {
        [
            count(country, region, variant, "2021-06-07", found[0]),
            count(country, region, variant, "2021-06-14", found[1]),
        ]
    }

    #[test]
    fn shares_sum_with_remainder_to_one_hundred() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let counts: Vec<_> = [
            weeks("Germany", "", "", [100.0, 200.0]),
            weeks("Germany", "", "21A (Delta)", [10.0, 150.0]),
            weeks("Germany", "", "20I (Alpha, V1)", [80.0, 40.0]),
        ]
        .into_iter()
        .flatten()
        .collect();
        merge(&mut atlas, &counts, &mut warnings).unwrap();
        assert!(warnings.is_clean(), "{:?}", warnings.unknown());

        let de = atlas.by_iso2("DE").unwrap();
        let share = |name: &str| {
            de.metrics
                .metric(Category::Variant, name)
                .unwrap()
                .series
                .samples()
                .iter()
                .map(|s| s.value.unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(share("21A (Delta)"), vec![10.0, 75.0]);
        assert_eq!(share("20I (Alpha, V1)"), vec![80.0, 20.0]);
        assert_eq!(share(OTHER), vec![10.0, 5.0]);
        assert_eq!(de.metrics.metric(Category::Variant, OTHER).unwrap().color, LIGHT_GRAY);
    }

    #[test]
    fn colors_follow_global_prevalence() {
        let counts = vec![
            count("Germany", "", "big", "2021-06-07", 100.0),
            count("Germany", "", "small", "2021-06-07", 1.0),
            count("Germany", "", "", "2021-06-07", 101.0),
        ];
        let colors = variant_colors(&counts);
        assert_eq!(colors["small"], TAB20[0]);
        assert_eq!(colors["big"], TAB20[1]);
        assert_eq!(colors.len(), 2);
    }

    #[test]
    fn us_states_resolve_and_national_duplicate_is_skipped() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let counts: Vec<_> = [
            weeks("United States", "California", "", [10.0, 10.0]),
            weeks("United States", "California", "x", [5.0, 5.0]),
            weeks("United States", "USA", "", [10.0, 10.0]),
            weeks("United States", "Washington DC", "", [1.0, 1.0]),
            weeks("Atlantis", "", "", [1.0, 1.0]),
        ]
        .into_iter()
        .flatten()
        .collect();
        merge(&mut atlas, &counts, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            [
                "Unknown covariant country: \"Atlantis\"",
                "Unknown covariant region: World/US/District of Columbia",
            ]
        );
        let ca = atlas.by_fips(6).unwrap();
        assert!(ca.metrics.metric(Category::Variant, "x").is_some());
        assert!(atlas.by_iso2("US").unwrap().metrics.is_empty(Category::Variant));
    }

    #[test]
    fn misaligned_variant_rows_warn() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let mut counts: Vec<_> = weeks("Germany", "", "", [10.0, 10.0]).into();
        counts.push(count("Germany", "", "x", "2021-06-07", 1.0));
        merge(&mut atlas, &counts, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            ["Bad covariant data (World/DE): len totals=2 len data=1"]
        );
    }
}
