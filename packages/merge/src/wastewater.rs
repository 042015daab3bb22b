//! Wastewater viral load by treatment plant.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use covid_atlas_region_models::fips;
use covid_atlas_source_models::{SourceId, WastewaterSample};
use covid_atlas_warnings::Anomaly;

use crate::metric::{self, Column, style};
use crate::palette::{TAB20B, cycle};
use crate::{Atlas, MergeError, WarningCollector, group_by};

pub const ALL_VARIANTS: &str = "COVID (all) Kcopies";
pub const BA4_BA5: &str = "COVID BA.4/5 Kcopies";

/// Reported gene copies per thousand.
const KILO: f64 = 1e-3;

/// Plants whose reported county FIPS code is wrong or missing.
const FIX_FIPS: &[(&str, u32)] = &[
    ("City of San Leandro Water Pollution Control Plant", 6001),
    ("Davis", 6113),
    ("Fairfield-Suisun Sewer District", 6095),
    ("Southeast San Francisco", 6075),
    ("UC Davis", 6113),
];

/// Drops every sample whose (site, date) pair occurs more than once.
fn without_duplicates<'a>(
    samples: &'a [WastewaterSample],
    warnings: &mut WarningCollector,
) -> Vec<&'a WastewaterSample> {
    let mut seen: BTreeMap<(&str, NaiveDate), usize> = BTreeMap::new();
    for s in samples {
        *seen.entry((s.site.as_str(), s.date)).or_default() += 1;
    }
    let mut reported = BTreeSet::new();
    samples
        .iter()
        .filter(|s| {
            let key = (s.site.as_str(), s.date);
            if seen[&key] == 1 {
                return true;
            }
            if reported.insert(key) {
                warnings.warn(&Anomaly::DuplicateSample {
                    source_name: "SCAN".into(),
                    site: s.site.clone(),
                    date: s.date.format("%Y-%m-%d").to_string(),
                });
            }
            false
        })
        .collect()
}

fn plant_fips(reported: &str, site: &str) -> Result<u32, String> {
    if let Some((_, fips)) = FIX_FIPS.iter().find(|(name, _)| *name == site) {
        return Ok(*fips);
    }
    if reported.trim().is_empty() {
        return Err(format!("No FIPS for SCAN wastewater plant: {site}"));
    }
    match fips::parse(reported) {
        Some(0) => Err(format!("No FIPS for SCAN wastewater plant: {site}")),
        Some(fips) => Ok(fips),
        None => Err(format!("Bad FIPS ({reported}) for SCAN wastewater plant: {site}")),
    }
}

/// Attaches per-plant smoothed viral load metrics to county regions.
///
/// Metrics are stored under the region's wastewater map keyed by plant
/// name. Plant colors come from consecutive hue groups of the palette.
///
/// # Errors
///
/// Returns [`MergeError::Series`] if a plant's samples cannot form a
/// series.
pub fn merge(
    atlas: &mut Atlas,
    samples: &[WastewaterSample],
    warnings: &mut WarningCollector,
) -> Result<(), MergeError> {
    let credits = SourceId::Scan.credits();
    let samples = without_duplicates(samples, warnings);
    let plants = group_by(samples.iter().copied(), |s| (s.county_fips.clone(), s.site.clone()));
    let mut merged = 0_usize;

    for (plant_i, ((reported, site), rows)) in plants.into_iter().enumerate() {
        let fips = match plant_fips(&reported, &site) {
            Ok(fips) => fips,
            Err(text) => {
                warnings.warn_text(text);
                continue;
            }
        };
        let Some(region) = atlas.by_fips_mut(fips) else {
            warnings.warn(&Anomaly::unknown("SCAN wastewater FIPS", format!("{fips} ({site})")));
            continue;
        };

        let column = |field: fn(&WastewaterSample) -> Option<f64>| -> Column {
            rows.iter().map(|r| (r.date, field(r).map(|v| v * KILO))).collect()
        };
        let path = format!("{} ({site})", region.debug_path());
        let all = metric::smoothed(column(|r| r.all_variants))
            .map_err(MergeError::series(ALL_VARIANTS, &path))?;
        let ba45 = metric::smoothed(column(|r| r.ba4_ba5))
            .map_err(MergeError::series(BA4_BA5, &path))?;

        let plant = region.metrics.wastewater.entry(site).or_default();
        plant.insert(
            ALL_VARIANTS.into(),
            style(cycle(&TAB20B, 4 + plant_i * 4), 1, 1.0).metric(all, &credits),
        );
        plant.insert(
            BA4_BA5.into(),
            style(cycle(&TAB20B, 6 + plant_i * 4), 0, 1.0).metric(ba45, &credits),
        );
        region.add_credits(&credits);
        merged += 1;
    }

    log::info!("Merged wastewater data for {merged} plants");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{atlas, collector, days};

    fn samples(site: &str, fips: &str, n: u64) -> Vec<WastewaterSample> {
        days("2022-06-01", n)
            .map(|date| WastewaterSample {
                site: site.into(),
                county_fips: fips.into(),
                date,
                all_variants: Some(70_000.0),
                ba4_ba5: Some(7_000.0),
            })
            .collect()
    }

    #[test]
    fn plants_get_smoothed_kilocopy_metrics() {
        let mut atlas = atlas();
        let mut warnings = collector();
        merge(&mut atlas, &samples("Palo Alto", "6085", 20), &mut warnings).unwrap();
        assert!(warnings.is_clean(), "{:?}", warnings.unknown());

        let sc = atlas.by_fips(6085).unwrap();
        let plant = &sc.metrics.wastewater["Palo Alto"];
        let all = &plant[ALL_VARIANTS];
        assert!((all.series.last_valid().unwrap().1 - 70.0).abs() < 1e-9);
        assert!((all.series.samples()[0].raw.unwrap() - 70.0).abs() < 1e-9);
        assert_eq!(all.color, TAB20B[4]);
        assert_eq!(plant[BA4_BA5].color, TAB20B[6]);
        assert_eq!(plant[BA4_BA5].emphasis, 0);
    }

    #[test]
    fn duplicate_samples_are_dropped_and_reported_once() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let mut rows = samples("Palo Alto", "6085", 3);
        rows.push(rows[1].clone());
        rows.push(rows[1].clone());
        merge(&mut atlas, &rows, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            ["Duplicate SCAN wastewater data: (Palo Alto) 2022-06-02"]
        );
        let sc = atlas.by_fips(6085).unwrap();
        assert_eq!(sc.metrics.wastewater["Palo Alto"][ALL_VARIANTS].series.len(), 2);
    }

    #[test]
    fn plant_fips_problems_are_reported() {
        let mut atlas = atlas();
        let mut warnings = collector();
        let mut rows = samples("Nowhere", "", 1);
        rows.extend(samples("Garbled", "abc", 1));
        rows.extend(samples("Faraway", "48201", 1));
        rows.extend(samples("Davis", "", 1));
        merge(&mut atlas, &rows, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown(),
            [
                "Unknown SCAN wastewater FIPS: 6113 (Davis)",
                "No FIPS for SCAN wastewater plant: Nowhere",
                "Unknown SCAN wastewater FIPS: 48201 (Faraway)",
                "Bad FIPS (abc) for SCAN wastewater plant: Garbled",
            ]
        );
    }
}
