#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region tree construction and identifier lookup.
//!
//! [`Atlas::from_places`] builds the region skeleton from place metadata and
//! indexes it by ISO-2 code, FIPS code, and source place ID. The indexes
//! store region *paths*, not references: a lookup walks the path down from
//! the world region, so an index entry whose region was pruned by the
//! roll-up simply resolves to nothing. Indexes are never rebuilt after
//! pruning.

mod builder;
pub mod groups;

use std::collections::BTreeMap;

use covid_atlas_region_models::{Region, countries};
use covid_atlas_warnings::{Anomaly, WarningCollector};

/// Region path, starting with the world key.
pub type RegionPath = Vec<String>;

/// The region tree plus its identifier indexes.
#[derive(Debug, Clone)]
pub struct Atlas {
    /// Root of the tree.
    pub world: Region,
    by_iso2: BTreeMap<String, RegionPath>,
    by_fips: BTreeMap<u32, RegionPath>,
    by_place_id: BTreeMap<String, RegionPath>,
}

impl Atlas {
    /// Wraps an existing tree and indexes it.
    ///
    /// Duplicate index keys are reported to `warnings`; the first region
    /// reached in a pre-order walk keeps the key. Siblings are walked in key
    /// order, so `World/PR` wins over `World/US/California` regardless of
    /// which was inserted first.
    #[must_use]
    pub fn new(world: Region, warnings: &mut WarningCollector) -> Self {
        let mut atlas = Self {
            world,
            by_iso2: BTreeMap::new(),
            by_fips: BTreeMap::new(),
            by_place_id: BTreeMap::new(),
        };
        atlas.reindex(warnings);
        atlas
    }

    /// Rebuilds all three indexes from the current tree.
    pub fn reindex(&mut self, warnings: &mut WarningCollector) {
        let mut by_iso2 = BTreeMap::new();
        let mut by_fips = BTreeMap::new();
        let mut by_place_id = BTreeMap::new();

        self.world.visit(&mut |r: &Region| {
            if let Some(iso) = &r.iso_code {
                claim(&mut by_iso2, "ISO-2", iso.clone(), r, warnings);
            }
            if let Some(fips) = r.fips_code {
                claim(&mut by_fips, "FIPS", fips, r, warnings);
            }
            if let Some(id) = &r.place_id {
                claim(&mut by_place_id, "place ID", id.clone(), r, warnings);
            }
        });

        log::debug!(
            "Indexed {} ISO-2, {} FIPS, {} place IDs",
            by_iso2.len(),
            by_fips.len(),
            by_place_id.len()
        );
        self.by_iso2 = by_iso2;
        self.by_fips = by_fips;
        self.by_place_id = by_place_id;
    }

    /// Region at `path`, where `path[0]` is the world key.
    #[must_use]
    pub fn get(&self, path: &[String]) -> Option<&Region> {
        let (root, rest) = path.split_first()?;
        if self.world.path.first() != Some(root) {
            return None;
        }
        self.world.descendant(rest)
    }

    /// Mutable region at `path`, where `path[0]` is the world key.
    pub fn get_mut(&mut self, path: &[String]) -> Option<&mut Region> {
        let (root, rest) = path.split_first()?;
        if self.world.path.first() != Some(root) {
            return None;
        }
        self.world.descendant_mut(rest)
    }

    /// Indexed path for an ISO-2 code.
    #[must_use]
    pub fn iso2_path(&self, iso2: &str) -> Option<&RegionPath> {
        self.by_iso2.get(iso2)
    }

    /// Indexed path for a FIPS code.
    #[must_use]
    pub fn fips_path(&self, fips: u32) -> Option<&RegionPath> {
        self.by_fips.get(&fips)
    }

    /// Indexed path for a place ID.
    #[must_use]
    pub fn place_id_path(&self, id: &str) -> Option<&RegionPath> {
        self.by_place_id.get(id)
    }

    /// Region with an ISO-2 code.
    #[must_use]
    pub fn by_iso2(&self, iso2: &str) -> Option<&Region> {
        self.get(self.by_iso2.get(iso2)?)
    }

    /// Region with a FIPS code.
    #[must_use]
    pub fn by_fips(&self, fips: u32) -> Option<&Region> {
        self.get(self.by_fips.get(&fips)?)
    }

    /// Region with a place ID.
    #[must_use]
    pub fn by_place_id(&self, id: &str) -> Option<&Region> {
        self.get(self.by_place_id.get(id)?)
    }

    /// Mutable region with an ISO-2 code.
    pub fn by_iso2_mut(&mut self, iso2: &str) -> Option<&mut Region> {
        let path = self.by_iso2.get(iso2)?.clone();
        self.get_mut(&path)
    }

    /// Mutable region with a FIPS code.
    pub fn by_fips_mut(&mut self, fips: u32) -> Option<&mut Region> {
        let path = self.by_fips.get(&fips)?.clone();
        self.get_mut(&path)
    }

    /// Mutable region with a place ID.
    pub fn by_place_id_mut(&mut self, id: &str) -> Option<&mut Region> {
        let path = self.by_place_id.get(id)?.clone();
        self.get_mut(&path)
    }

    /// Number of indexed place IDs.
    #[must_use]
    pub fn place_id_count(&self) -> usize {
        self.by_place_id.len()
    }

    /// Resolves a FIPS code for the source described by `what`.
    ///
    /// # Errors
    ///
    /// Returns [`Anomaly::MissingRegion`] (`"Missing {what} FIPS: {fips}"`)
    /// if no live region has the code.
    pub fn resolve_fips(&mut self, fips: u32, what: &str) -> Result<&mut Region, Anomaly> {
        self.by_fips_mut(fips)
            .ok_or_else(|| Anomaly::missing(format!("{what} FIPS"), fips))
    }

    /// Resolves an ISO-2 country code for the source described by `what`.
    ///
    /// # Errors
    ///
    /// Returns [`Anomaly::MissingRegion`] (`"Missing {what} country: {iso2}"`)
    /// if no live region has the code.
    pub fn resolve_iso2(&mut self, iso2: &str, what: &str) -> Result<&mut Region, Anomaly> {
        self.by_iso2_mut(iso2)
            .ok_or_else(|| Anomaly::missing(format!("{what} country"), iso2))
    }

    /// Resolves an ISO-3 country code via the country registry.
    ///
    /// # Errors
    ///
    /// Returns [`Anomaly::UnknownIdentifier`] if the code is not an ISO
    /// country, or [`Anomaly::MissingRegion`] if the country has no region.
    pub fn resolve_iso3(&mut self, iso3: &str, what: &str) -> Result<&mut Region, Anomaly> {
        let country = countries::by_alpha3(iso3)
            .ok_or_else(|| Anomaly::unknown(format!("{what} country code"), iso3))?;
        self.resolve_iso2(country.alpha2, what)
    }
}

fn claim<K: Ord + std::fmt::Display>(
    index: &mut BTreeMap<K, RegionPath>,
    index_name: &str,
    key: K,
    region: &Region,
    warnings: &mut WarningCollector,
) {
    if let Some(kept) = index.get(&key) {
        warnings.warn(&Anomaly::DuplicateIndexKey {
            index: index_name.to_string(),
            key: key.to_string(),
            kept: kept.join("/"),
            ignored: region.debug_path(),
        });
    } else {
        index.insert(key, region.path.clone());
    }
}

/// Population of `region`, if positive.
///
/// # Errors
///
/// Returns [`Anomaly::NoPopulation`] when the population is zero, negative,
/// or unset.
pub fn require_population(region: &Region) -> Result<f64, Anomaly> {
    let pop = region.metrics.population();
    if pop > 0.0 {
        Ok(pop)
    } else {
        Err(Anomaly::NoPopulation {
            path: region.debug_path(),
            pop,
        })
    }
}

#[cfg(test)]
mod tests {
    use covid_atlas_region_models::POPULATION;
    use covid_atlas_warnings::AllowList;

    use super::*;

    fn tree() -> Region {
        let mut world = Region::world();
        let us = world.subregion("US", Some("United States"));
        us.iso_code = Some("US".into());
        let ca = us.subregion("California", None);
        ca.fips_code = Some(6);
        ca.metrics.set_total(POPULATION, 39_000_000.0);
        let sc = ca.subregion("Santa Clara", None);
        sc.fips_code = Some(6085);
        sc.place_id = Some("84006085".into());
        world
    }

    #[test]
    fn lookups_walk_indexed_paths() {
        let mut warnings = WarningCollector::new(AllowList::empty());
        let atlas = Atlas::new(tree(), &mut warnings);
        assert!(warnings.is_clean());
        assert_eq!(atlas.by_iso2("US").map(|r| r.name.as_str()), Some("United States"));
        assert_eq!(atlas.by_fips(6085).map(Region::debug_path).as_deref(), Some("World/US/California/Santa Clara"));
        assert_eq!(atlas.by_place_id("84006085").and_then(|r| r.fips_code), Some(6085));
        assert!(atlas.by_fips(1).is_none());
    }

    #[test]
    fn duplicate_keys_warn_and_keep_first_in_walk_order() {
        let mut world = tree();
        world.subregion("PR", None).fips_code = Some(6);
        let mut warnings = WarningCollector::new(AllowList::empty());
        let atlas = Atlas::new(world, &mut warnings);
        assert_eq!(atlas.by_fips(6).map(Region::key), Some("PR"));
        assert_eq!(
            warnings.unknown(),
            ["Duplicate FIPS key 6: kept World/PR, ignored World/US/California"]
        );
    }

    #[test]
    fn parents_keep_keys_over_their_descendants() {
        let mut world = tree();
        if let Some(sc) = world.descendant_mut(&["US".to_string(), "California".to_string(), "Santa Clara".to_string()]) {
            sc.iso_code = Some("US".into());
        }
        let mut warnings = WarningCollector::new(AllowList::empty());
        let atlas = Atlas::new(world, &mut warnings);
        assert_eq!(atlas.by_iso2("US").map(Region::key), Some("US"));
        assert_eq!(warnings.unknown().len(), 1);
    }

    #[test]
    fn pruned_regions_resolve_to_nothing() {
        let mut warnings = WarningCollector::new(AllowList::empty());
        let mut atlas = Atlas::new(tree(), &mut warnings);
        if let Some(ca) = atlas.by_fips_mut(6) {
            ca.subregions.remove("Santa Clara");
        }
        assert!(atlas.fips_path(6085).is_some());
        assert!(atlas.by_fips(6085).is_none());
        assert!(atlas.by_place_id_mut("84006085").is_none());
    }

    #[test]
    fn resolution_reports_anomalies() {
        let mut warnings = WarningCollector::new(AllowList::empty());
        let mut atlas = Atlas::new(tree(), &mut warnings);
        assert_eq!(
            atlas.resolve_fips(66010, "CDC vax").unwrap_err().to_string(),
            "Missing CDC vax FIPS: 66010"
        );
        assert_eq!(
            atlas.resolve_iso3("OWID_WRL", "OWID vax").unwrap_err().to_string(),
            "Unknown OWID vax country code: OWID_WRL"
        );
        assert_eq!(
            atlas.resolve_iso3("GBR", "OWID vax").unwrap_err().to_string(),
            "Missing OWID vax country: GB"
        );
        assert_eq!(atlas.resolve_iso3("USA", "OWID vax").map(|r| r.key().to_string()), Ok("US".to_string()));
    }

    #[test]
    fn population_gate() {
        let mut warnings = WarningCollector::new(AllowList::empty());
        let atlas = Atlas::new(tree(), &mut warnings);
        let us = atlas.by_iso2("US").unwrap();
        assert_eq!(
            require_population(us).unwrap_err().to_string(),
            "No population: World/US (pop=0)"
        );
        assert!(require_population(atlas.by_fips(6).unwrap()).is_ok());
    }
}
