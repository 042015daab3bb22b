//! Builds the region skeleton from place metadata.

use covid_atlas_region_models::{POPULATION, Region, countries};
use covid_atlas_source_models::PlaceRecord;
use covid_atlas_warnings::WarningCollector;

use crate::Atlas;
use crate::groups::group_for;

impl Atlas {
    /// Builds and indexes the region tree for `places`.
    ///
    /// Places without a positive population are skipped entirely. Each
    /// remaining place becomes (or updates) the node at
    /// country / state / \[county group\] / county, and the world population
    /// is the sum of the countries' populations.
    #[must_use]
    pub fn from_places(places: &[PlaceRecord], warnings: &mut WarningCollector) -> Self {
        let mut world = Region::world();
        let mut skipped = 0_usize;

        for place in places {
            if !place.population.is_some_and(|p| p > 0.0) {
                skipped += 1;
                continue;
            }
            add_place(&mut world, place);
        }

        let world_pop: f64 = world
            .subregions
            .values()
            .map(|r| r.metrics.population())
            .sum();
        world.metrics.set_total(POPULATION, world_pop);

        log::info!(
            "Built region tree: {} countries, {} places ({skipped} without population)",
            world.subregions.len(),
            places.len() - skipped
        );
        Self::new(world, warnings)
    }
}

fn add_place(world: &mut Region, place: &PlaceRecord) {
    // Territories stay under their parent country even with their own code.
    let country_iso = countries::lookup(&place.country_region)
        .map_or_else(|| place.iso2.clone(), |c| c.alpha2.to_string());

    let mut region = world.subregion(&country_iso, Some(&place.country_region));
    region.iso_code = Some(country_iso.clone());

    if !place.province_state.is_empty() {
        region = region.subregion(&place.province_state, None);
        if !place.iso2.is_empty() && place.iso2 != country_iso {
            region.iso_code = Some(place.iso2.clone());
        }
    }

    if let Some(group) = place.fips.and_then(group_for) {
        region = region.subregion(group.key, Some(group.name));
    }

    if !place.admin2.is_empty() {
        region = region.subregion(&place.admin2, None);
    }

    if place.fips.is_some() {
        region.fips_code = place.fips;
    }
    region.place_id = Some(place.place_id.clone());
    region
        .metrics
        .set_total(POPULATION, place.population.unwrap_or_default());
    if let Some((lat, lon)) = place.lat_lon
        && (lat != 0.0 || lon != 0.0)
    {
        region.lat_lon = Some((lat, lon));
    }
}

#[cfg(test)]
mod tests {
    use covid_atlas_warnings::AllowList;

    use super::*;

    fn place(id: &str, iso2: &str, country: &str, state: &str, county: &str) -> PlaceRecord {
        PlaceRecord {
            place_id: id.to_string(),
            iso2: iso2.to_string(),
            country_region: country.to_string(),
            province_state: state.to_string(),
            admin2: county.to_string(),
            fips: None,
            lat_lon: Some((1.0, 2.0)),
            population: Some(100.0),
        }
    }

    fn build(places: &[PlaceRecord]) -> Atlas {
        let mut warnings = WarningCollector::new(AllowList::empty());
        let atlas = Atlas::from_places(places, &mut warnings);
        assert!(warnings.is_clean(), "{:?}", warnings.unknown());
        atlas
    }

    #[test]
    fn builds_hierarchy_with_indexes() {
        let mut ny = place("84036061", "US", "US", "New York", "New York");
        ny.fips = Some(36061);
        let mut state = place("84000036", "US", "US", "New York", "");
        state.fips = Some(36);
        state.population = Some(19_000_000.0);
        let atlas = build(&[place("840", "US", "US", "", ""), state, ny]);

        let county = atlas.by_fips(36061).unwrap();
        assert_eq!(county.debug_path(), "World/US/New York/NYC/New York");
        assert_eq!(atlas.by_fips(36).map(Region::key), Some("New York"));
        assert_eq!(atlas.by_place_id("840").map(Region::key), Some("US"));
        assert_eq!(county.lat_lon, Some((1.0, 2.0)));

        let nyc = atlas.by_fips(36).unwrap().subregions.get("NYC").unwrap();
        assert_eq!(nyc.name, "New York City");
        assert!(nyc.metrics.population().abs() < f64::EPSILON);
    }

    #[test]
    fn skips_places_without_population() {
        let mut cruise = place("9999", "", "Diamond Princess", "", "");
        cruise.population = None;
        let mut zero = place("8888", "FR", "France", "", "");
        zero.population = Some(0.0);
        let atlas = build(&[cruise, zero]);
        assert!(atlas.world.subregions.is_empty());
    }

    #[test]
    fn territory_keeps_own_code_under_parent_country() {
        let atlas = build(&[
            place("250", "FR", "France", "", ""),
            place("2500", "GP", "France", "Guadeloupe", ""),
        ]);
        let gp = atlas.by_iso2("GP").unwrap();
        assert_eq!(gp.debug_path(), "World/FR/Guadeloupe");
        assert_eq!(atlas.by_iso2("FR").map(Region::key), Some("FR"));
    }

    #[test]
    fn unknown_country_falls_back_to_record_code() {
        let atlas = build(&[place("383", "XK", "Kosovo Republic", "", "")]);
        assert_eq!(atlas.by_iso2("XK").map(|r| r.name.as_str()), Some("Kosovo Republic"));
    }

    #[test]
    fn world_population_is_sum_of_countries() {
        let mut de = place("276", "DE", "Germany", "", "");
        de.population = Some(80.0);
        let mut fr = place("250", "FR", "France", "", "");
        fr.population = Some(60.0);
        let atlas = build(&[de, fr]);
        assert!((atlas.world.metrics.population() - 140.0).abs() < f64::EPSILON);
    }
}
