//! Multi-county groupings.
//!
//! Some health departments report for several counties at once. Counties
//! in these groups are placed under a synthetic node between the state and
//! the county so the group can receive its own data and roll-ups.

/// A synthetic region spanning several counties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountyGroup {
    /// Subregion key under the state.
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Member county FIPS codes.
    pub counties: &'static [u32],
}

/// Every known multi-county group.
pub const COUNTY_GROUPS: &[CountyGroup] = &[
    CountyGroup {
        key: "NYC",
        name: "New York City",
        counties: &[36005, 36047, 36061, 36081, 36085],
    },
    CountyGroup {
        key: "Bear River",
        name: "Bear River Area",
        counties: &[49003, 49005, 49033],
    },
    CountyGroup {
        key: "Central Utah",
        name: "Central Utah Area",
        counties: &[49023, 49027, 49039, 49041, 49031, 49055],
    },
    CountyGroup {
        key: "Southeast Utah",
        name: "Southeast Utah Area",
        counties: &[49007, 49015, 49019],
    },
    CountyGroup {
        key: "Southwest Utah",
        name: "Southwest Utah Area",
        counties: &[49001, 49017, 49021, 49025, 49053],
    },
    CountyGroup {
        key: "TriCounty",
        name: "TriCounty Area",
        counties: &[49009, 49013, 49047],
    },
    CountyGroup {
        key: "Weber-Morgan",
        name: "Weber-Morgan Area",
        counties: &[49057, 49029],
    },
];

/// The group containing county `fips`, if any.
#[must_use]
pub fn group_for(fips: u32) -> Option<&'static CountyGroup> {
    COUNTY_GROUPS.iter().find(|g| g.counties.contains(&fips))
}
