//! US state and territory FIPS code utilities.
//!
//! State-level FIPS codes are two digits; county codes append three more
//! (so `6085` is Santa Clara County in California, `6`). Codes are handled
//! as integers because source data is inconsistent about zero padding.

/// A US state, district, or territory with its FIPS code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsState {
    /// Two-digit state FIPS code.
    pub fips: u32,
    /// Two-letter postal abbreviation.
    pub abbr: &'static str,
    /// Full name as used for region keys.
    pub name: &'static str,
}

const fn st(fips: u32, abbr: &'static str, name: &'static str) -> UsState {
    UsState { fips, abbr, name }
}

/// The 50 states, DC, and the inhabited territories.
pub const US_STATES: &[UsState] = &[
    st(1, "AL", "Alabama"),
    st(2, "AK", "Alaska"),
    st(4, "AZ", "Arizona"),
    st(5, "AR", "Arkansas"),
    st(6, "CA", "California"),
    st(8, "CO", "Colorado"),
    st(9, "CT", "Connecticut"),
    st(10, "DE", "Delaware"),
    st(11, "DC", "District of Columbia"),
    st(12, "FL", "Florida"),
    st(13, "GA", "Georgia"),
    st(15, "HI", "Hawaii"),
    st(16, "ID", "Idaho"),
    st(17, "IL", "Illinois"),
    st(18, "IN", "Indiana"),
    st(19, "IA", "Iowa"),
    st(20, "KS", "Kansas"),
    st(21, "KY", "Kentucky"),
    st(22, "LA", "Louisiana"),
    st(23, "ME", "Maine"),
    st(24, "MD", "Maryland"),
    st(25, "MA", "Massachusetts"),
    st(26, "MI", "Michigan"),
    st(27, "MN", "Minnesota"),
    st(28, "MS", "Mississippi"),
    st(29, "MO", "Missouri"),
    st(30, "MT", "Montana"),
    st(31, "NE", "Nebraska"),
    st(32, "NV", "Nevada"),
    st(33, "NH", "New Hampshire"),
    st(34, "NJ", "New Jersey"),
    st(35, "NM", "New Mexico"),
    st(36, "NY", "New York"),
    st(37, "NC", "North Carolina"),
    st(38, "ND", "North Dakota"),
    st(39, "OH", "Ohio"),
    st(40, "OK", "Oklahoma"),
    st(41, "OR", "Oregon"),
    st(42, "PA", "Pennsylvania"),
    st(44, "RI", "Rhode Island"),
    st(45, "SC", "South Carolina"),
    st(46, "SD", "South Dakota"),
    st(47, "TN", "Tennessee"),
    st(48, "TX", "Texas"),
    st(49, "UT", "Utah"),
    st(50, "VT", "Vermont"),
    st(51, "VA", "Virginia"),
    st(53, "WA", "Washington"),
    st(54, "WV", "West Virginia"),
    st(55, "WI", "Wisconsin"),
    st(56, "WY", "Wyoming"),
    st(60, "AS", "American Samoa"),
    st(66, "GU", "Guam"),
    st(69, "MP", "Northern Mariana Islands"),
    st(72, "PR", "Puerto Rico"),
    st(78, "VI", "Virgin Islands"),
];

/// Looks up a state by numeric FIPS code.
#[must_use]
pub fn by_fips(fips: u32) -> Option<&'static UsState> {
    US_STATES.iter().find(|s| s.fips == fips)
}

/// Looks up a state by postal abbreviation, case-insensitively.
#[must_use]
pub fn by_abbr(abbr: &str) -> Option<&'static UsState> {
    US_STATES.iter().find(|s| s.abbr.eq_ignore_ascii_case(abbr))
}

/// Looks up a state by full name, case-insensitively.
#[must_use]
pub fn by_name(name: &str) -> Option<&'static UsState> {
    US_STATES.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

/// State FIPS code of a state or county FIPS code.
#[must_use]
pub const fn state_of(fips: u32) -> u32 {
    if fips >= 1000 { fips / 1000 } else { fips }
}

/// Whether `fips` names a county (five digits) rather than a state.
#[must_use]
pub const fn is_county(fips: u32) -> bool {
    fips >= 1000
}

/// Parses a FIPS code from text such as `"06085"`, `"6085"`, or `"6085.0"`.
#[must_use]
pub fn parse(text: &str) -> Option<u32> {
    let text = text.trim();
    let text = text.strip_suffix(".0").unwrap_or(text);
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parses an ISO 3166-2 US subdivision code like `"US-CA"` into a state.
#[must_use]
pub fn from_iso_3166_2(code: &str) -> Option<&'static UsState> {
    by_abbr(code.strip_prefix("US-")?)
}
