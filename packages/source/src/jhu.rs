//! JHU CSSE place list and cumulative case time series.
//!
//! The lookup table supplies every place (country, province, US county)
//! with its UID, codes, and population. Case counts come from the four
//! time-series tables: US tables carry the UID directly, global tables
//! are keyed by country and province name and matched to the lookup.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use covid_atlas_region_models::fips;
use covid_atlas_source_models::{CaseCount, PlaceRecord};
use serde::Deserialize;

use crate::parsing::{lat_lon, read_csv};
use crate::{SourceError, fetch_text};

const DATA_URL: &str =
    "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data";

/// Place lookup table.
pub const LOOKUP_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/UID_ISO_FIPS_LookUp_Table.csv";

const SOURCE: &str = "JHU";

#[derive(Deserialize)]
struct LookupRow {
    #[serde(rename = "UID")]
    uid: String,
    iso2: String,
    #[serde(rename = "FIPS")]
    fips: String,
    #[serde(rename = "Admin2")]
    admin2: String,
    #[serde(rename = "Province_State")]
    province_state: String,
    #[serde(rename = "Country_Region")]
    country_region: String,
    #[serde(rename = "Lat", default, deserialize_with = "csv::invalid_option")]
    lat: Option<f64>,
    #[serde(rename = "Long_", default, deserialize_with = "csv::invalid_option")]
    lon: Option<f64>,
    #[serde(rename = "Population", default, deserialize_with = "csv::invalid_option")]
    population: Option<f64>,
}

/// Parses the UID lookup table.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the table is malformed.
pub fn parse_places(text: &str) -> Result<Vec<PlaceRecord>, SourceError> {
    let rows: Vec<LookupRow> = read_csv(text)?;
    Ok(rows
        .into_iter()
        .map(|r| PlaceRecord {
            place_id: r.uid,
            iso2: r.iso2,
            country_region: r.country_region,
            province_state: r.province_state,
            admin2: r.admin2,
            fips: fips::parse(&r.fips).filter(|f| *f > 0),
            lat_lon: lat_lon(r.lat, r.lon),
            population: r.population.filter(|p| *p > 0.0),
        })
        .collect())
}

/// Cumulative values keyed by place ID and date.
type Cumulative = BTreeMap<(String, NaiveDate), f64>;

/// How a time-series table names its places.
enum PlaceKey<'a> {
    /// A `UID` column.
    Uid,
    /// `Country/Region` and `Province/State` columns, matched to place IDs
    /// of non-county places.
    Names(&'a HashMap<(&'a str, &'a str), &'a str>),
}

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize, SourceError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| SourceError::format(SOURCE, format!("no \"{name}\" column")))
}

/// Parses one wide time-series table (one column per day).
fn parse_time_series(text: &str, key: &PlaceKey<'_>) -> Result<Cumulative, SourceError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let dates: Vec<(usize, NaiveDate)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| Some((i, NaiveDate::parse_from_str(h, "%m/%d/%y").ok()?)))
        .collect();
    if dates.is_empty() {
        return Err(SourceError::format(SOURCE, "time series has no date columns"));
    }

    let columns = match key {
        PlaceKey::Uid => (column(&headers, "UID")?, None),
        PlaceKey::Names(_) => (
            column(&headers, "Country/Region")?,
            Some(column(&headers, "Province/State")?),
        ),
    };

    let mut out = Cumulative::new();
    let mut unmatched = 0_usize;
    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let place_id = match (key, columns) {
            (PlaceKey::Uid, (uid, _)) => Some(field(uid).to_string()),
            (PlaceKey::Names(ids), (country, Some(province))) => ids
                .get(&(field(country), field(province)))
                .map(|id| (*id).to_string()),
            (PlaceKey::Names(_), (_, None)) => None,
        };
        let Some(place_id) = place_id else {
            unmatched += 1;
            continue;
        };

        for &(i, date) in &dates {
            let text = field(i);
            if text.is_empty() {
                continue;
            }
            let value: f64 = text.parse().map_err(|_| {
                SourceError::format(SOURCE, format!("bad count \"{text}\" for {place_id} on {date}"))
            })?;
            if out.insert((place_id.clone(), date), value).is_some() {
                return Err(SourceError::format(
                    SOURCE,
                    format!("duplicate time series for {place_id}"),
                ));
            }
        }
    }

    if unmatched > 0 {
        log::debug!("{unmatched} JHU time series rows matched no place");
    }
    Ok(out)
}

/// Name index of places above county level.
fn place_names(places: &[PlaceRecord]) -> HashMap<(&str, &str), &str> {
    places
        .iter()
        .filter(|p| p.admin2.is_empty())
        .map(|p| {
            (
                (p.country_region.as_str(), p.province_state.as_str()),
                p.place_id.as_str(),
            )
        })
        .collect()
}

/// Joins confirmed and death tables into daily case counts.
fn join(confirmed: Cumulative, mut deaths: Cumulative) -> Vec<CaseCount> {
    let mut out: Vec<CaseCount> = confirmed
        .into_iter()
        .map(|((place_id, date), confirmed)| {
            let deaths = deaths.remove(&(place_id.clone(), date));
            CaseCount {
                place_id,
                date,
                confirmed: Some(confirmed),
                deaths,
            }
        })
        .collect();
    out.extend(deaths.into_iter().map(|((place_id, date), deaths)| CaseCount {
        place_id,
        date,
        confirmed: None,
        deaths: Some(deaths),
    }));
    out.sort_by(|a, b| (&a.place_id, a.date).cmp(&(&b.place_id, b.date)));
    out
}

/// Parses the four time-series tables into case counts.
///
/// # Errors
///
/// Returns [`SourceError`] if a table is malformed or names a place twice.
pub fn parse_cases(
    places: &[PlaceRecord],
    us_confirmed: &str,
    us_deaths: &str,
    global_confirmed: &str,
    global_deaths: &str,
) -> Result<Vec<CaseCount>, SourceError> {
    let names = place_names(places);
    let by_names = PlaceKey::Names(&names);

    let mut confirmed = parse_time_series(us_confirmed, &PlaceKey::Uid)?;
    confirmed.extend(parse_time_series(global_confirmed, &by_names)?);
    let mut deaths = parse_time_series(us_deaths, &PlaceKey::Uid)?;
    deaths.extend(parse_time_series(global_deaths, &by_names)?);
    Ok(join(confirmed, deaths))
}

/// Fetches the place list.
///
/// # Errors
///
/// Returns [`SourceError`] if the download or parse fails.
pub async fn fetch_places(client: &reqwest::Client) -> Result<Vec<PlaceRecord>, SourceError> {
    let places = parse_places(&fetch_text(client, LOOKUP_URL).await?)?;
    log::info!("Loaded {} JHU places", places.len());
    Ok(places)
}

/// Fetches cumulative cases and deaths for every place.
///
/// # Errors
///
/// Returns [`SourceError`] if a download or parse fails.
pub async fn fetch_cases(
    client: &reqwest::Client,
    places: &[PlaceRecord],
) -> Result<Vec<CaseCount>, SourceError> {
    let table = |name: &str| format!("{DATA_URL}/csse_covid_19_time_series/time_series_covid19_{name}.csv");
    let us_confirmed = fetch_text(client, &table("confirmed_US")).await?;
    let us_deaths = fetch_text(client, &table("deaths_US")).await?;
    let global_confirmed = fetch_text(client, &table("confirmed_global")).await?;
    let global_deaths = fetch_text(client, &table("deaths_global")).await?;

    let cases = parse_cases(places, &us_confirmed, &us_deaths, &global_confirmed, &global_deaths)?;
    log::info!("Loaded {} JHU case counts", cases.len());
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOKUP: &str = "\
UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,Population
276,DE,DEU,276,,,,Germany,51.165691,10.451526,Germany,83783945
840,US,USA,840,,,,US,40,-100,US,329466283
84000006,US,USA,840,6,,California,US,36.1162,-119.6816,\"California, US\",39512223
84006085,US,USA,840,06085,Santa Clara,California,US,37.23104908,-121.6970462,\"Santa Clara, California, US\",1927852
84099999,US,USA,840,,Unassigned,California,US,0,0,\"Unassigned, California, US\",
";

    const US_CONFIRMED: &str = "\
UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,1/22/20,1/23/20
84006085,US,USA,840,6085.0,Santa Clara,California,US,37.2,-121.7,\"Santa Clara, California, US\",0,2
";

    const US_DEATHS: &str = "\
UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,Population,1/22/20,1/23/20
84006085,US,USA,840,6085.0,Santa Clara,California,US,37.2,-121.7,\"Santa Clara, California, US\",1927852,0,1
";

    const GLOBAL_CONFIRMED: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20
,Germany,51.2,10.5,1,4
,Atlantis,0,0,1,1
";

    const GLOBAL_DEATHS: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20
,Germany,51.2,10.5,0,
";

    #[test]
    fn lookup_rows_become_places() {
        let places = parse_places(LOOKUP).unwrap();
        assert_eq!(places.len(), 5);
        let sc = &places[3];
        assert_eq!(sc.place_id, "84006085");
        assert_eq!(sc.fips, Some(6085));
        assert_eq!(sc.admin2, "Santa Clara");
        assert_eq!(sc.population, Some(1_927_852.0));
        assert!(places[0].fips.is_none());
        assert!(places[4].population.is_none());
        assert!(places[4].lat_lon.is_none());
    }

    #[test]
    fn time_series_join_by_uid_and_name() {
        let places = parse_places(LOOKUP).unwrap();
        let cases =
            parse_cases(&places, US_CONFIRMED, US_DEATHS, GLOBAL_CONFIRMED, GLOBAL_DEATHS).unwrap();
        assert_eq!(cases.len(), 4);

        let de: Vec<_> = cases.iter().filter(|c| c.place_id == "276").collect();
        assert_eq!(de[0].confirmed, Some(1.0));
        assert_eq!(de[0].deaths, Some(0.0));
        assert_eq!(de[1].confirmed, Some(4.0));
        assert_eq!(de[1].deaths, None);

        let sc: Vec<_> = cases.iter().filter(|c| c.place_id == "84006085").collect();
        assert_eq!(sc[1].date, NaiveDate::from_ymd_opt(2020, 1, 23).unwrap());
        assert_eq!((sc[1].confirmed, sc[1].deaths), (Some(2.0), Some(1.0)));
    }

    #[test]
    fn garbled_counts_are_rejected() {
        let places = parse_places(LOOKUP).unwrap();
        let bad = GLOBAL_CONFIRMED.replace(",1,4", ",1,four");
        let err = parse_cases(&places, US_CONFIRMED, US_DEATHS, &bad, GLOBAL_DEATHS).unwrap_err();
        assert!(err.to_string().contains("bad count \"four\""), "{err}");
    }
}
