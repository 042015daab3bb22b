//! COVID-19 US State Policy Database (`tinyurl.com/statepolicies`).
//!
//! The database is a Google Sheets document with one tab per policy
//! area. Each tab has a row per state and a column per policy; date
//! columns say when a policy took effect, and every other column is
//! detail that is validated and discarded.

use std::sync::LazyLock;

use chrono::NaiveDate;
use covid_atlas_source_models::PolicyEvent;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::SourceError;

pub const DOC_ID: &str = "1zu9qEWI8PsOI_i8nI_S29HDGHlIp2lfVMsGxpQ5tvAQ";

/// Environment variable holding the Google Sheets API key.
pub const API_KEY_VAR: &str = "COVID_ATLAS_SHEETS_API_KEY";

const SOURCE: &str = "state policy";

/// Tabs holding general information rather than policy columns.
const SKIP_TABS: &[&str] = &[
    "Information",
    "Vote By Mail",
    "Racial Disparities",
    "Codebook",
    "Notes/Details",
    "Pre-COVID UI Monetary Eligibility Thresholds",
];

const KEY_COLUMNS: [&str; 3] = ["State", "State Abbreviation", "State FIPS Code"];

/// Data rows that follow the header: 50 states and DC.
const STATE_ROWS: usize = 51;

static SCRATCH_TAB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Sheet\d+$").expect("valid regex"));
static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid regex"));

// ── Classification ────────────────────────────────────────────────────

/// Keyword test against a lowercased column name and tab title.
enum Rule {
    Name(&'static str),
    Exact(&'static str),
    Area(&'static str),
    Both(&'static str, &'static str),
}

impl Rule {
    fn matches(&self, name: &str, area: &str) -> bool {
        match self {
            Self::Name(k) => name.contains(k),
            Self::Exact(k) => name == *k,
            Self::Area(k) => area.contains(k),
            Self::Both(n, a) => name.contains(n) && area.contains(a),
        }
    }
}

/// First matching rule picks the emoji.
const EMOJI: &[(Rule, &str)] = &[
    (Rule::Name("state of emergency"), "🚨"),
    (Rule::Name("stay at home"), "🏠"),
    (Rule::Name("quarantine"), "\u{23f2}\u{fe0f}"),
    (Rule::Name("face mask"), "😷"),
    (Rule::Name("schools"), "🍎"),
    (Rule::Name("day cares"), "🧒"),
    (Rule::Name("childcare"), "🧒"),
    (Rule::Name("nursing homes"), "🧓"),
    (Rule::Name("businesses"), "🏢"),
    (Rule::Name("retail"), "\u{1f6cd}\u{fe0f}"),
    (Rule::Name("alcohol"), "🍾"),
    (Rule::Name("restaurants"), "🍝"),
    (Rule::Name("dining"), "🍝"),
    (Rule::Name("gyms"), "\u{1f3cb}\u{fe0f}"),
    (Rule::Name("movie theaters"), "\u{1f4fd}\u{fe0f}"),
    (Rule::Name("bars"), "🍻"),
    (Rule::Name("hair salons"), "💇"),
    (Rule::Name("construction"), "🚧"),
    (Rule::Name("religious"), "🛐"),
    (Rule::Name("eviction"), "🚪"),
    (Rule::Name("snap"), "🍞"),
    (Rule::Name("rent"), "💵"),
    (Rule::Name("mortgage"), "💵"),
    (Rule::Name("utility"), "🔌"),
    (Rule::Name("unemployment"), "\u{1f574}\u{fe0f}"),
    (Rule::Name("tele"), "📞"),
    (Rule::Name("medication"), "💊"),
    (Rule::Name("prescription"), "💊"),
    (Rule::Name("dea registration"), "💊"),
    (Rule::Name("medicaid"), "\u{2695}\u{fe0f}"),
    (Rule::Name("medical"), "🩺"),
    (Rule::Name("prisons"), "👮"),
    (Rule::Area("incarcerated"), "👮"),
    (Rule::Area("unemployment"), "💼"),
];

/// First matching rule picks the score: negative closes, positive reopens.
const SCORES: &[(Rule, i32)] = &[
    (Rule::Both("stay at home", "reopen"), 3),
    (Rule::Name("end stay at home"), 3),
    (Rule::Name("stay at home"), -3),
    (Rule::Exact("state of emergency"), -2),
    (Rule::Name("begin to re-close"), -1),
    (Rule::Name("closed k-12 schools"), -2),
    (Rule::Name("closed non-essential businesses"), -2),
    (Rule::Name("closed restaurants"), -2),
    (Rule::Name("close indoor dining"), -2),
    (Rule::Name("closed bars"), -2),
    (Rule::Name("close bars"), -2),
    (Rule::Area("physical distance closures"), -1),
    (Rule::Name("reopen businesses"), 2),
    (Rule::Name("reopen restaurants"), 2),
    (Rule::Name("reopen bars"), 2),
    (Rule::Name("reopen non-essential retail"), 2),
    (Rule::Area("reopening"), 1),
    (Rule::Name("re-close indoor dining"), -2),
    (Rule::Name("re-close bars"), -2),
    (Rule::Name("re-close"), -1),
    (Rule::Both("ended statewide", "masks"), 2),
    (Rule::Both("prevent local", "masks"), 2),
    (Rule::Both("public spaces", "masks"), -2),
    (Rule::Area("masks"), -1),
    (Rule::Name("quarantines ended"), 1),
    (Rule::Area("quarantine rules"), -1),
    (Rule::Name("suspended elective"), -1),
    (Rule::Both("stop", "incarcerated"), -1),
    (Rule::Both("resume", "incarcerated"), 1),
];

fn first_match<T: Copy>(rules: &[(Rule, T)], name: &str, area: &str, none: T) -> T {
    rules
        .iter()
        .find(|(rule, _)| rule.matches(name, area))
        .map_or(none, |(_, value)| *value)
}

/// What a column's values are, judged across every state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    /// Effective dates; each produces an event.
    Date,
    /// Flags and amounts describing the preceding policy.
    Detail,
    /// Empty or relocated.
    Skip,
}

fn classify<'a>(mut values: impl Iterator<Item = &'a str> + Clone) -> Option<ColumnKind> {
    let flag = |v: &str| v == "0" || v == "1";
    if values.clone().all(|v| v == "0" || v.is_empty()) {
        Some(ColumnKind::Skip)
    } else if values.clone().all(flag) {
        Some(ColumnKind::Detail)
    } else if values.clone().all(|v| flag(v) || v.contains('/')) {
        Some(ColumnKind::Date)
    } else if values.clone().all(|v| INTEGER_RE.is_match(v) || DECIMAL_RE.is_match(v)) {
        Some(ColumnKind::Detail)
    } else if values.all(|v| v.is_empty() || v.contains("moved to")) {
        Some(ColumnKind::Skip)
    } else {
        None
    }
}

struct Column {
    index: usize,
    name: String,
    score: i32,
    emoji: &'static str,
}

/// Cleans a column header into a policy name.
fn policy_name(header: &str) -> String {
    let name = header.replace("Stay at home order'", "Stay at home order");
    if !name.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("date ")) {
        return name;
    }
    let mut rest = name[5..].chars();
    rest.next()
        .map(|first| first.to_uppercase().chain(rest).collect())
        .unwrap_or_default()
}

/// Normalizes a date cell, returning `None` for "never".
///
/// Policies already in effect before the pandemic are coded as
/// `1/0/1900` or `1` and dated to the start of 2020.
fn parse_policy_date(value: &str) -> Option<Result<NaiveDate, String>> {
    let mut date = value.replace("already in effect", "").trim().replace('*', "");
    if date == "1/0/1900" || date == "1" {
        date = "1/1/2020".to_string();
    }
    if date.matches('/').count() == 1 {
        date.push_str("/2020");
    }
    if date.is_empty() || date == "0" {
        return None;
    }
    Some(NaiveDate::parse_from_str(&date, "%m/%d/%Y").map_err(|_| date))
}

// ── Parsing ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Document {
    sheets: Vec<Sheet>,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct BatchValues {
    #[serde(rename = "valueRanges")]
    value_ranges: Vec<ValueRange>,
}

#[derive(Deserialize)]
struct ValueRange {
    range: String,
    #[serde(default)]
    values: Option<Vec<Vec<Value>>>,
}

/// Renders an unformatted cell the way the sheet's own exports do.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Lists the tab titles from the document metadata.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if the metadata is malformed.
pub fn parse_tab_titles(json: &str) -> Result<Vec<String>, SourceError> {
    let doc: Document = serde_json::from_str(json)?;
    Ok(doc.sheets.into_iter().map(|s| s.properties.title).collect())
}

fn parse_tab(title: &str, values: &[Vec<Value>], out: &mut Vec<PolicyEvent>) -> Result<(), SourceError> {
    let fail = |message: String| SourceError::format(SOURCE, message);

    let header: Vec<String> = values
        .first()
        .map(|row| row.iter().map(cell_text).take_while(|h| !h.is_empty()).collect())
        .unwrap_or_default();
    if header.len() < KEY_COLUMNS.len() || header[..3] != KEY_COLUMNS {
        return Err(fail(format!("Unexpected columns in \"{title}\": {:?}", &header[..header.len().min(3)])));
    }

    let rows: Vec<Vec<String>> = values
        .iter()
        .skip(1)
        .take(STATE_ROWS)
        .map(|r| r.iter().map(cell_text).collect())
        .collect();
    for (i, row) in rows.iter().enumerate() {
        if row.len() < header.len() {
            return Err(fail(format!(
                "Short row {} in \"{title}\": len={} < {}",
                i + 2,
                row.len(),
                header.len()
            )));
        }
        let abbr_ok = row[1].len() == 2 && row[1].chars().all(|c| c.is_ascii_uppercase());
        let fips_ok = !row[2].is_empty() && row[2].chars().all(|c| c.is_ascii_digit());
        if !abbr_ok || !fips_ok {
            return Err(fail(format!("Unexpected data {:?} in \"{title}\" row {}", &row[..3], i + 2)));
        }
    }

    let area = title.to_lowercase();
    let mut dates = Vec::new();
    for (index, raw) in header.iter().enumerate().skip(KEY_COLUMNS.len()) {
        let raw = raw.trim();
        let values = rows.iter().map(|r| r[index].as_str());
        match classify(values.clone()) {
            Some(ColumnKind::Date) => {
                let norm = raw.to_lowercase();
                dates.push(Column {
                    index,
                    name: policy_name(raw),
                    score: first_match(SCORES, &norm, &area, 0),
                    emoji: first_match(EMOJI, &norm, &area, ""),
                });
            }
            Some(ColumnKind::Detail | ColumnKind::Skip) => {}
            None => {
                let listed: Vec<_> = values.collect();
                return Err(fail(format!("Inscrutable values in \"{title}\" / \"{raw}\": {listed:?}")));
            }
        }
    }
    log::debug!("{title}: {} date columns", dates.len());

    for (r, row) in rows.iter().enumerate() {
        let state_fips: u32 = row[2]
            .parse()
            .map_err(|_| fail(format!("Bad FIPS \"{}\" in \"{title}\"", row[2])))?;
        for col in &dates {
            let date = match parse_policy_date(&row[col.index]) {
                None => continue,
                Some(Ok(date)) => date,
                Some(Err(bad)) => {
                    return Err(fail(format!(
                        "Bad date \"{bad}\" in \"{title}\" / \"{}\" for {} (row {})",
                        col.name,
                        row[1],
                        r + 2
                    )));
                }
            };
            out.push(PolicyEvent {
                state_fips,
                date,
                area: title.to_string(),
                policy: col.name.clone(),
                score: col.score,
                emoji: col.emoji.to_string(),
            });
        }
    }
    Ok(())
}

/// Parses a `values:batchGet` response into events sorted by state and
/// date.
///
/// # Errors
///
/// Returns [`SourceError`] if a policy tab is missing its values, has an
/// unexpected layout, or holds values that cannot be classified.
pub fn parse_events(json: &str) -> Result<Vec<PolicyEvent>, SourceError> {
    let batch: BatchValues = serde_json::from_str(json)?;
    let mut out = Vec::new();
    for range in &batch.value_ranges {
        let title = range
            .range
            .split('!')
            .next()
            .unwrap_or_default()
            .trim_matches('\'')
            .trim();
        if SKIP_TABS.contains(&title) || SCRATCH_TAB_RE.is_match(title) {
            continue;
        }
        let values = range
            .values
            .as_deref()
            .ok_or_else(|| SourceError::format(SOURCE, format!("No values in \"{title}\"")))?;
        parse_tab(title, values, &mut out)?;
    }
    out.sort_by_key(|e| (e.state_fips, e.date));
    Ok(out)
}

// ── Fetching ──────────────────────────────────────────────────────────

async fn get_json(client: &reqwest::Client, url: &str, query: &[(&str, &str)]) -> Result<String, SourceError> {
    log::info!("Fetching {url}");
    Ok(client
        .get(url)
        .query(query)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?)
}

/// Fetches every tab of the policy database.
///
/// # Errors
///
/// Returns [`SourceError::MissingSetting`] if no API key is configured,
/// or any download or parse failure.
pub async fn fetch_events(client: &reqwest::Client) -> Result<Vec<PolicyEvent>, SourceError> {
    let key = std::env::var(API_KEY_VAR).map_err(|_| SourceError::MissingSetting { name: API_KEY_VAR })?;
    let doc_url = format!("https://sheets.googleapis.com/v4/spreadsheets/{DOC_ID}");

    let titles = parse_tab_titles(&get_json(client, &doc_url, &[("key", key.as_str())]).await?)?;
    let mut query = vec![
        ("key", key.as_str()),
        ("valueRenderOption", "UNFORMATTED_VALUE"),
        ("dateTimeRenderOption", "FORMATTED_STRING"),
    ];
    query.extend(titles.iter().map(|t| ("ranges", t.as_str())));

    let events = parse_events(&get_json(client, &format!("{doc_url}/values:batchGet"), &query).await?)?;
    log::info!("Loaded {} policy events from {} tabs", events.len(), titles.len());
    Ok(events)
}
