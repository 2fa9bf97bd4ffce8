// Field lookup over loosely-shaped JSON records.
//
// Exports disagree on key casing (`playerName` vs `PlayerName`) and naming
// (`player_name`), so every lookup takes an ordered list of candidate names
// and falls back to a case-insensitive match against the keys actually
// present. Missing or malformed counting fields resolve to zero and missing
// text resolves to an empty string; only dates are mandatory, and only where
// the caller says so.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// A single JSON object from the input document.
pub type Record = Map<String, Value>;

/// Timestamp layouts accepted by the generic parse, before the date-only
/// formats below.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Date-only layouts, tried in order. `YYYYMMDD` is handled separately by
/// [`parse_compact_date`].
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Non-null value under `name`, exact key first. A null under one spelling
/// does not hide a value under another.
fn lookup<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    record.get(name).filter(|value| !value.is_null()).or_else(|| {
        record
            .iter()
            .find(|(key, value)| key.eq_ignore_ascii_case(name) && !value.is_null())
            .map(|(_, value)| value)
    })
}

/// Return the first non-null value found under any of `candidates`.
pub fn resolve_value<'a>(record: &'a Record, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|name| lookup(record, name))
        .find(|value| !value.is_null())
}

/// Resolve a text field. Strings pass through unchanged and numbers are
/// stringified; any other JSON type is ignored and the next candidate tried.
pub fn resolve_str(record: &Record, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|name| match lookup(record, name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Like [`resolve_str`], but trimmed and defaulting to an empty string.
pub fn resolve_text(record: &Record, candidates: &[&str]) -> String {
    resolve_str(record, candidates)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Like [`resolve_text`], but blank values become `None`.
pub fn resolve_opt_text(record: &Record, candidates: &[&str]) -> Option<String> {
    let text = resolve_text(record, candidates);
    (!text.is_empty()).then_some(text)
}

/// Resolve an integer field, or `None` when no candidate holds something
/// that reads as an integer. Floats are truncated and numeric strings parsed.
pub fn resolve_int_opt(record: &Record, candidates: &[&str]) -> Option<i64> {
    candidates.iter().find_map(|name| match lookup(record, name)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Resolve a counting field. Anything missing or non-numeric is 0.
pub fn resolve_int(record: &Record, candidates: &[&str]) -> i64 {
    resolve_int_opt(record, candidates).unwrap_or(0)
}

/// Resolve a flag. JSON `true`, non-zero numbers and the strings
/// `true`/`1`/`y`/`yes` (any case) are true; everything else is false.
pub fn resolve_bool(record: &Record, candidates: &[&str]) -> bool {
    match resolve_value(record, candidates) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            ["true", "1", "y", "yes"]
                .iter()
                .any(|t| s.eq_ignore_ascii_case(t))
        }
        _ => false,
    }
}

/// Resolve a nested array; absent or non-array values yield an empty slice.
pub fn resolve_array<'a>(record: &'a Record, candidates: &[&str]) -> &'a [Value] {
    match resolve_value(record, candidates) {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    }
}

/// Resolve and parse a date field. See [`parse_date`].
pub fn resolve_date(record: &Record, candidates: &[&str]) -> Option<NaiveDate> {
    candidates
        .iter()
        .filter_map(|name| resolve_str(record, &[*name]))
        .find_map(|raw| parse_date(&raw))
}

/// Parse a date, trying a generic timestamp parse (RFC 3339, ISO date-time)
/// first and then `YYYY-MM-DD`, `YYYY/MM/DD` and `YYYYMMDD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt.date());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_compact_date(raw))
}

fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = raw[..4].parse().ok()?;
    let month = raw[4..6].parse().ok()?;
    let day = raw[6..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
