//! Probing helpers over the free-form program metadata.
//!
//! The source exports carry no schema: the same logical field appears under
//! different names depending on the capture tool version, dates come with or
//! without separators, and times in three shapes. Every predicate in the
//! record filter and every display formatter goes through these helpers so
//! that the "which field names, in which order" knowledge lives in exactly
//! one place.

use serde_json::Value;

use crate::models::Metadata;

/// Field-name alternates for a record's broadcast date, in probe order.
pub const DATE_FIELDS: &[&str] = &["date", "broadcast_date", "air_date"];

/// Field-name alternates for a record's start time, in probe order.
pub const START_TIME_FIELDS: &[&str] = &["start_time", "broadcast_start_time"];

/// Field-name alternates for a record's end time, in probe order.
pub const END_TIME_FIELDS: &[&str] = &["end_time", "broadcast_end_time"];

/// Field-name alternates for the channel / station name.
pub const CHANNEL_FIELDS: &[&str] = &["channel", "station", "channel_name"];

/// Field-name alternates for the program genre.
pub const GENRE_FIELDS: &[&str] = &["genre", "program_genre"];

/// Field-name alternates for the program name.
pub const PROGRAM_NAME_FIELDS: &[&str] = &["program_name", "title", "program_title"];

/// Field-name alternates for performer text (beyond the structured
/// `talents` list, which is probed first).
pub const PERFORMER_FIELDS: &[&str] = &["performers", "cast", "talent"];

/// Field-name alternates contributing to the keyword haystack.
pub const KEYWORD_FIELDS: &[&str] = &[
    "program_name",
    "title",
    "program_title",
    "description",
    "program_description",
    "summary",
    "channel",
    "station",
];

/// Channel sentinel meaning "no channel restriction".
pub const CHANNEL_ALL: &str = "すべて";

/// Decorative symbols stripped before multi-select program-name matching.
const DECORATIVE: &[char] = &[
    '【', '】', '「', '」', '『', '』', '☆', '★', '◆', '■', '●', '▼', '▲', '○', '◎',
    '＜', '＞', '〈', '〉', '《', '》', '・', '〜', '～', '!', '！', '?', '？',
];

/// Return the first alternate that is present as a non-empty string.
pub fn first_present_str<'a>(metadata: &'a Metadata, fields: &[&str]) -> Option<&'a str> {
    for field in fields {
        if let Some(Value::String(s)) = metadata.get(*field) {
            if !s.trim().is_empty() {
                return Some(s.as_str());
            }
        }
    }
    None
}

/// Resolve a record's broadcast date to canonical `YYYYMMDD`.
///
/// Probes the date alternates first; when none yields eight digits, falls
/// back to the first eight digits of a start-time alternate. Returns `None`
/// when no alternate parses — the date predicate then fails closed.
pub fn record_date(metadata: &Metadata) -> Option<String> {
    for fields in [DATE_FIELDS, START_TIME_FIELDS] {
        if let Some(raw) = first_present_str(metadata, fields) {
            if let Some(date) = leading_digits(raw, 8) {
                return Some(date);
            }
        }
    }
    None
}

/// Extract the first `n` digits from a string, ignoring separators, and
/// require at least `n` to be present.
fn leading_digits(raw: &str, n: usize) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).take(n).collect();
    if digits.len() == n {
        Some(digits)
    } else {
        None
    }
}

/// Normalize a query or record date to `YYYYMMDD` (accepts `2025-08-25`,
/// `2025/08/25`, or bare digits).
pub fn normalize_date(raw: &str) -> Option<String> {
    leading_digits(raw, 8)
}

/// Normalize a time string to minutes since midnight.
///
/// Accepts `HH:MM`, `HH:MM:SS`, bare `HHMM`, and 12-digit `YYYYMMDDHHMM`
/// timestamps (the export tools use all four). Out-of-range components
/// return `None`.
pub fn normalize_minutes(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (hh, mm) = if raw.contains(':') {
        let mut parts = raw.splitn(3, ':');
        let hh = parts.next()?.parse::<i64>().ok()?;
        let mm = parts.next()?.parse::<i64>().ok()?;
        (hh, mm)
    } else {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let hhmm = match digits.len() {
            4 => &digits[..],
            12 => &digits[8..12],
            _ => return None,
        };
        let hh = hhmm[..2].parse::<i64>().ok()?;
        let mm = hhmm[2..].parse::<i64>().ok()?;
        (hh, mm)
    };
    if (0..24).contains(&hh) && (0..60).contains(&mm) {
        Some(hh * 60 + mm)
    } else {
        None
    }
}

/// Resolve a record's start/end minutes from the metadata alternates.
pub fn record_time_window(metadata: &Metadata) -> (Option<i64>, Option<i64>) {
    let start = first_present_str(metadata, START_TIME_FIELDS).and_then(normalize_minutes);
    let end = first_present_str(metadata, END_TIME_FIELDS).and_then(normalize_minutes);
    (start, end)
}

/// Strip EPG decoration from a channel name: a leading all-digit ordinal
/// token ("011 NHK総合1・東京" → "NHK総合1・東京") and trailing periods.
pub fn clean_channel(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_ordinal = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) => {
            rest.trim_start()
        }
        _ => trimmed,
    };
    without_ordinal.trim_end_matches('.').trim().to_string()
}

/// Case-insensitive bidirectional substring containment: true when either
/// side contains the other. Empty sides never match.
pub fn contains_bidirectional(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Remove decorative EPG symbols and whitespace for multi-select
/// program-name matching.
pub fn strip_decorative(raw: &str) -> String {
    raw.chars()
        .filter(|c| !DECORATIVE.contains(c) && !c.is_whitespace())
        .collect()
}

/// Names from the structured `talents` list: objects with a `name` field,
/// or plain strings. Absent or malformed entries are skipped.
pub fn talent_names(metadata: &Metadata) -> Vec<String> {
    let Some(Value::Array(items)) = metadata.get("talents") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(obj) => match obj.get("name") {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// `YYYYMMDD` → `YYYY-MM-DD` for display; anything else passes through.
pub fn format_date_display(raw: &str) -> String {
    match normalize_date(raw) {
        Some(d) => format!("{}-{}-{}", &d[..4], &d[4..6], &d[6..8]),
        None => raw.to_string(),
    }
}

/// Time string → `HH:MM` for display; unparseable input passes through.
pub fn format_time_display(raw: &str) -> String {
    match normalize_minutes(raw) {
        Some(minutes) => format!("{:02}:{:02}", minutes / 60, minutes % 60),
        None => raw.to_string(),
    }
}
