//! The record filter: multi-predicate, AND-composed matching over index
//! entries.
//!
//! Pure function of its inputs (including "today", passed explicitly so
//! period predicates are testable). Every predicate short-circuits; a
//! record that fails to parse for a predicate simply does not match that
//! predicate — one bad record never aborts a search. Enumeration stops as
//! soon as the result cap is reached, and the truncation is surfaced to the
//! caller rather than silently dropping data.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::fields;
use crate::models::{IndexEntry, Metadata};

/// Time-period restriction, resolved against an explicit "today".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    All,
    /// Monday through Sunday of the week containing today.
    ThisWeek,
    /// Monday through Sunday of the previous week.
    LastWeek,
    /// The 30 days up to and including today.
    PastMonth,
    /// Records whose broadcast date falls on one of these weekdays.
    Weekdays(Vec<Weekday>),
    /// Inclusive YYYYMMDD bounds; either side may be open.
    Custom {
        start: Option<String>,
        end: Option<String>,
    },
}

/// All query predicates. Empty/`None` fields impose no restriction.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub date: Option<String>,
    /// Query instant, any of the accepted time shapes.
    pub time: Option<String>,
    pub channel: Option<String>,
    pub genre: Option<String>,
    pub program_name: Option<String>,
    pub performer: Option<String>,
    /// Multi-select program names; a record matches when ANY selected name
    /// matches (decoration-stripped).
    pub program_names: Vec<String>,
    pub period: Period,
    pub keyword: Option<String>,
}

/// Filter result: the matching records plus whether the cap cut the
/// enumeration short.
#[derive(Debug)]
pub struct FilterOutcome {
    pub records: Vec<IndexEntry>,
    pub truncated: bool,
}

/// Apply every restriction in `criteria` to `entries`, in order, keeping
/// records that satisfy all of them.
pub fn filter_records(
    entries: &[IndexEntry],
    criteria: &SearchCriteria,
    tolerance_minutes: i64,
    max_results: usize,
    today: NaiveDate,
) -> FilterOutcome {
    let mut records = Vec::new();
    let mut truncated = false;

    for entry in entries {
        if records.len() >= max_results {
            truncated = true;
            break;
        }
        if matches(entry, criteria, tolerance_minutes, today) {
            records.push(entry.clone());
        }
    }

    FilterOutcome { records, truncated }
}

fn matches(
    entry: &IndexEntry,
    criteria: &SearchCriteria,
    tolerance_minutes: i64,
    today: NaiveDate,
) -> bool {
    let m = &entry.metadata;

    if let Some(query) = &criteria.date {
        if !date_matches(m, query) {
            return false;
        }
    }
    if let Some(query) = &criteria.time {
        if !time_matches(m, query, tolerance_minutes) {
            return false;
        }
    }
    if let Some(query) = &criteria.channel {
        if !channel_matches(m, query) {
            return false;
        }
    }
    if let Some(query) = &criteria.genre {
        if !genre_matches(m, query) {
            return false;
        }
    }
    if let Some(query) = &criteria.program_name {
        if !text_fields_match(m, fields::PROGRAM_NAME_FIELDS, query) {
            return false;
        }
    }
    if let Some(query) = &criteria.performer {
        if !performer_matches(m, query) {
            return false;
        }
    }
    if !criteria.program_names.is_empty() && !multi_select_matches(m, &criteria.program_names) {
        return false;
    }
    if !period_matches(m, &criteria.period, today) {
        return false;
    }
    if let Some(query) = &criteria.keyword {
        if !keyword_matches(entry, query) {
            return false;
        }
    }

    true
}

fn date_matches(metadata: &Metadata, query: &str) -> bool {
    let Some(query_date) = fields::normalize_date(query) else {
        return false;
    };
    match fields::record_date(metadata) {
        Some(record_date) => record_date == query_date,
        None => false,
    }
}

fn time_matches(metadata: &Metadata, query: &str, tolerance_minutes: i64) -> bool {
    let Some(instant) = fields::normalize_minutes(query) else {
        return false;
    };
    let (start, end) = fields::record_time_window(metadata);

    if let (Some(start), Some(end)) = (start, end) {
        if start <= instant && instant <= end {
            return true;
        }
    }
    let near = |bound: i64| (instant - bound).abs() <= tolerance_minutes;
    match (start, end) {
        (Some(s), Some(e)) => near(s) || near(e),
        (Some(s), None) => near(s),
        (None, Some(e)) => near(e),
        (None, None) => false,
    }
}

fn channel_matches(metadata: &Metadata, query: &str) -> bool {
    if query == fields::CHANNEL_ALL {
        return true;
    }
    let Some(record_channel) = fields::first_present_str(metadata, fields::CHANNEL_FIELDS)
    else {
        return false;
    };
    fields::contains_bidirectional(
        &fields::clean_channel(record_channel),
        &fields::clean_channel(query),
    )
}

fn genre_matches(metadata: &Metadata, query: &str) -> bool {
    let Some(record_genre) = fields::first_present_str(metadata, fields::GENRE_FIELDS) else {
        return false;
    };
    if record_genre.trim().eq_ignore_ascii_case(query.trim()) {
        return true;
    }
    fields::contains_bidirectional(record_genre, query)
}

fn text_fields_match(metadata: &Metadata, field_names: &[&str], query: &str) -> bool {
    field_names.iter().any(|field| {
        matches!(
            metadata.get(*field),
            Some(serde_json::Value::String(s)) if fields::contains_bidirectional(s, query)
        )
    })
}

fn performer_matches(metadata: &Metadata, query: &str) -> bool {
    // Structured talents list first; free-text fields as fallback.
    if fields::talent_names(metadata)
        .iter()
        .any(|name| fields::contains_bidirectional(name, query))
    {
        return true;
    }
    text_fields_match(metadata, fields::PERFORMER_FIELDS, query)
}

fn multi_select_matches(metadata: &Metadata, selected: &[String]) -> bool {
    let record_names: Vec<String> = fields::PROGRAM_NAME_FIELDS
        .iter()
        .filter_map(|field| match metadata.get(*field) {
            Some(serde_json::Value::String(s)) => Some(fields::strip_decorative(s)),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();

    selected.iter().any(|name| {
        let stripped = fields::strip_decorative(name);
        record_names
            .iter()
            .any(|record| fields::contains_bidirectional(record, &stripped))
    })
}

fn period_matches(metadata: &Metadata, period: &Period, today: NaiveDate) -> bool {
    if *period == Period::All {
        return true;
    }
    let Some(record_date) = fields::record_date(metadata).and_then(|d| parse_yyyymmdd(&d))
    else {
        return false;
    };

    match period {
        Period::All => true,
        Period::ThisWeek => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            (monday..=monday + Duration::days(6)).contains(&record_date)
        }
        Period::LastWeek => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64)
                - Duration::days(7);
            (monday..=monday + Duration::days(6)).contains(&record_date)
        }
        Period::PastMonth => {
            (today - Duration::days(30)..=today).contains(&record_date)
        }
        Period::Weekdays(days) => days.contains(&record_date.weekday()),
        Period::Custom { start, end } => {
            if let Some(start) = start.as_deref().and_then(parse_yyyymmdd_str) {
                if record_date < start {
                    return false;
                }
            }
            if let Some(end) = end.as_deref().and_then(parse_yyyymmdd_str) {
                if record_date > end {
                    return false;
                }
            }
            true
        }
    }
}

fn parse_yyyymmdd(digits: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

fn parse_yyyymmdd_str(raw: &str) -> Option<NaiveDate> {
    fields::normalize_date(raw).and_then(|d| parse_yyyymmdd(&d))
}

fn keyword_matches(entry: &IndexEntry, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }

    let mut haystack = String::new();
    match &entry.full_text {
        Some(text) => haystack.push_str(text),
        None => haystack.push_str(&entry.full_text_preview),
    }
    for field in fields::KEYWORD_FIELDS {
        if let Some(serde_json::Value::String(s)) = entry.metadata.get(*field) {
            haystack.push('\n');
            haystack.push_str(s);
        }
    }
    haystack.to_lowercase().contains(&query)
}
