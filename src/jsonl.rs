//! JSONL encoding and decoding for stored records.
//!
//! Every pipeline artifact is line-delimited JSON. Decoding is tolerant:
//! unparseable lines are counted and skipped so one corrupt record never
//! takes down a whole listing.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize items as one JSON object per line.
pub fn to_jsonl<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for item in items {
        let line = serde_json::to_vec(item).context("failed to serialize record")?;
        out.extend_from_slice(&line);
        out.push(b'\n');
    }
    Ok(out)
}

/// Parse JSONL bytes, returning the decoded items and the number of lines
/// that failed to parse.
pub fn parse_jsonl<T: DeserializeOwned>(bytes: &[u8]) -> (Vec<T>, usize) {
    let text = String::from_utf8_lossy(bytes);
    let mut items = Vec::new();
    let mut errors = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(item) => items.push(item),
            Err(_) => errors += 1,
        }
    }
    (items, errors)
}

/// Parse a single-record JSONL object (master records are stored as one
/// line). Fails when no line parses.
pub fn parse_single<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (mut items, _errors) = parse_jsonl::<T>(bytes);
    if items.is_empty() {
        anyhow::bail!("no parseable record in object body");
    }
    Ok(items.remove(0))
}
