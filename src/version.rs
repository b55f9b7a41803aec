//! Version-priority selection over scanned export files.
//!
//! Capture tools emit several quality revisions of the same export, tagged
//! with a `q<float>` token in the filename (`NHK_G_20250801_q0.85_integrated
//! .json`). Files sharing a base name form a group; exactly one member per
//! group is ingested — the one whose version is closest to 1.00.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Extract the `q<float>` version token from a file name, case-insensitive.
/// Files without a token are treated as version 0.0.
pub fn extract_version(file_name: &str) -> f64 {
    let lower = file_name.to_lowercase();
    let bytes = lower.as_bytes();
    let mut i = 0;
    while let Some(offset) = lower[i..].find("_q") {
        let start = i + offset + 2;
        let mut end = start;
        let mut seen_dot = false;
        while end < bytes.len() {
            let c = bytes[end] as char;
            if c.is_ascii_digit() {
                end += 1;
            } else if c == '.' && !seen_dot && end > start {
                seen_dot = true;
                end += 1;
            } else {
                break;
            }
        }
        // A trailing dot belongs to the extension, not the number.
        let mut num_end = end;
        if num_end > start && bytes[num_end - 1] == b'.' {
            num_end -= 1;
        }
        if num_end > start {
            if let Ok(v) = lower[start..num_end].parse::<f64>() {
                return v;
            }
        }
        i = start;
    }
    0.0
}

/// File name with the `_q<float>` token and `.json` extension removed.
/// Files with the same base name are revisions of the same export.
pub fn base_name(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".json").unwrap_or(file_name);
    let lower = stem.to_lowercase();
    let mut i = 0;
    while let Some(offset) = lower[i..].find("_q") {
        let start = i + offset;
        let digits_start = start + 2;
        let mut end = digits_start;
        let mut seen_dot = false;
        let bytes = lower.as_bytes();
        while end < bytes.len() {
            let c = bytes[end] as char;
            if c.is_ascii_digit() {
                end += 1;
            } else if c == '.' && !seen_dot && end > digits_start {
                seen_dot = true;
                end += 1;
            } else {
                break;
            }
        }
        if end > digits_start {
            let mut out = String::with_capacity(stem.len());
            out.push_str(&stem[..start]);
            out.push_str(&stem[end..]);
            return out;
        }
        i = digits_start;
    }
    stem.to_string()
}

/// Group files by base name and keep, per group, the file whose version is
/// closest to 1.00. Equidistant versions tie-break by lexicographic file
/// name so the selection is stable regardless of scan order.
pub fn select_preferred(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut groups: BTreeMap<String, (PathBuf, f64, String)> = BTreeMap::new();

    for path in paths {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let version = extract_version(&file_name);
        let distance = (1.0 - version).abs();
        let key = base_name(&file_name);

        match groups.get(&key) {
            Some((_, best_distance, best_name)) => {
                let better = distance < *best_distance
                    || (distance == *best_distance && file_name < *best_name);
                if better {
                    groups.insert(key, (path, distance, file_name));
                }
            }
            None => {
                groups.insert(key, (path, distance, file_name));
            }
        }
    }

    groups.into_values().map(|(path, _, _)| path).collect()
}
