//! Local filesystem scan for integrated JSON exports.
//!
//! Walks the ingest root and collects files matching the configured glob
//! patterns, relative to the root. Unreadable directory entries are warned
//! about and skipped rather than aborting the scan.

use std::path::PathBuf;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::IngestConfig;

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("invalid glob pattern: {:?}", pattern))?;
        builder.add(glob);
    }
    builder.build().context("failed to build glob set")
}

/// Collect export files under the ingest root, sorted by path so that runs
/// are deterministic.
pub fn scan_exports(ingest: &IngestConfig) -> Result<Vec<PathBuf>> {
    let include = build_glob_set(&ingest.include)?;
    let exclude = build_glob_set(&ingest.exclude)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(&ingest.root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                eprintln!("Warning: skipping unreadable entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&ingest.root)
            .unwrap_or(entry.path());
        if include.is_match(relative) && !exclude.is_match(relative) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}
