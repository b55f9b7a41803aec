//! The search command: load index entries, filter, and print results.

use anyhow::Result;
use chrono::Local;

use crate::config::Config;
use crate::fields;
use crate::filter::{self, FilterOutcome, SearchCriteria};
use crate::index;
use crate::models::IndexEntry;
use crate::progress::ProgressReporter;
use crate::store::ObjectStore;

pub async fn run_search(
    config: &Config,
    store: &dyn ObjectStore,
    criteria: &SearchCriteria,
    json_output: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let entries = index::load_entries(config, store, progress).await?;

    let today = Local::now().date_naive();
    let outcome = filter::filter_records(
        &entries,
        criteria,
        config.search.time_tolerance_minutes,
        config.search.max_results,
        today,
    );

    if json_output {
        print_json(&outcome)?;
    } else {
        print_human(&outcome, entries.len(), config.search.max_results);
    }
    Ok(())
}

fn print_json(outcome: &FilterOutcome) -> Result<()> {
    let payload = serde_json::json!({
        "count": outcome.records.len(),
        "truncated": outcome.truncated,
        "records": outcome.records,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn print_human(outcome: &FilterOutcome, total: usize, max_results: usize) {
    if outcome.records.is_empty() {
        println!("No matching records (searched {} entries)", total);
        return;
    }

    println!(
        "{} match(es) out of {} entries\n",
        outcome.records.len(),
        total
    );
    for entry in &outcome.records {
        print_entry(entry);
    }
    if outcome.truncated {
        println!(
            "Note: result cap of {} reached, remaining records were not examined. Narrow the search to see the rest.",
            max_results
        );
    }
}

fn print_entry(entry: &IndexEntry) {
    let m = &entry.metadata;
    let date = fields::first_present_str(m, fields::DATE_FIELDS)
        .map(fields::format_date_display)
        .unwrap_or_else(|| "--".to_string());
    let start = fields::first_present_str(m, fields::START_TIME_FIELDS)
        .map(fields::format_time_display)
        .unwrap_or_else(|| "--:--".to_string());
    let end = fields::first_present_str(m, fields::END_TIME_FIELDS)
        .map(fields::format_time_display)
        .unwrap_or_else(|| "--:--".to_string());
    let channel = fields::first_present_str(m, fields::CHANNEL_FIELDS)
        .map(|c| fields::clean_channel(c))
        .unwrap_or_else(|| "?".to_string());
    let program = fields::first_present_str(m, fields::PROGRAM_NAME_FIELDS).unwrap_or("(untitled)");

    println!("{}  {} {}-{}  [{}]", entry.doc_id, date, start, end, channel);
    println!("  {}", program);
    if !entry.full_text_preview.is_empty() {
        println!("  {}", entry.full_text_preview);
    }
    println!("  ({} chars of transcript)\n", entry.full_text_length);
}
