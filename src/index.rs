//! Building and loading the flat search index.
//!
//! The index is a full-rebuild projection of every master record into
//! lightweight entries, written as one JSONL object. Loading falls back to
//! scanning the master prefix when the index object is missing, so search
//! works (slowly) on a bucket that has never been indexed.

use anyhow::Result;

use crate::config::Config;
use crate::jsonl;
use crate::models::{IndexEntry, MasterRecord};
use crate::progress::ProgressReporter;
use crate::store::ObjectStore;

/// Counters from one index build.
#[derive(Debug, Default)]
pub struct IndexSummary {
    pub masters_listed: usize,
    pub entries_written: usize,
    pub parse_errors: usize,
}

/// Rebuild the index from every stored master record.
pub async fn build_index(
    config: &Config,
    store: &dyn ObjectStore,
    progress: &dyn ProgressReporter,
) -> Result<IndexSummary> {
    let mut summary = IndexSummary::default();

    let listed = store.list_objects(&config.store.master_prefix).await?;
    summary.masters_listed = listed.len();
    println!("Indexing {} master record(s)", listed.len());

    let mut entries = Vec::with_capacity(listed.len());
    progress.begin("index", Some(listed.len()));
    for (done, info) in listed.iter().enumerate() {
        match fetch_master(store, &info.key).await {
            Ok(master) => entries.push(IndexEntry::from_master(&master)),
            Err(err) => {
                summary.parse_errors += 1;
                eprintln!("Warning: skipping {}: {:#}", info.key, err);
            }
        }
        progress.advance("index", done + 1);
    }
    progress.finish("index", listed.len());

    let body = jsonl::to_jsonl(&entries)?;
    store
        .put_object(&config.store.index_key, body, "application/json")
        .await?;
    summary.entries_written = entries.len();

    println!(
        "Index written to {} ({} entries, {} parse errors)",
        config.store.index_key, summary.entries_written, summary.parse_errors
    );
    Ok(summary)
}

async fn fetch_master(store: &dyn ObjectStore, key: &str) -> Result<MasterRecord> {
    let body = store
        .get_object(key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("object disappeared during listing"))?;
    jsonl::parse_single(&body)
}

/// Load index entries for the query flow. When the index object is absent,
/// every master record is fetched instead (entries then carry the full
/// text, so keyword search matches deeply).
pub async fn load_entries(
    config: &Config,
    store: &dyn ObjectStore,
    progress: &dyn ProgressReporter,
) -> Result<Vec<IndexEntry>> {
    if let Some(body) = store.get_object(&config.store.index_key).await? {
        let (entries, errors) = jsonl::parse_jsonl::<IndexEntry>(&body);
        if errors > 0 {
            eprintln!("Warning: {} unparseable index line(s) skipped", errors);
        }
        return Ok(entries);
    }

    eprintln!(
        "Warning: index object {} not found, scanning master records instead (run `tclip index` to build it)",
        config.store.index_key
    );
    let listed = store.list_objects(&config.store.master_prefix).await?;
    let mut entries = Vec::with_capacity(listed.len());
    progress.begin("scan masters", Some(listed.len()));
    for (done, info) in listed.iter().enumerate() {
        match fetch_master(store, &info.key).await {
            Ok(master) => entries.push(IndexEntry::from_master_with_text(&master)),
            Err(err) => eprintln!("Warning: skipping {}: {:#}", info.key, err),
        }
        progress.advance("scan masters", done + 1);
    }
    progress.finish("scan masters", listed.len());
    Ok(entries)
}
