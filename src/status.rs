//! The status command: per-prefix object counts and sizes, embedding
//! coverage, and index freshness.

use anyhow::Result;

use crate::config::Config;
use crate::jsonl;
use crate::models::ChunkRecord;
use crate::store::{ObjectInfo, ObjectStore};

struct PrefixStats {
    label: &'static str,
    count: usize,
    bytes: u64,
}

fn stats_for(label: &'static str, objects: &[ObjectInfo]) -> PrefixStats {
    PrefixStats {
        label,
        count: objects.len(),
        bytes: objects.iter().map(|o| o.size).sum(),
    }
}

pub async fn run_status(config: &Config, store: &dyn ObjectStore) -> Result<()> {
    let masters = store.list_objects(&config.store.master_prefix).await?;
    let chunks = store.list_objects(&config.store.chunk_prefix).await?;
    let images = store.list_objects(&config.store.image_prefix).await?;
    let audio = store.list_objects(&config.store.audio_prefix).await?;

    // Embedding coverage requires reading the chunk files themselves.
    let mut total_chunks = 0usize;
    let mut embedded_chunks = 0usize;
    for info in &chunks {
        let Some(body) = store.get_object(&info.key).await? else {
            continue;
        };
        let (records, _errors) = jsonl::parse_jsonl::<ChunkRecord>(&body);
        total_chunks += records.len();
        embedded_chunks += records.iter().filter(|c| c.has_embedding()).count();
    }

    let index_meta = store.head_object(&config.store.index_key).await?;

    println!("Archive status — bucket {}", config.store.bucket);
    println!();
    let all = [
        stats_for("master records", &masters),
        stats_for("chunk files", &chunks),
        stats_for("images", &images),
        stats_for("audio", &audio),
    ];
    let total_bytes: u64 = all.iter().map(|s| s.bytes).sum();
    println!("  {:<16} {:>8} {:>12}", "PREFIX", "OBJECTS", "SIZE");
    for stats in &all {
        println!(
            "  {:<16} {:>8} {:>12}",
            stats.label,
            stats.count,
            format_bytes(stats.bytes)
        );
    }
    println!("  {:<16} {:>8} {:>12}", "total", "", format_bytes(total_bytes));
    println!();

    println!(
        "  chunks embedded: {} / {} ({}%)",
        embedded_chunks,
        total_chunks,
        if total_chunks > 0 {
            embedded_chunks * 100 / total_chunks
        } else {
            0
        }
    );
    match index_meta {
        Some(meta) => println!(
            "  search index: present ({}), {} master record(s) stored",
            format_bytes(meta.size),
            masters.len()
        ),
        None => println!("  search index: missing (run `tclip index`)"),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
