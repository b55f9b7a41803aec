//! The get command: print everything stored for one document.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::jsonl;
use crate::models::{ChunkRecord, MasterRecord};
use crate::store::ObjectStore;

pub async fn run_get(
    config: &Config,
    store: &dyn ObjectStore,
    doc_id: &str,
    json_output: bool,
) -> Result<()> {
    let master_key = config.store.master_key(doc_id);
    let Some(body) = store.get_object(&master_key).await? else {
        bail!("no master record for doc_id {:?}", doc_id);
    };
    let master: MasterRecord = jsonl::parse_single(&body)?;

    let chunks = match store.get_object(&config.store.chunk_key(doc_id)).await? {
        Some(body) => {
            let (chunks, errors) = jsonl::parse_jsonl::<ChunkRecord>(&body);
            if errors > 0 {
                eprintln!("Warning: {} unparseable chunk line(s) skipped", errors);
            }
            chunks
        }
        None => Vec::new(),
    };

    let image_prefix = format!("{}{}/", config.store.image_prefix, doc_id);
    let images = store.list_objects(&image_prefix).await?;
    let audio_prefix = format!("{}{}/", config.store.audio_prefix, doc_id);
    let audio = store.list_objects(&audio_prefix).await?;

    if json_output {
        let payload = serde_json::json!({
            "master": master,
            "chunks": chunks,
            "image_keys": images.iter().map(|o| o.key.clone()).collect::<Vec<_>>(),
            "audio_keys": audio.iter().map(|o| o.key.clone()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("Document {}", master.doc_id);
    println!("  metadata: {}", serde_json::to_string_pretty(&master.metadata)?);
    println!(
        "  full text: {} chars, embedding: {}",
        master.full_text.chars().count(),
        if master.has_embedding() { "yes" } else { "no" }
    );

    println!("  chunks: {}", chunks.len());
    for chunk in &chunks {
        let preview: String = chunk.text.chars().take(60).collect();
        println!(
            "    {}  [{}] {}",
            chunk.chunk_id,
            if chunk.has_embedding() { "vec" } else { "   " },
            preview
        );
    }

    if !images.is_empty() {
        println!("  images:");
        for obj in &images {
            println!("    {} ({} bytes)", obj.key, obj.size);
        }
    }
    if !audio.is_empty() {
        println!("  audio:");
        for obj in &audio {
            println!("    {} ({} bytes)", obj.key, obj.size);
        }
    }

    Ok(())
}
