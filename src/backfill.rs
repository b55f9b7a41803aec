//! Backfilling embeddings onto already-stored records.
//!
//! Fetches stored chunk files and master records, attaches missing vectors,
//! and re-uploads only what changed. Skip-existing by default: running the
//! command twice performs zero vectorization calls the second time.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::attach::{self, AttachStats};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::jsonl;
use crate::models::{ChunkRecord, MasterRecord};
use crate::progress::ProgressReporter;
use crate::store::ObjectStore;

/// Knobs for one backfill run.
#[derive(Debug, Default)]
pub struct BackfillOptions {
    /// Restrict to one document.
    pub doc_id: Option<String>,
    /// Recompute vectors that already exist.
    pub force: bool,
    /// Only process chunk files.
    pub chunks_only: bool,
    /// Only process master records.
    pub master_only: bool,
}

/// Counters from one backfill run.
#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub documents: usize,
    pub failed_docs: usize,
    pub chunks: AttachStats,
    pub masters: AttachStats,
}

pub async fn run_backfill(
    config: &Config,
    store: &dyn ObjectStore,
    embedder: &dyn Embedder,
    options: &BackfillOptions,
    progress: &dyn ProgressReporter,
) -> Result<BackfillSummary> {
    let mut summary = BackfillSummary::default();

    let doc_ids = match &options.doc_id {
        Some(doc_id) => vec![doc_id.clone()],
        None => list_doc_ids(config, store, options).await?,
    };
    println!(
        "Backfilling embeddings for {} document(s) with model {}",
        doc_ids.len(),
        embedder.model_name()
    );

    progress.begin("embed", Some(doc_ids.len()));
    for (done, doc_id) in doc_ids.iter().enumerate() {
        summary.documents += 1;
        if let Err(err) = backfill_document(config, store, embedder, options, doc_id, &mut summary)
            .await
        {
            summary.failed_docs += 1;
            eprintln!("Warning: backfill of {} failed: {:#}", doc_id, err);
        }
        progress.advance("embed", done + 1);
    }
    progress.finish("embed", doc_ids.len());

    println!(
        "Chunks: {} embedded, {} already present, {} errors",
        summary.chunks.embedded, summary.chunks.skipped, summary.chunks.errors
    );
    println!(
        "Masters: {} embedded, {} already present, {} errors",
        summary.masters.embedded, summary.masters.skipped, summary.masters.errors
    );
    Ok(summary)
}

/// Every doc_id that has a chunk file or a master record, per the options.
async fn list_doc_ids(
    config: &Config,
    store: &dyn ObjectStore,
    options: &BackfillOptions,
) -> Result<Vec<String>> {
    let mut doc_ids = BTreeSet::new();
    if !options.master_only {
        for info in store.list_objects(&config.store.chunk_prefix).await? {
            if let Some(doc_id) = config.store.doc_id_from_chunk_key(&info.key) {
                doc_ids.insert(doc_id.to_string());
            }
        }
    }
    if !options.chunks_only {
        for info in store.list_objects(&config.store.master_prefix).await? {
            if let Some(doc_id) = config.store.doc_id_from_master_key(&info.key) {
                doc_ids.insert(doc_id.to_string());
            }
        }
    }
    Ok(doc_ids.into_iter().collect())
}

async fn backfill_document(
    config: &Config,
    store: &dyn ObjectStore,
    embedder: &dyn Embedder,
    options: &BackfillOptions,
    doc_id: &str,
    summary: &mut BackfillSummary,
) -> Result<()> {
    if !options.master_only {
        let key = config.store.chunk_key(doc_id);
        if let Some(body) = store.get_object(&key).await? {
            let (mut chunks, errors) = jsonl::parse_jsonl::<ChunkRecord>(&body);
            if errors > 0 {
                eprintln!("Warning: {} unparseable chunk line(s) in {}", errors, key);
            }
            let stats = attach::attach_chunk_embeddings(
                &mut chunks,
                embedder,
                config.embedding.batch_size,
                options.force,
            )
            .await;
            if stats.embedded > 0 {
                store
                    .put_object(&key, jsonl::to_jsonl(&chunks)?, "application/json")
                    .await?;
            }
            summary.chunks.merge(stats);
        }
    }

    if !options.chunks_only {
        let key = config.store.master_key(doc_id);
        if let Some(body) = store.get_object(&key).await? {
            let mut master: MasterRecord = jsonl::parse_single(&body)?;
            let stats = attach::attach_master_embedding(&mut master, embedder, options.force).await;
            if stats.embedded > 0 {
                store
                    .put_object(
                        &key,
                        jsonl::to_jsonl(std::slice::from_ref(&master))?,
                        "application/json",
                    )
                    .await?;
            }
            summary.masters.merge(stats);
        }
    }

    Ok(())
}
