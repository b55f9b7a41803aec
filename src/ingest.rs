//! The upload flow: scan, select versions, chunk, embed, and write to the
//! object store.
//!
//! Errors are handled at three levels. A missing media file or a failed
//! embedding batch is per-record: warn and keep going. A malformed export
//! is per-document: count it and continue with the next file. Anything that
//! prevents the batch from running at all (bad config, missing credentials)
//! propagates out before any work starts.

use std::path::Path;

use anyhow::{Context, Result};

use crate::attach::{self, AttachStats};
use crate::chunker;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::jsonl;
use crate::media;
use crate::models::SourceDocument;
use crate::progress::ProgressReporter;
use crate::scanner;
use crate::store::{hex_sha256, ObjectStore};
use crate::version;

/// Knobs for one upload run.
#[derive(Debug, Default)]
pub struct UploadOptions {
    /// Re-upload even when the stored content hash matches.
    pub force: bool,
    /// Report what would be uploaded without writing anything.
    pub dry_run: bool,
    /// Process at most this many documents.
    pub limit: Option<usize>,
}

/// Counters from one upload run.
#[derive(Debug, Default)]
pub struct UploadSummary {
    pub scanned_files: usize,
    pub selected_files: usize,
    pub uploaded_docs: usize,
    pub unchanged_docs: usize,
    pub failed_docs: usize,
    pub chunks_written: usize,
    pub images_uploaded: usize,
    pub audio_uploaded: usize,
    pub embed: AttachStats,
}

/// PUT the body unless the stored object already has the same content
/// hash. Returns whether a write happened.
async fn put_if_changed(
    store: &dyn ObjectStore,
    key: &str,
    body: Vec<u8>,
    content_type: &str,
    force: bool,
    dry_run: bool,
) -> Result<bool> {
    if !force {
        let body_hash = hex_sha256(&body);
        if let Some(meta) = store.head_object(key).await? {
            if meta.content_sha256.as_deref() == Some(body_hash.as_str()) {
                return Ok(false);
            }
        }
    }
    if dry_run {
        println!("  would upload {} ({} bytes)", key, body.len());
        return Ok(true);
    }
    store.put_object(key, body, content_type).await?;
    Ok(true)
}

pub async fn run_upload(
    config: &Config,
    store: &dyn ObjectStore,
    embedder: Option<&dyn Embedder>,
    options: &UploadOptions,
    progress: &dyn ProgressReporter,
) -> Result<UploadSummary> {
    let mut summary = UploadSummary::default();

    let scanned = scanner::scan_exports(&config.ingest)?;
    summary.scanned_files = scanned.len();
    let mut selected = version::select_preferred(scanned);
    if let Some(limit) = options.limit {
        selected.truncate(limit);
    }
    summary.selected_files = selected.len();

    println!(
        "Found {} export file(s), {} after version selection",
        summary.scanned_files, summary.selected_files
    );

    progress.begin("upload", Some(selected.len()));
    for (done, path) in selected.iter().enumerate() {
        if let Err(err) = process_export(
            config,
            store,
            embedder,
            options,
            path,
            &mut summary,
        )
        .await
        {
            summary.failed_docs += 1;
            eprintln!("Warning: skipping {}: {:#}", path.display(), err);
        }
        progress.advance("upload", done + 1);
    }
    progress.finish("upload", selected.len());

    println!(
        "Upload complete: {} uploaded, {} unchanged, {} failed ({} chunks, {} images, {} audio files)",
        summary.uploaded_docs,
        summary.unchanged_docs,
        summary.failed_docs,
        summary.chunks_written,
        summary.images_uploaded,
        summary.audio_uploaded
    );
    if embedder.is_some() {
        println!(
            "Embedding: {} embedded, {} already present, {} errors",
            summary.embed.embedded, summary.embed.skipped, summary.embed.errors
        );
    }

    Ok(summary)
}

async fn process_export(
    config: &Config,
    store: &dyn ObjectStore,
    embedder: Option<&dyn Embedder>,
    options: &UploadOptions,
    path: &Path,
    summary: &mut UploadSummary,
) -> Result<()> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let doc: SourceDocument = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut chunked = chunker::chunk_document(&doc)?;
    let doc_id = chunked.doc_id.clone();

    // Media first so the master record can carry the uploaded keys.
    if let Some(media_root) = &config.ingest.media_root {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        upload_media(
            config, store, options, media_root, file_name, &doc, &doc_id, summary,
            &mut chunked.master,
        )
        .await;
    }

    if let Some(embedder) = embedder {
        let stats = attach::attach_chunk_embeddings(
            &mut chunked.chunks,
            embedder,
            config.embedding.batch_size,
            options.force,
        )
        .await;
        summary.embed.merge(stats);
        let stats =
            attach::attach_master_embedding(&mut chunked.master, embedder, options.force).await;
        summary.embed.merge(stats);
    }

    let chunk_body = jsonl::to_jsonl(&chunked.chunks)?;
    let master_body = jsonl::to_jsonl(std::slice::from_ref(&chunked.master))?;

    let wrote_chunks = put_if_changed(
        store,
        &config.store.chunk_key(&doc_id),
        chunk_body,
        "application/json",
        options.force,
        options.dry_run,
    )
    .await?;
    let wrote_master = put_if_changed(
        store,
        &config.store.master_key(&doc_id),
        master_body,
        "application/json",
        options.force,
        options.dry_run,
    )
    .await?;

    if wrote_chunks || wrote_master {
        summary.uploaded_docs += 1;
        summary.chunks_written += chunked.chunks.len();
    } else {
        summary.unchanged_docs += 1;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upload_media(
    config: &Config,
    store: &dyn ObjectStore,
    options: &UploadOptions,
    media_root: &Path,
    export_file_name: &str,
    doc: &SourceDocument,
    doc_id: &str,
    summary: &mut UploadSummary,
    master: &mut crate::models::MasterRecord,
) {
    let dirs = match media::derive_channel_date(export_file_name) {
        Some((channel, date)) => media::candidate_media_dirs(media_root, &channel, &date),
        None => Vec::new(),
    };

    let mut image_keys = Vec::new();
    for screenshot in &doc.screenshots {
        let Some(file_name) = screenshot
            .file_name
            .clone()
            .or_else(|| file_name_of(screenshot.file_path.as_deref()))
        else {
            continue;
        };
        let Some(local) =
            media::find_screenshot(screenshot.file_path.as_deref(), &dirs, &file_name)
        else {
            eprintln!(
                "Warning: screenshot {} for {} not found locally",
                file_name, doc_id
            );
            continue;
        };
        match upload_media_file(config, store, options, &local, &file_name, doc_id, true).await {
            Ok(key) => {
                summary.images_uploaded += 1;
                image_keys.push(key);
            }
            Err(err) => eprintln!("Warning: failed to upload {}: {:#}", local.display(), err),
        }
    }

    let mut audio_keys = Vec::new();
    for local in media::audio_files(&dirs) {
        let Some(file_name) = local.file_name().and_then(|n| n.to_str()).map(String::from)
        else {
            continue;
        };
        match upload_media_file(config, store, options, &local, &file_name, doc_id, false).await {
            Ok(key) => {
                summary.audio_uploaded += 1;
                audio_keys.push(key);
            }
            Err(err) => eprintln!("Warning: failed to upload {}: {:#}", local.display(), err),
        }
    }

    if !image_keys.is_empty() {
        master.image_urls = Some(image_keys);
    }
    if !audio_keys.is_empty() {
        master.audio_urls = Some(audio_keys);
    }
}

async fn upload_media_file(
    config: &Config,
    store: &dyn ObjectStore,
    options: &UploadOptions,
    local: &Path,
    file_name: &str,
    doc_id: &str,
    is_image: bool,
) -> Result<String> {
    let body = std::fs::read(local)
        .with_context(|| format!("failed to read {}", local.display()))?;
    let key = if is_image {
        config.store.image_key(doc_id, file_name)
    } else {
        config.store.audio_key(doc_id, file_name)
    };
    put_if_changed(
        store,
        &key,
        body,
        media::content_type_for(file_name),
        options.force,
        options.dry_run,
    )
    .await?;
    Ok(key)
}

fn file_name_of(path: Option<&str>) -> Option<String> {
    path.and_then(|p| {
        Path::new(p)
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
    })
}
