//! Segment-based chunking of source documents.
//!
//! One chunk per usable transcript segment, never resplit or merged: the
//! segment boundaries chosen at capture time are the retrieval units. The
//! chunk id encodes the segment's *original* position so that re-ingesting
//! the same export always yields the same ids, even when some segments are
//! skipped.

use anyhow::{bail, Result};

use crate::models::{ChunkMetadata, ChunkRecord, MasterRecord, SourceDocument};

/// Chunks and master record produced from one source document.
pub struct ChunkedDocument {
    pub doc_id: String,
    pub chunks: Vec<ChunkRecord>,
    pub master: MasterRecord,
}

/// Chunk a source document and build its master record.
///
/// Fails when the document has no `event_id`, no transcripts at all, or no
/// segment usable as a chunk; callers treat that as a per-document error
/// and continue the batch.
pub fn chunk_document(doc: &SourceDocument) -> Result<ChunkedDocument> {
    let Some(doc_id) = doc.doc_id() else {
        bail!("source document has no program_metadata.event_id");
    };
    if doc.transcripts.is_empty() {
        bail!("source document {} has no transcripts", doc_id);
    }

    let mut chunks = Vec::with_capacity(doc.transcripts.len());
    let mut full_text = String::new();

    for (index, segment) in doc.transcripts.iter().enumerate() {
        // Full text keeps every segment that has content, chunked or not.
        if let Some(content) = segment.content.as_deref() {
            full_text.push_str(content);
        }

        // Only truly absent fields disqualify a segment; empty content is
        // still a chunk (silence in the broadcast is still a time slot).
        let (Some(content), Some(file_path)) =
            (segment.content.as_deref(), segment.file_path.as_deref())
        else {
            continue;
        };

        chunks.push(ChunkRecord {
            chunk_id: format!("{}-p{:04}", doc_id, index),
            doc_id: doc_id.clone(),
            text: content.to_string(),
            level: "segment".to_string(),
            metadata: ChunkMetadata {
                source: "transcript".to_string(),
                start_time: segment.start_time.clone(),
                end_time: segment.end_time.clone(),
                original_file_path: file_path.to_string(),
            },
            embedding: None,
            vector: None,
        });
    }

    if chunks.is_empty() {
        bail!("source document {} has no usable transcript segments", doc_id);
    }

    let master = MasterRecord {
        doc_id: doc_id.clone(),
        metadata: doc.program_metadata.clone(),
        full_text,
        full_text_embedding: None,
        embedding: None,
        image_urls: None,
        audio_urls: None,
    };

    Ok(ChunkedDocument {
        doc_id,
        chunks,
        master,
    })
}
