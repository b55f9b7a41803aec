//! Attaching vectors to chunk and master records.
//!
//! Shared by the upload flow (inline embedding) and the `embed` backfill
//! command. Records that already carry a vector under any historical field
//! name are skipped, so a second run over the same data performs zero
//! vectorization calls. A failed batch leaves its records unmodified and
//! increments the error counter; the rest of the batch continues.

use crate::embedding::Embedder;
use crate::models::{ChunkRecord, MasterRecord};

/// Counters from one attach pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttachStats {
    pub embedded: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl AttachStats {
    pub fn merge(&mut self, other: AttachStats) {
        self.embedded += other.embedded;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Embed every chunk that does not already have a vector, batching calls
/// to the provider. With `force`, existing vectors are recomputed (legacy
/// `vector` fields are replaced by `embedding`).
pub async fn attach_chunk_embeddings(
    chunks: &mut [ChunkRecord],
    embedder: &dyn Embedder,
    batch_size: usize,
    force: bool,
) -> AttachStats {
    let mut stats = AttachStats::default();
    let batch_size = batch_size.max(1);

    let needy: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| force || !chunk.has_embedding())
        .map(|(i, _)| i)
        .collect();
    stats.skipped = chunks.len() - needy.len();

    for batch in needy.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
        match embedder.encode(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (&i, vector) in batch.iter().zip(vectors) {
                    chunks[i].embedding = Some(vector);
                    chunks[i].vector = None;
                    stats.embedded += 1;
                }
            }
            Ok(vectors) => {
                eprintln!(
                    "Warning: embedding batch returned {} vectors for {} texts, keeping records unmodified",
                    vectors.len(),
                    batch.len()
                );
                stats.errors += batch.len();
            }
            Err(err) => {
                eprintln!("Warning: embedding batch failed: {:#}", err);
                stats.errors += batch.len();
            }
        }
    }

    stats
}

/// Embed the master record's full text unless it already has a vector.
pub async fn attach_master_embedding(
    master: &mut MasterRecord,
    embedder: &dyn Embedder,
    force: bool,
) -> AttachStats {
    let mut stats = AttachStats::default();

    if !force && master.has_embedding() {
        stats.skipped = 1;
        return stats;
    }
    if master.full_text.is_empty() {
        stats.skipped = 1;
        return stats;
    }

    match embedder.encode(std::slice::from_ref(&master.full_text)).await {
        Ok(mut vectors) if vectors.len() == 1 => {
            master.full_text_embedding = vectors.pop();
            master.embedding = None;
            stats.embedded = 1;
        }
        Ok(_) | Err(_) => {
            eprintln!(
                "Warning: failed to embed full text of {}, keeping record unmodified",
                master.doc_id
            );
            stats.errors = 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, Metadata};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder that counts calls and optionally fails on request.
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        fn dims(&self) -> usize {
            3
        }

        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("provider unavailable");
            }
            Ok(texts.iter().map(|_| vec![1.0, 2.0, 3.0]).collect())
        }
    }

    fn chunk(id: &str, vector: Option<Vec<f32>>) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id.to_string(),
            doc_id: "d".into(),
            text: format!("text of {}", id),
            level: "segment".into(),
            metadata: ChunkMetadata {
                source: "transcript".into(),
                start_time: None,
                end_time: None,
                original_file_path: "/a".into(),
            },
            embedding: None,
            vector,
        }
    }

    #[tokio::test]
    async fn second_run_makes_zero_calls() {
        let embedder = CountingEmbedder::new(false);
        let mut chunks = vec![chunk("a", None), chunk("b", None)];

        let first = attach_chunk_embeddings(&mut chunks, &embedder, 10, false).await;
        assert_eq!(first.embedded, 2);
        assert_eq!(embedder.calls(), 1);

        let second = attach_chunk_embeddings(&mut chunks, &embedder, 10, false).await;
        assert_eq!(second.embedded, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(embedder.calls(), 1, "no calls on the second run");
    }

    #[tokio::test]
    async fn legacy_vector_field_counts_as_embedded() {
        let embedder = CountingEmbedder::new(false);
        let mut chunks = vec![chunk("a", Some(vec![0.5]))];
        let stats = attach_chunk_embeddings(&mut chunks, &embedder, 10, false).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(embedder.calls(), 0);
        // The legacy field survives untouched.
        assert_eq!(chunks[0].vector, Some(vec![0.5]));
    }

    #[tokio::test]
    async fn force_recomputes_and_migrates_legacy_field() {
        let embedder = CountingEmbedder::new(false);
        let mut chunks = vec![chunk("a", Some(vec![0.5]))];
        let stats = attach_chunk_embeddings(&mut chunks, &embedder, 10, true).await;
        assert_eq!(stats.embedded, 1);
        assert!(chunks[0].vector.is_none());
        assert_eq!(chunks[0].embedding, Some(vec![1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn failed_batch_leaves_records_unmodified() {
        let embedder = CountingEmbedder::new(true);
        let mut chunks = vec![chunk("a", None), chunk("b", None)];
        let stats = attach_chunk_embeddings(&mut chunks, &embedder, 10, false).await;
        assert_eq!(stats.errors, 2);
        assert!(chunks.iter().all(|c| !c.has_embedding()));
    }

    #[tokio::test]
    async fn batching_respects_batch_size() {
        let embedder = CountingEmbedder::new(false);
        let mut chunks: Vec<ChunkRecord> =
            (0..5).map(|i| chunk(&format!("c{}", i), None)).collect();
        attach_chunk_embeddings(&mut chunks, &embedder, 2, false).await;
        assert_eq!(embedder.calls(), 3); // 2 + 2 + 1
    }

    #[tokio::test]
    async fn master_skip_and_force() {
        let embedder = CountingEmbedder::new(false);
        let mut master = MasterRecord {
            doc_id: "d".into(),
            metadata: Metadata::new(),
            full_text: "全文".into(),
            full_text_embedding: None,
            embedding: Some(vec![0.1]), // legacy field
            image_urls: None,
            audio_urls: None,
        };

        let stats = attach_master_embedding(&mut master, &embedder, false).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(embedder.calls(), 0);

        let stats = attach_master_embedding(&mut master, &embedder, true).await;
        assert_eq!(stats.embedded, 1);
        assert!(master.embedding.is_none());
        assert!(master.full_text_embedding.is_some());
    }
}
