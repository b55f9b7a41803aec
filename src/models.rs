//! Core data models for the broadcast-archive pipeline.
//!
//! These types represent the source exports, chunks, master records, and
//! index entries that flow through the ingestion and query flows. Program
//! metadata is a free-form JSON bag — the source exports enforce no schema,
//! so everything that reads it goes through the probing helpers in
//! [`crate::fields`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata bag carried by source exports and master records.
pub type Metadata = Map<String, Value>;

/// One integrated JSON export per broadcast event, as found on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDocument {
    pub program_metadata: Metadata,
    pub transcripts: Vec<TranscriptSegment>,
    #[serde(default)]
    pub screenshots: Vec<MediaRef>,
    #[serde(default)]
    pub audio: Vec<MediaRef>,
}

impl SourceDocument {
    /// The stable per-broadcast-event identifier, taken from
    /// `program_metadata.event_id`. `None` when the export is malformed.
    pub fn doc_id(&self) -> Option<String> {
        match self.program_metadata.get("event_id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// One transcript segment inside a source document.
///
/// Segments missing `content` or `file_path` are skipped during chunking
/// but still consume an index slot, so chunk ids stay stable across runs.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<Value>,
    #[serde(default)]
    pub end_time: Option<Value>,
}

/// A screenshot or audio file referenced by a source document.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaRef {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// One transcript segment stored as an independent retrievable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    pub level: String,
    pub metadata: ChunkMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Field name written by earlier pipeline versions. Never written by
    /// this one, but recognized when re-reading stored chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl ChunkRecord {
    /// Whether this chunk already carries a vector under any of the field
    /// names the pipeline has ever used.
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some() || self.vector.is_some()
    }
}

/// Per-chunk metadata: source tag, optional segment time bounds, and the
/// original transcript file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Value>,
    pub original_file_path: String,
}

/// The whole-document record, one per doc_id. Re-upload replaces — at most
/// one master record per doc_id exists in the store at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub doc_id: String,
    pub metadata: Metadata,
    pub full_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text_embedding: Option<Vec<f32>>,
    /// Field name written by earlier pipeline versions (see
    /// [`ChunkRecord::vector`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_urls: Option<Vec<String>>,
}

impl MasterRecord {
    /// Whether this master record already carries a full-text vector under
    /// any of the field names the pipeline has ever used.
    pub fn has_embedding(&self) -> bool {
        self.full_text_embedding.is_some() || self.embedding.is_some()
    }
}

/// Lightweight projection of a master record used by the query flow to
/// avoid fetching every full record on every search.
///
/// Entries loaded from the persisted index carry only the preview; entries
/// built by the fallback full-record scan also carry `full_text`, which the
/// keyword predicate prefers when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub doc_id: String,
    pub metadata: Metadata,
    pub full_text_preview: String,
    pub full_text_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

impl IndexEntry {
    /// Project a master record into an index entry. Lossy: keeps the first
    /// 100 characters of the full text plus its length.
    pub fn from_master(master: &MasterRecord) -> Self {
        Self {
            doc_id: master.doc_id.clone(),
            metadata: master.metadata.clone(),
            full_text_preview: master.full_text.chars().take(100).collect(),
            full_text_length: master.full_text.chars().count(),
            full_text: None,
        }
    }

    /// Convert a master record fetched by the fallback scan, retaining the
    /// full text so keyword search behaves identically to the indexed path.
    pub fn from_master_with_text(master: &MasterRecord) -> Self {
        let mut entry = Self::from_master(master);
        entry.full_text = Some(master.full_text.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn doc_id_from_string_event_id() {
        let doc = SourceDocument {
            program_metadata: meta(&[("event_id", json!("AkxAQAI40AM"))]),
            transcripts: vec![],
            screenshots: vec![],
            audio: vec![],
        };
        assert_eq!(doc.doc_id().as_deref(), Some("AkxAQAI40AM"));
    }

    #[test]
    fn doc_id_missing_or_empty() {
        let doc = SourceDocument {
            program_metadata: meta(&[("event_id", json!(""))]),
            transcripts: vec![],
            screenshots: vec![],
            audio: vec![],
        };
        assert!(doc.doc_id().is_none());
    }

    #[test]
    fn chunk_embedding_check_covers_legacy_field() {
        let mut chunk = ChunkRecord {
            chunk_id: "d-p0000".into(),
            doc_id: "d".into(),
            text: "t".into(),
            level: "segment".into(),
            metadata: ChunkMetadata {
                source: "transcript".into(),
                start_time: None,
                end_time: None,
                original_file_path: "/x".into(),
            },
            embedding: None,
            vector: None,
        };
        assert!(!chunk.has_embedding());
        chunk.vector = Some(vec![0.1]);
        assert!(chunk.has_embedding());
        chunk.vector = None;
        chunk.embedding = Some(vec![0.1]);
        assert!(chunk.has_embedding());
    }

    #[test]
    fn legacy_chunk_round_trips_through_json() {
        let raw = r#"{"chunk_id":"d-p0001","doc_id":"d","text":"x","level":"segment",
            "metadata":{"source":"transcript","original_file_path":"/a"},"vector":[1.0,2.0]}"#;
        let chunk: ChunkRecord = serde_json::from_str(raw).unwrap();
        assert!(chunk.has_embedding());
        let out = serde_json::to_string(&chunk).unwrap();
        assert!(out.contains("\"vector\""));
        assert!(!out.contains("\"embedding\""));
    }

    #[test]
    fn index_entry_preview_is_character_truncated() {
        let master = MasterRecord {
            doc_id: "d".into(),
            metadata: Metadata::new(),
            full_text: "あ".repeat(150),
            full_text_embedding: None,
            embedding: None,
            image_urls: None,
            audio_urls: None,
        };
        let entry = IndexEntry::from_master(&master);
        assert_eq!(entry.full_text_preview.chars().count(), 100);
        assert_eq!(entry.full_text_length, 150);
        assert!(entry.full_text.is_none());
    }
}
