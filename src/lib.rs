//! Batch ingestion and search pipeline for transcribed TV-broadcast
//! archives on S3-compatible object storage.
//!
//! Module map:
//! - [`models`] — source documents, chunks, master records, index entries
//! - [`config`] — TOML configuration and key layout
//! - [`fields`] — probing helpers over the free-form program metadata
//! - [`version`] — version-priority selection over scanned export files
//! - [`scanner`] — local filesystem scan for export files
//! - [`chunker`] — segment-based chunking and master-record assembly
//! - [`media`] — locating screenshot and audio files on disk
//! - [`store`] — object-store trait, S3 SigV4 client, in-memory test store
//! - [`embedding`] — embedding provider trait and HTTP backends
//! - [`attach`] — attaching vectors to chunk and master records
//! - [`jsonl`] — line-delimited JSON encoding and tolerant decoding
//! - [`ingest`] — the upload flow
//! - [`backfill`] — the embed backfill flow
//! - [`index`] — building and loading the flat search index
//! - [`filter`] — the multi-predicate record filter
//! - [`search`] — the search command presenter
//! - [`get`] — single-document detail output
//! - [`status`] — store-wide counts and sizes
//! - [`progress`] — progress reporting on stderr

pub mod attach;
pub mod backfill;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod fields;
pub mod filter;
pub mod get;
pub mod index;
pub mod ingest;
pub mod jsonl;
pub mod media;
pub mod models;
pub mod progress;
pub mod scanner;
pub mod search;
pub mod status;
pub mod store;
pub mod version;
