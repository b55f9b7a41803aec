//! TOML configuration loading and validation.
//!
//! A single config file drives every subcommand. Missing optional sections
//! fall back to defaults; `load_config` validates the parts that would
//! otherwise fail deep inside a batch run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Object store connection and key layout.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Override for S3-compatible stores (MinIO etc). When unset, the
    /// canonical AWS endpoint for the region is used.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_master_prefix")]
    pub master_prefix: String,
    #[serde(default = "default_chunk_prefix")]
    pub chunk_prefix: String,
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,
    #[serde(default = "default_audio_prefix")]
    pub audio_prefix: String,
    #[serde(default = "default_index_key")]
    pub index_key: String,
    /// Retries for transient store errors (throttling, 5xx, network).
    #[serde(default = "default_store_retries")]
    pub max_retries: u32,
}

impl StoreConfig {
    pub fn master_key(&self, doc_id: &str) -> String {
        format!("{}{}.jsonl", self.master_prefix, doc_id)
    }

    pub fn chunk_key(&self, doc_id: &str) -> String {
        format!("{}{}_segments.jsonl", self.chunk_prefix, doc_id)
    }

    pub fn image_key(&self, doc_id: &str, file_name: &str) -> String {
        format!("{}{}/{}", self.image_prefix, doc_id, file_name)
    }

    pub fn audio_key(&self, doc_id: &str, file_name: &str) -> String {
        format!("{}{}/{}", self.audio_prefix, doc_id, file_name)
    }

    /// doc_id back out of a master key (`rag/master_text/{doc_id}.jsonl`).
    pub fn doc_id_from_master_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.master_prefix.as_str())?
            .strip_suffix(".jsonl")
    }

    /// doc_id back out of a chunk key
    /// (`rag/vector_chunks/{doc_id}_segments.jsonl`).
    pub fn doc_id_from_chunk_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.chunk_prefix.as_str())?
            .strip_suffix("_segments.jsonl")
    }
}

/// Local filesystem scan settings for the upload command.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Root directory scanned for integrated JSON exports.
    #[serde(default = "default_ingest_root")]
    pub root: PathBuf,
    /// Root directory holding per-channel screenshot and audio trees.
    #[serde(default)]
    pub media_root: Option<PathBuf>,
    /// Glob patterns selecting export files under `root`.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_ingest_root(),
            media_root: None,
            include: default_include(),
            exclude: Vec::new(),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// "openai", "ollama", or "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Query-flow tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Inclusive slack around a record's time window, in minutes.
    #[serde(default = "default_time_tolerance")]
    pub time_tolerance_minutes: i64,
    /// Hard cap on returned records; truncation is reported, never silent.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            time_tolerance_minutes: default_time_tolerance(),
            max_results: default_max_results(),
        }
    }
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

fn default_master_prefix() -> String {
    "rag/master_text/".to_string()
}

fn default_chunk_prefix() -> String {
    "rag/vector_chunks/".to_string()
}

fn default_image_prefix() -> String {
    "rag/images/".to_string()
}

fn default_audio_prefix() -> String {
    "rag/audio/".to_string()
}

fn default_index_key() -> String {
    "rag/search_index/master_index.jsonl".to_string()
}

fn default_store_retries() -> u32 {
    3
}

fn default_ingest_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_include() -> Vec<String> {
    vec!["**/*integrated*.json".to_string()]
}

fn default_provider() -> String {
    "none".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dims() -> usize {
    1536
}

fn default_batch_size() -> usize {
    32
}

fn default_embed_retries() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_time_tolerance() -> i64 {
    30
}

fn default_max_results() -> usize {
    500
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    if config.store.bucket.is_empty() {
        bail!("config: store.bucket must not be empty");
    }
    for (name, prefix) in [
        ("master_prefix", &config.store.master_prefix),
        ("chunk_prefix", &config.store.chunk_prefix),
        ("image_prefix", &config.store.image_prefix),
        ("audio_prefix", &config.store.audio_prefix),
    ] {
        if !prefix.ends_with('/') {
            bail!("config: store.{} must end with '/' (got {:?})", name, prefix);
        }
    }
    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "none" => {}
        other => bail!(
            "config: unknown embedding.provider {:?} (expected openai, ollama, or none)",
            other
        ),
    }
    if config.embedding.provider != "none" && config.embedding.dims == 0 {
        bail!("config: embedding.dims must be > 0");
    }
    if config.search.time_tolerance_minutes < 0 {
        bail!("config: search.time_tolerance_minutes must be >= 0");
    }
    if config.search.max_results == 0 {
        bail!("config: search.max_results must be > 0");
    }

    Ok(config)
}
