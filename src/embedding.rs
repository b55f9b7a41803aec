//! Embedding providers.
//!
//! The pipeline treats vectorization as an external collaborator behind the
//! [`Embedder`] trait: hand over a batch of texts, get back one vector per
//! text. Two HTTP backends are provided (OpenAI-compatible and Ollama),
//! plus a deterministic hash-based embedder for offline tests. Transient
//! API failures (429, 5xx, network) retry with exponential backoff; other
//! 4xx errors fail immediately since retrying cannot help.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;

/// Batch text-to-vector contract.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Construct the configured provider. `None` when embedding is disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Box<dyn Embedder>>> {
    match config.provider.as_str() {
        "none" => Ok(None),
        "openai" => Ok(Some(Box::new(OpenAiEmbedder::new(config)?))),
        "ollama" => Ok(Some(Box::new(OllamaEmbedder::new(config)))),
        other => bail!("unknown embedding provider: {:?}", other),
    }
}

async fn backoff_delay(attempt: u32) {
    let delay = Duration::from_secs(1 << attempt.min(5));
    tokio::time::sleep(delay).await;
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is not set (required for the openai provider)")?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .context("failed to build HTTP client")?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string()),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let mut attempt: u32 = 0;
        loop {
            let result = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: OpenAiResponse = response
                            .json()
                            .await
                            .context("failed to parse embedding response")?;
                        let mut vectors = vec![Vec::new(); texts.len()];
                        for item in parsed.data {
                            if item.index >= vectors.len() {
                                bail!(
                                    "embedding response index {} out of range for batch of {}",
                                    item.index,
                                    texts.len()
                                );
                            }
                            vectors[item.index] = item.embedding;
                        }
                        if vectors.iter().any(|v| v.is_empty()) {
                            bail!("embedding response missing vectors for some inputs");
                        }
                        return Ok(vectors);
                    }
                    if is_retryable_status(status) && attempt < self.max_retries {
                        eprintln!(
                            "Warning: embedding API returned {}, retrying (attempt {}/{})",
                            status,
                            attempt + 1,
                            self.max_retries
                        );
                        backoff_delay(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!("embedding API error {}: {}", status, body);
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        eprintln!(
                            "Warning: embedding request failed ({}), retrying (attempt {}/{})",
                            err,
                            attempt + 1,
                            self.max_retries
                        );
                        backoff_delay(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err).context("embedding request failed after retries");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/api/embeddings".to_string()),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        }
    }

    async fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let payload = json!({
            "model": self.model,
            "prompt": text,
        });

        let mut attempt: u32 = 0;
        loop {
            let result = self.client.post(&self.url).json(&payload).send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: OllamaResponse = response
                            .json()
                            .await
                            .context("failed to parse Ollama response")?;
                        return Ok(parsed.embedding);
                    }
                    if is_retryable_status(status) && attempt < self.max_retries {
                        backoff_delay(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body);
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        backoff_delay(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err).context("Ollama request failed after retries");
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // The embeddings endpoint takes one prompt at a time.
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.encode_one(text).await?);
        }
        Ok(vectors)
    }
}

// ---------------------------------------------------------------------------
// Deterministic embedder for tests
// ---------------------------------------------------------------------------

/// Hash-based embedder: same text, same vector, no network. Used by the
/// integration tests and handy for offline pipeline dry-runs.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let digest = Sha256::digest(text.as_bytes());
                (0..self.dims)
                    .map(|i| {
                        let byte = digest[i % digest.len()];
                        (byte as f32 / 255.0) * 2.0 - 1.0
                    })
                    .collect()
            })
            .collect())
    }
}
