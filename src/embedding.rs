//! Embedding generation.
//!
//! Defines the [`Embedder`] trait and the [`HttpEmbedder`] implementation
//! that calls an OpenAI-compatible embeddings endpoint. The backing API
//! enforces a requests-per-minute ceiling, so the client owns the policy
//! that keeps call rate bounded:
//!
//! - texts are processed in fixed-size groups; within a group, requests are
//!   issued sequentially, and a fixed delay separates groups;
//! - a rate-limit rejection (HTTP 429) is retried with exponential backoff
//!   (base delay doubling per attempt) up to `max_retries` times, after
//!   which [`PipelineError::QuotaExhausted`] is raised so callers can
//!   present "try again later" instead of a hard error;
//! - every other failure (auth, malformed request, 5xx, network) fails
//!   immediately with the truncated upstream error body.
//!
//! Also provides the vector utilities shared by storage and retrieval:
//! [`vec_to_blob`] / [`blob_to_vec`] for the SQLite BLOB encoding and
//! [`cosine_similarity`] for ranking.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{PipelineError, Result};

/// Upstream error bodies are truncated to this many chars in messages.
const ERROR_BODY_EXCERPT: usize = 200;

/// Interface to an embedding backend.
///
/// Implementations return one fixed-dimension vector per input text, in
/// input order. The trait seam lets the processor and retriever run against
/// a stub in tests.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, order-preserving.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimensionality.
    fn dims(&self) -> usize;

    /// Model identifier sent to the API.
    fn model_name(&self) -> &str;
}

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Constructed once per process with explicit configuration and passed by
/// reference to the processor and retriever. Holds no state between calls
/// besides the configuration and the shared HTTP client.
#[derive(Debug)]
pub struct HttpEmbedder {
    config: EmbeddingConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PipelineError::InvalidInput(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    /// One API call for one text, with rate-limit retry.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
            "dimensions": self.config.dims,
        });

        for attempt in 0..=self.config.max_retries {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
                .map_err(|e| PipelineError::Embedding(e.to_string()))?;

            let status = response.status();

            if status.is_success() {
                let parsed: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| PipelineError::Embedding(format!("invalid response: {e}")))?;
                let vector = parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or_else(|| {
                        PipelineError::Embedding("empty embedding response".to_string())
                    })?;
                if vector.len() != self.config.dims {
                    return Err(PipelineError::Embedding(format!(
                        "dimension mismatch for model '{}': expected {}, got {}",
                        self.config.model,
                        self.config.dims,
                        vector.len()
                    )));
                }
                return Ok(vector);
            }

            if status.as_u16() == 429 {
                if attempt == self.config.max_retries {
                    return Err(PipelineError::QuotaExhausted(format!(
                        "still rate limited after {} retries",
                        self.config.max_retries
                    )));
                }
                let delay = Duration::from_millis(self.config.retry_base_ms << attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "embedding API rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            // Auth, malformed request, 5xx: no retry.
            let body_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Embedding(format!(
                "embedding API error {}: {}",
                status,
                excerpt(&body_text)
            )));
        }

        unreachable!("retry loop returns on every path")
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        let groups: Vec<&[String]> = texts.chunks(self.config.batch_size).collect();
        let group_count = groups.len();

        for (i, group) in groups.into_iter().enumerate() {
            for text in group {
                vectors.push(self.embed_one(text).await?);
            }
            debug!(
                group = i + 1,
                groups = group_count,
                embedded = vectors.len(),
                "embedded group"
            );
            if i + 1 < group_count {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        Ok(vectors)
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn excerpt(body: &str) -> &str {
    let mut end = body.len().min(ERROR_BODY_EXCERPT);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
