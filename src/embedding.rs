//! Embedding client: turns text into fixed-length vectors
//!
//! Uses a trait-based backend (`Embedder`) so production code can call an
//! OpenAI-compatible `/embeddings` endpoint (or fastembed-rs behind the
//! `embeddings` feature) while tests use deterministic mock embedders.
//!
//! One contract's graph must be embedded with a single model: the store
//! rejects vectors whose dimensionality differs from the first one it saw.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// The embedding model returned no results
    #[error("embedding returned no results")]
    EmptyResult,
    /// Input exceeds what the model accepts; never truncated silently
    #[error("input of {len} characters exceeds embedding limit of {max}")]
    InputTooLarge { len: usize, max: usize },
    /// Endpoint unreachable or returned a non-success status
    #[error("embedding request failed: {0}")]
    Request(String),
    /// Model loading or inference failed
    #[error("embedding model error: {0}")]
    ModelError(String),
}

/// Trait for embedding text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for zero vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// L2-normalize a vector in place.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAiEmbedder: OpenAI-compatible /embeddings endpoint
// ---------------------------------------------------------------------------

/// Embedding client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_input_chars: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_input_chars: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_input_chars,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(EmbeddingError::InputTooLarge {
                len,
                max: self.max_input_chars,
            });
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "embedding request failed");
                EmbeddingError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %body, "embedding endpoint error");
            return Err(EmbeddingError::Request(format!("{}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::EmptyResult)?;
        if vector.is_empty() {
            return Err(EmbeddingError::EmptyResult);
        }
        debug!(model = %self.model, dimensions = vector.len(), "embedded text");
        Ok(vector)
    }
}

// ---------------------------------------------------------------------------
// FastEmbedEmbedder: local embedder behind `embeddings` feature
// ---------------------------------------------------------------------------

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Vector size of the default local model (all-MiniLM-L6-v2).
    pub const LOCAL_EMBEDDING_DIMENSIONS: usize = 384;

    /// Local embedder backed by fastembed (ONNX Runtime).
    ///
    /// Wraps `fastembed::TextEmbedding` in a `Mutex` because its `embed`
    /// method requires `&mut self`, while the `Embedder` trait uses `&self`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedEmbedder {
        /// Create a new FastEmbedEmbedder with a specific model.
        pub fn new(model: EmbeddingModel) -> Result<Self, EmbeddingError> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
            })
        }

        /// Create a new FastEmbedEmbedder with the default model (all-MiniLM-L6-v2).
        pub fn default_model() -> Result<Self, EmbeddingError> {
            Self::new(EmbeddingModel::AllMiniLML6V2)
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut model = self.model.lock().unwrap();
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            embeddings.into_iter().next().ok_or(EmbeddingError::EmptyResult)
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::{FastEmbedEmbedder, LOCAL_EMBEDDING_DIMENSIONS};
