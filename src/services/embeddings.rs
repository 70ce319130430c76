//! Text-to-vector providers.
//!
//! The search pipeline only sees the [`Embedder`] trait. Every vector compared in
//! one search must come from the same model; mixing models is not detected here.

use std::{sync::Arc, time::Duration};

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
};

/// Dimension of `text-embedding-3-small`, also used by the placeholder embedder
pub const DEFAULT_DIMENSION: usize = 1536;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds `text` into a fixed-length vector
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Name of the model that produced the vectors, stored next to each embedding
    fn model_name(&self) -> String;
}

// ============================================================================
// OpenAI-compatible provider
// ============================================================================

#[derive(Clone)]
pub struct OpenAiEmbedder {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url,
            model,
        })
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let url = format!("{}/embeddings", self.api_url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Embedding API returned status {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::ExternalApi("No embedding data in response".to_string()))?;

        tracing::debug!(
            model = %self.model,
            dimension = embedding.len(),
            "Embedding generated"
        );

        Ok(embedding)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

// ============================================================================
// Development placeholder
// ============================================================================

/// Deterministic, not semantically meaningful vectors for running without an API key
#[derive(Debug, Clone)]
pub struct PlaceholderEmbedder {
    dimension: usize,
}

impl Default for PlaceholderEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl PlaceholderEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for (i, c) in text.chars().enumerate() {
            vector[i % self.dimension] += c as u32 as f32 / 1000.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait::async_trait]
impl Embedder for PlaceholderEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn model_name(&self) -> String {
        "placeholder-dev".to_string()
    }
}

// ============================================================================
// Redis-backed query cache
// ============================================================================

/// Read-through Redis cache in front of another embedder
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache,
    ttl_secs: u64,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: Cache, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }
}

#[async_trait::async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let key = CacheKey::QueryEmbedding {
            model: self.inner.model_name(),
            query: text.to_string(),
        };
        let inner = self.inner.clone();

        cached!(self.cache, key, self.ttl_secs, async move {
            inner.embed(text).await
        })
    }

    fn model_name(&self) -> String {
        self.inner.model_name()
    }
}
