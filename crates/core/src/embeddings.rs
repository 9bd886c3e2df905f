use crate::error::ProviderError;
use crate::provider::ProviderEndpoint;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBED_CONCURRENCY: usize = 4;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Output `i` is the embedding of `texts[i]`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl<T> EmbeddingProvider for Arc<T>
where
    T: EmbeddingProvider + ?Sized,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        (**self).embed_batch(texts).await
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingClient {
    endpoint: ProviderEndpoint,
    model: String,
    max_concurrency: usize,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: ProviderEndpoint, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
            max_concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let payload = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let response: EmbeddingResponse = self
            .endpoint
            .post_json("embeddings", "embeddings", &payload)
            .await?;

        first_embedding(response)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        // Futures are built up front so the stream holds no borrowing closure;
        // `buffered` yields in submission order even when requests finish out of order.
        let pending = texts
            .iter()
            .map(|text| self.embed(text.as_str()))
            .collect::<Vec<_>>();

        stream::iter(pending)
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }
}

fn first_embedding(response: EmbeddingResponse) -> Result<Vec<f32>, ProviderError> {
    let datum = response
        .data
        .into_iter()
        .min_by_key(|datum| datum.index)
        .ok_or_else(|| ProviderError::InvalidResponse {
            provider: "embeddings".to_string(),
            details: "response contained no embedding".to_string(),
        })?;

    if datum.embedding.is_empty() {
        return Err(ProviderError::InvalidResponse {
            provider: "embeddings".to_string(),
            details: "embedding vector was empty".to_string(),
        });
    }

    Ok(datum.embedding)
}

/// Offline embedder over hashed character trigrams.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    /// Counts hashed trigrams of the lowercased text into `dimensions` buckets,
    /// then scales the vector to unit length.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let buckets = self.dimensions.max(1);
        let chars = text.to_lowercase().chars().collect::<Vec<_>>();

        let mut vector = vec![0f32; buckets];
        for trigram in chars.windows(3) {
            vector[trigram_bucket(trigram, buckets)] += 1.0;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn trigram_bucket(trigram: &[char], buckets: usize) -> usize {
    let mut hash = FNV_OFFSET;
    for ch in trigram {
        let mut utf8 = [0u8; 4];
        for byte in ch.encode_utf8(&mut utf8).bytes() {
            hash = (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME);
        }
    }
    (hash % buckets as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_sync(text))
    }
}
