//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus pure helper functions for vector serialization and
//! similarity computation.
//!
//! Concrete providers (OpenAI, Ollama, Gemini, fastembed) live in the
//! `cardio-rag` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// What the embedded text will be used for. Some backends embed documents
/// and queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Document,
    Query,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed_texts(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider
        .embed_texts(&[text.to_string()], EmbedKind::Query)
        .await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Little-endian `f32` bytes, as stored in the `embedding` column.
///
/// ```rust
/// use cardio_rag_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let blob = vec_to_blob(&[0.5, 2.0]);
/// assert_eq!(blob.len(), 8);
/// assert_eq!(blob_to_vec(&blob), vec![0.5, 2.0]);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB back into a float vector. Trailing bytes that do not form
/// a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|b| b.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Degenerate input (length mismatch, empty or zero-norm vectors) scores `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norm = (aa * bb).sqrt();
    if norm < f32::EPSILON {
        0.0
    } else {
        (dot / norm).clamp(-1.0, 1.0)
    }
}
