//! Chunk/embed pipeline: extracted pages in, embedded chunks out.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::chunk::{chunk_pages, ChunkingParams};
use crate::embedding::{EmbedKind, EmbeddingProvider};
use crate::error::IndexError;
use crate::models::{EmbeddedChunk, PageText};

#[async_trait]
pub trait ChunkEmbedPipeline: Send + Sync {
    /// Split the document into chunks and embed each one.
    async fn chunk_and_embed(
        &self,
        source: &Path,
        pages: &[PageText],
    ) -> Result<Vec<EmbeddedChunk>, IndexError>;
}

/// The standard pipeline: [`chunk_pages`] followed by batched calls to an
/// [`EmbeddingProvider`].
pub struct EmbeddingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    params: ChunkingParams,
    batch_size: usize,
}

impl EmbeddingPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, params: ChunkingParams, batch_size: usize) -> Self {
        Self {
            provider,
            params,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }
}

#[async_trait]
impl ChunkEmbedPipeline for EmbeddingPipeline {
    async fn chunk_and_embed(
        &self,
        source: &Path,
        pages: &[PageText],
    ) -> Result<Vec<EmbeddedChunk>, IndexError> {
        let chunks = chunk_pages(source, pages, &self.params);
        debug!(source = %source.display(), chunks = chunks.len(), "chunked document");

        let dims = self.provider.dims();
        let mut embedded = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .provider
                .embed_texts(&texts, EmbedKind::Document)
                .await
                .map_err(|e| IndexError::indexing_failed(source, format!("embedding failed: {e:#}")))?;

            if vectors.len() != batch.len() {
                return Err(IndexError::indexing_failed(
                    source,
                    format!(
                        "embedding provider returned {} vectors for {} chunks",
                        vectors.len(),
                        batch.len()
                    ),
                ));
            }

            for (chunk, embedding) in batch.iter().zip(vectors) {
                if embedding.len() != dims {
                    return Err(IndexError::DimensionMismatch {
                        expected: dims,
                        actual: embedding.len(),
                    });
                }
                embedded.push(EmbeddedChunk {
                    chunk: chunk.clone(),
                    embedding,
                });
            }
        }

        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        dims: usize,
        emit_dims: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_texts(&self, texts: &[String], _kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.emit_dims]).collect())
        }
    }

    fn pages() -> Vec<PageText> {
        vec![PageText {
            page_num: 1,
            text: "Hypertension is a major risk factor for stroke and heart failure. ".repeat(30),
        }]
    }

    #[tokio::test]
    async fn batches_calls_and_keeps_order() {
        let provider = Arc::new(CountingProvider {
            dims: 3,
            emit_dims: 3,
            calls: AtomicUsize::new(0),
        });
        let params = ChunkingParams {
            chunk_size: 200,
            overlap: 40,
            min_chunk_chars: 50,
        };
        let pipeline = EmbeddingPipeline::new(provider.clone(), params, 2);
        let out = pipeline
            .chunk_and_embed(Path::new("/a.pdf"), &pages())
            .await
            .unwrap();
        assert!(out.len() > 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), out.len().div_ceil(2));
        for (i, c) in out.iter().enumerate() {
            assert_eq!(c.chunk.chunk_index, i as u32);
            assert_eq!(c.embedding.len(), 3);
        }
    }

    #[tokio::test]
    async fn wrong_vector_length_is_dimension_mismatch() {
        let provider = Arc::new(CountingProvider {
            dims: 4,
            emit_dims: 2,
            calls: AtomicUsize::new(0),
        });
        let pipeline = EmbeddingPipeline::new(provider, ChunkingParams::default(), 8);
        let err = pipeline
            .chunk_and_embed(Path::new("/a.pdf"), &pages())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 4, actual: 2 }));
    }
}
