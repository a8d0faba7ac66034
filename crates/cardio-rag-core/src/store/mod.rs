//! Vector collection abstraction.
//!
//! The [`VectorCollection`] trait owns the lifecycle of the externally
//! persisted collection of chunk entities: existence check and creation with
//! a fixed schema, bulk insertion, deletion by source, load, entity count,
//! and similarity search. The coordinator and retrieval engine only ever see
//! this trait, so they can be exercised against [`memory::InMemoryCollection`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::IndexError;
use crate::models::{EmbeddedChunk, ScoredChunk};

/// Entity fields every collection stores, in schema order.
pub const ENTITY_FIELDS: [&str; 6] = ["id", "text", "embedding", "source", "page_num", "chunk_index"];

/// Fixed schema of a collection: its name and embedding dimensionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSchema {
    pub name: String,
    pub dims: usize,
    pub description: String,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, dims: usize) -> Self {
        Self {
            name: name.into(),
            dims,
            description: "Document chunks with embeddings for retrieval".to_string(),
        }
    }

    /// Check that a vector fits this schema.
    pub fn check_dims(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Check every chunk of a batch before anything is written.
    pub fn check_batch(&self, chunks: &[EmbeddedChunk]) -> Result<(), IndexError> {
        chunks.iter().try_for_each(|c| self.check_dims(&c.embedding))
    }
}

/// Abstract vector collection.
///
/// | Method | Contract |
/// |--------|----------|
/// | [`ensure_collection`](VectorCollection::ensure_collection) | Create if absent; idempotent |
/// | [`insert`](VectorCollection::insert) | All-or-nothing bulk insert |
/// | [`delete_by_source`](VectorCollection::delete_by_source) | Remove every entity tagged with a path |
/// | [`replace_source`](VectorCollection::replace_source) | Atomic delete-then-insert for one path |
/// | [`load`](VectorCollection::load) | Make search-ready; safe to repeat |
/// | [`count`](VectorCollection::count) | Live entity count; `0` when the collection is missing |
/// | [`search`](VectorCollection::search) | Top-`limit` similarity candidates |
/// | [`drop_collection`](VectorCollection::drop_collection) | Remove the collection and all entities |
///
/// Unreachable stores and timeouts surface as
/// [`IndexError::StoreUnavailable`]; they are never retried here.
#[async_trait]
pub trait VectorCollection: Send + Sync {
    fn schema(&self) -> &CollectionSchema;

    /// Create the collection if it does not exist. Returns `true` when it was
    /// created by this call. An existing collection with a different
    /// dimensionality is a [`IndexError::DimensionMismatch`].
    async fn ensure_collection(&self) -> Result<bool, IndexError>;

    /// Insert chunks in one atomic batch and return the inserted count.
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<usize, IndexError>;

    /// Delete every entity whose source is `source`; returns how many went.
    async fn delete_by_source(&self, source: &Path) -> Result<usize, IndexError>;

    /// Delete every entity for `source` and insert `chunks` as one atomic
    /// unit and return the inserted count. On failure the previous entities
    /// for `source` are untouched.
    async fn replace_source(
        &self,
        source: &Path,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, IndexError>;

    async fn load(&self) -> Result<(), IndexError>;

    async fn count(&self) -> Result<u64, IndexError>;

    /// Return up to `limit` candidates. Implementations may return them in
    /// any order; the retrieval engine ranks them.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        source: Option<&Path>,
    ) -> Result<Vec<ScoredChunk>, IndexError>;

    async fn drop_collection(&self) -> Result<(), IndexError>;
}

/// Canonical string form of a source path as stored in the `source` field.
pub fn source_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
