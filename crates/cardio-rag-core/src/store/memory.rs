//! In-memory [`VectorCollection`] implementation for tests and embedding.
//!
//! State lives behind a `std::sync::RwLock`. Search is brute-force cosine
//! similarity over every stored vector. Dropping the collection discards all
//! entities, which is how tests simulate the external store being wiped.

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::models::{EmbeddedChunk, ScoredChunk};
use crate::retrieve::rank;

use super::{source_key, CollectionSchema, VectorCollection};

struct StoredEntity {
    id: u64,
    source: String,
    page_num: u32,
    chunk_index: u32,
    text: String,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct CollectionState {
    entities: Vec<StoredEntity>,
    next_id: u64,
    loaded: bool,
}

impl CollectionState {
    fn push_all(&mut self, chunks: &[EmbeddedChunk]) -> usize {
        for c in chunks {
            self.next_id += 1;
            self.entities.push(StoredEntity {
                id: self.next_id,
                source: source_key(&c.chunk.source),
                page_num: c.chunk.page_num,
                chunk_index: c.chunk.chunk_index,
                text: c.chunk.text.clone(),
                embedding: c.embedding.clone(),
            });
        }
        chunks.len()
    }

    fn remove_source(&mut self, key: &str) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| e.source != key);
        before - self.entities.len()
    }
}

/// In-memory vector collection. `None` state means the collection does not
/// exist (never created, or dropped).
pub struct InMemoryCollection {
    schema: CollectionSchema,
    state: RwLock<Option<CollectionState>>,
}

impl InMemoryCollection {
    pub fn new(schema: CollectionSchema) -> Self {
        Self {
            schema,
            state: RwLock::new(None),
        }
    }

    /// Whether the collection currently exists.
    pub fn exists(&self) -> bool {
        self.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Sources currently present, sorted and deduplicated.
    pub fn sources(&self) -> Vec<String> {
        let mut out: Vec<String> = match self.read() {
            Ok(guard) => match &*guard {
                Some(state) => state.entities.iter().map(|e| e.source.clone()).collect(),
                None => Vec::new(),
            },
            Err(_) => Vec::new(),
        };
        out.sort();
        out.dedup();
        out
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<CollectionState>>, IndexError> {
        self.state
            .read()
            .map_err(|_| IndexError::StoreUnavailable("in-memory collection lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<CollectionState>>, IndexError> {
        self.state
            .write()
            .map_err(|_| IndexError::StoreUnavailable("in-memory collection lock poisoned".into()))
    }

    fn missing(&self) -> IndexError {
        IndexError::Store(format!("collection '{}' does not exist", self.schema.name))
    }
}

#[async_trait]
impl VectorCollection for InMemoryCollection {
    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn ensure_collection(&self) -> Result<bool, IndexError> {
        let mut state = self.write()?;
        if state.is_some() {
            return Ok(false);
        }
        *state = Some(CollectionState::default());
        Ok(true)
    }

    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<usize, IndexError> {
        self.schema.check_batch(chunks)?;
        let mut guard = self.write()?;
        let state = (*guard).as_mut().ok_or_else(|| self.missing())?;
        Ok(state.push_all(chunks))
    }

    async fn delete_by_source(&self, source: &Path) -> Result<usize, IndexError> {
        let mut guard = self.write()?;
        Ok((*guard)
            .as_mut()
            .map(|state| state.remove_source(&source_key(source)))
            .unwrap_or(0))
    }

    async fn replace_source(
        &self,
        source: &Path,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, IndexError> {
        self.schema.check_batch(chunks)?;
        let mut guard = self.write()?;
        let state = (*guard).as_mut().ok_or_else(|| self.missing())?;
        state.remove_source(&source_key(source));
        Ok(state.push_all(chunks))
    }

    async fn load(&self) -> Result<(), IndexError> {
        let mut guard = self.write()?;
        let state = (*guard).as_mut().ok_or_else(|| self.missing())?;
        state.loaded = true;
        Ok(())
    }

    async fn count(&self) -> Result<u64, IndexError> {
        let guard = self.read()?;
        Ok((*guard).as_ref().map(|s| s.entities.len() as u64).unwrap_or(0))
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        source: Option<&Path>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.schema.check_dims(query)?;
        let guard = self.read()?;
        let state = match &*guard {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        if !state.loaded {
            return Err(IndexError::Store(format!(
                "collection '{}' is not loaded",
                self.schema.name
            )));
        }
        let filter = source.map(source_key);
        let candidates = state
            .entities
            .iter()
            .filter(|e| filter.as_deref().map_or(true, |f| e.source == f))
            .map(|e| ScoredChunk {
                id: e.id,
                text: e.text.clone(),
                source: e.source.clone(),
                page_num: e.page_num,
                chunk_index: e.chunk_index,
                score: cosine_similarity(query, &e.embedding),
            })
            .collect();
        Ok(rank(candidates, limit))
    }

    async fn drop_collection(&self) -> Result<(), IndexError> {
        *self.write()? = None;
        Ok(())
    }
}
