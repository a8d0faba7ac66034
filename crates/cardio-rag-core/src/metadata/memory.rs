//! In-memory [`MetadataStore`] for tests and embedders that do not want a
//! file on disk.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::models::IndexMetadata;

use super::MetadataStore;

#[derive(Default)]
pub struct InMemoryMetadataStore {
    inner: Mutex<Option<IndexMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if it had been persisted earlier.
    pub fn with_metadata(metadata: IndexMetadata) -> Self {
        Self {
            inner: Mutex::new(Some(metadata)),
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn load(&self) -> IndexMetadata {
        match self.inner.lock() {
            Ok(guard) => guard.clone().unwrap_or_default(),
            Err(poisoned) => poisoned.into_inner().clone().unwrap_or_default(),
        }
    }

    async fn save(&self, metadata: &IndexMetadata) -> Result<(), IndexError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| IndexError::CorruptMetadata {
                location: self.location(),
                reason: "lock poisoned".to_string(),
            })?;
        *guard = Some(metadata.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }

    async fn exists(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}
