//! Durable record of which source files are indexed.
//!
//! [`MetadataStore`] implementations only provide [`load`](MetadataStore::load)
//! and [`save`](MetadataStore::save); the per-entry operations are built on
//! top of those two so every mutation persists the full document.
//!
//! Loading never fails. A missing store means nothing is indexed yet; a
//! corrupt one is logged and treated the same way. Losing the record only
//! costs a reindex, because the coordinator re-checks the vector collection
//! before trusting it.

pub mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::error::IndexError;
use crate::fingerprint::Fingerprint;
use crate::models::{CollectionStats, IndexMetadata, SourceFileRecord};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read the persisted metadata; empty when absent or unreadable.
    async fn load(&self) -> IndexMetadata;

    /// Persist the full metadata atomically.
    async fn save(&self, metadata: &IndexMetadata) -> Result<(), IndexError>;

    /// Where the store lives, for status output.
    fn location(&self) -> String;

    /// Whether a persisted copy currently exists.
    async fn exists(&self) -> bool;

    /// Record a successful indexing of `path` at `fingerprint`.
    async fn record_success(
        &self,
        path: &Path,
        fingerprint: &Fingerprint,
        chunk_count: u64,
    ) -> Result<SourceFileRecord, IndexError> {
        let record = SourceFileRecord {
            fingerprint: fingerprint.hash.clone(),
            chunk_count,
            processed_at: Utc::now(),
            file_size: fingerprint.size,
        };
        let mut metadata = self.load().await;
        metadata
            .processed_files
            .insert(path.to_path_buf(), record.clone());
        self.save(&metadata).await?;
        Ok(record)
    }

    /// Forget one file. Returns the removed record, if there was one.
    async fn remove(&self, path: &Path) -> Result<Option<SourceFileRecord>, IndexError> {
        let mut metadata = self.load().await;
        let removed = metadata.processed_files.remove(path);
        if removed.is_some() {
            self.save(&metadata).await?;
        }
        Ok(removed)
    }

    /// Forget every file and reset the cached stats.
    async fn clear(&self) -> Result<(), IndexError> {
        self.save(&IndexMetadata::default()).await
    }

    /// Replace the cached collection stats.
    async fn update_stats(&self, stats: CollectionStats) -> Result<(), IndexError> {
        let mut metadata = self.load().await;
        metadata.collection_stats = stats;
        self.save(&metadata).await
    }
}

/// Parse a persisted metadata document.
///
/// The document as a whole must be a JSON object, otherwise the whole store
/// is reported as [`IndexError::CorruptMetadata`]. Individual entries with a
/// missing or malformed field, or an empty hash, are dropped with a warning
/// and the rest are kept.
pub fn parse_metadata(raw: &[u8], location: &str) -> Result<IndexMetadata, IndexError> {
    let corrupt = |reason: String| IndexError::CorruptMetadata {
        location: location.to_string(),
        reason,
    };

    let doc: Value = serde_json::from_slice(raw).map_err(|e| corrupt(e.to_string()))?;
    let obj = doc
        .as_object()
        .ok_or_else(|| corrupt("top-level value is not an object".to_string()))?;

    let mut metadata = IndexMetadata::default();

    match obj.get("processed_files") {
        None | Some(Value::Null) => {}
        Some(Value::Object(files)) => {
            for (path, entry) in files {
                match serde_json::from_value::<SourceFileRecord>(entry.clone()) {
                    Ok(record) if !record.fingerprint.is_empty() => {
                        metadata
                            .processed_files
                            .insert(PathBuf::from(path), record);
                    }
                    Ok(_) => warn!(%location, %path, "dropping metadata entry with empty file_hash"),
                    Err(e) => warn!(%location, %path, error = %e, "dropping malformed metadata entry"),
                }
            }
        }
        Some(_) => return Err(corrupt("processed_files is not an object".to_string())),
    }

    if let Some(stats) = obj.get("collection_stats") {
        match serde_json::from_value::<CollectionStats>(stats.clone()) {
            Ok(stats) => metadata.collection_stats = stats,
            Err(e) => warn!(%location, error = %e, "ignoring malformed collection_stats"),
        }
    }

    Ok(metadata)
}

/// Serialize metadata in the persisted layout.
pub fn render_metadata(metadata: &IndexMetadata) -> Result<Vec<u8>, IndexError> {
    serde_json::to_vec_pretty(metadata).map_err(|e| IndexError::CorruptMetadata {
        location: "<serialize>".to_string(),
        reason: e.to_string(),
    })
}
