//! JSON file-backed [`MetadataStore`].
//!
//! The whole document is rewritten on every save: serialized to a uniquely
//! named sibling file, flushed to disk, then renamed over the target. A
//! reader therefore sees either the previous document or the new one, never
//! a torn write. Concurrent writers may lose each other's update but cannot
//! corrupt the file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use cardio_rag_core::error::IndexError;
use cardio_rag_core::metadata::{parse_metadata, render_metadata, MetadataStore};
use cardio_rag_core::models::IndexMetadata;

pub struct JsonMetadataStore {
    path: PathBuf,
    timeout: Duration,
}

impl JsonMetadataStore {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> IndexError {
        IndexError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn timed_out(&self) -> IndexError {
        self.io_error(std::io::Error::new(
            ErrorKind::TimedOut,
            format!("metadata I/O timed out after {}s", self.timeout.as_secs()),
        ))
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, IndexError> {
        match tokio::time::timeout(self.timeout, tokio::fs::read(&self.path)).await {
            Ok(Ok(bytes)) => Ok(Some(bytes)),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Ok(Err(e)) => Err(self.io_error(e)),
            Err(_) => Err(self.timed_out()),
        }
    }

    async fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index_metadata.json".to_string());
        let tmp = self
            .path
            .with_file_name(format!("{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn load(&self) -> IndexMetadata {
        let location = self.location();
        let bytes = match self.read().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(%location, "no metadata file yet");
                return IndexMetadata::default();
            }
            Err(e) => {
                warn!(%location, error = %e, "could not read metadata, treating as empty");
                return IndexMetadata::default();
            }
        };
        match parse_metadata(&bytes, &location) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "treating corrupt metadata as empty");
                IndexMetadata::default()
            }
        }
    }

    async fn save(&self, metadata: &IndexMetadata) -> Result<(), IndexError> {
        let bytes = render_metadata(metadata)?;
        match tokio::time::timeout(self.timeout, self.write_atomic(&bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.io_error(e)),
            Err(_) => Err(self.timed_out()),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardio_rag_core::fingerprint::fingerprint_bytes;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> JsonMetadataStore {
        JsonMetadataStore::new(
            dir.path().join("nested").join("index_metadata.json"),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(!s.exists().await);
        assert_eq!(s.load().await, IndexMetadata::default());
    }

    #[tokio::test]
    async fn save_creates_parent_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.record_success(Path::new("/docs/heart.pdf"), &fingerprint_bytes(b"pdf"), 7)
            .await
            .unwrap();
        assert!(s.exists().await);

        let reopened = store(&dir);
        let meta = reopened.load().await;
        assert_eq!(meta.get(Path::new("/docs/heart.pdf")).unwrap().chunk_count, 7);

        let raw = std::fs::read_to_string(reopened.path()).unwrap();
        assert!(raw.contains("\"file_hash\""));
        assert!(raw.contains("\"processed_date\""));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty_and_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        std::fs::create_dir_all(s.path().parent().unwrap()).unwrap();
        std::fs::write(s.path(), b"{\"processed_files\": tru").unwrap();

        assert!(s.load().await.processed_files.is_empty());
        s.record_success(Path::new("/a.pdf"), &fingerprint_bytes(b"a"), 1)
            .await
            .unwrap();
        assert_eq!(s.load().await.processed_files.len(), 1);
    }
}
