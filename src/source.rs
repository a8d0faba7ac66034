//! Filesystem [`DocumentSource`].
//!
//! Paths are canonicalized so the same file always maps to the same metadata
//! key and the same `source` value in the collection. Every read is bounded
//! by the configured I/O timeout; a timeout is reported as an I/O error for
//! that file and never blocks the rest of a batch.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use cardio_rag_core::error::IndexError;
use cardio_rag_core::fingerprint::{Fingerprint, Fingerprinter};
use cardio_rag_core::models::PageText;
use cardio_rag_core::source::DocumentSource;

use crate::extract::{extract_pages, DocumentKind};

const READ_BUF_BYTES: usize = 64 * 1024;

pub struct FsSource {
    timeout: Duration,
}

impl FsSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn bounded<T>(
        &self,
        path: &Path,
        fut: impl std::future::Future<Output = std::io::Result<T>>,
    ) -> Result<T, IndexError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(classify(path, e)),
            Err(_) => Err(IndexError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    ErrorKind::TimedOut,
                    format!("read timed out after {}s", self.timeout.as_secs()),
                ),
            }),
        }
    }
}

/// Only `NotFound` means the file is gone. Permission errors leave it
/// "unavailable" for this run; anything else is an I/O failure.
fn classify(path: &Path, e: std::io::Error) -> IndexError {
    match e.kind() {
        ErrorKind::NotFound => IndexError::SourceMissing {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => IndexError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
        _ => IndexError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    }
}

#[async_trait]
impl DocumentSource for FsSource {
    async fn resolve(&self, path: &Path) -> Result<PathBuf, IndexError> {
        let canonical = self.bounded(path, tokio::fs::canonicalize(path)).await?;
        let meta = self.bounded(path, tokio::fs::metadata(&canonical)).await?;
        if !meta.is_file() {
            return Err(IndexError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }
        Ok(canonical)
    }

    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, IndexError> {
        self.bounded(path, async {
            let mut file = tokio::fs::File::open(path).await?;
            let mut fp = Fingerprinter::new();
            let mut buf = vec![0u8; READ_BUF_BYTES];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                fp.update(&buf[..n]);
            }
            Ok(fp.finish())
        })
        .await
    }

    async fn extract_text(&self, path: &Path) -> Result<Vec<PageText>, IndexError> {
        let kind = DocumentKind::from_path(path).ok_or_else(|| IndexError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!(
                "unsupported extension {:?}",
                path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default()
            ),
        })?;
        let bytes = self.bounded(path, tokio::fs::read(path)).await?;

        let joined = tokio::task::spawn_blocking(move || extract_pages(&bytes, kind)).await;
        match joined {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(IndexError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
            Err(e) => Err(IndexError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("extractor crashed: {e}"),
            }),
        }
    }
}
