//! Access to source documents.
//!
//! The coordinator never touches the filesystem directly. It resolves,
//! fingerprints, and extracts documents through [`DocumentSource`], so the
//! app crate can apply timeouts and format detection while tests feed
//! documents from memory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::IndexError;
use crate::fingerprint::Fingerprint;
use crate::models::PageText;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Canonical key for `path`: the same file must always resolve to the
    /// same key. Fails with [`IndexError::SourceMissing`] when the file
    /// does not exist and [`IndexError::SourceUnavailable`] when it exists
    /// but cannot be used.
    async fn resolve(&self, path: &Path) -> Result<PathBuf, IndexError>;

    /// Content fingerprint of the file at a resolved path.
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, IndexError>;

    /// Extracted text, page by page. May fail with
    /// [`IndexError::UnsupportedFormat`] or [`IndexError::Io`].
    async fn extract_text(&self, path: &Path) -> Result<Vec<PageText>, IndexError>;
}
