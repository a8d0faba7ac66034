//! Error taxonomy for the indexing subsystem.
//!
//! Every core operation returns [`IndexError`] rather than panicking. The
//! coordinator uses [`IndexError::is_fatal`] to decide whether a failure is
//! isolated to one file or aborts the rest of a batch.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// A file could be located but not read.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file exists but cannot be opened or is not a regular file.
    #[error("source unavailable: {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// No file exists at the path any more.
    #[error("source missing: {}", path.display())]
    SourceMissing { path: PathBuf },

    /// Text extraction does not support this kind of file.
    #[error("unsupported format: {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// The vector store is unreachable or timed out.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// The vector store answered but rejected the operation.
    #[error("vector store error: {0}")]
    Store(String),

    /// Chunking, embedding, or insertion failed while reindexing a file.
    #[error("indexing failed for {}: {reason}", path.display())]
    IndexingFailed {
        path: PathBuf,
        reason: String,
        #[source]
        cause: Option<Box<IndexError>>,
    },

    /// The metadata store could not be parsed. Recovered by treating the
    /// store as empty; only ever logged.
    #[error("corrupt index metadata at {location}: {reason}")]
    CorruptMetadata { location: String, reason: String },

    /// Embedding length does not match the collection schema.
    #[error("embedding dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IndexError {
    /// Fatal errors abort the remainder of a batch: no later file could
    /// succeed either.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexError::StoreUnavailable(_) | IndexError::DimensionMismatch { .. }
        )
    }

    pub fn indexing_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IndexError::IndexingFailed {
            path: path.into(),
            reason: reason.to_string(),
            cause: None,
        }
    }

    /// Wrap a non-fatal store error raised while committing a file's chunks.
    pub fn insertion_failed(path: impl Into<PathBuf>, cause: IndexError) -> Self {
        IndexError::IndexingFailed {
            path: path.into(),
            reason: format!("insertion failed: {cause}"),
            cause: Some(Box::new(cause)),
        }
    }

    /// Short machine-friendly label used in reports and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::Io { .. } => "io_error",
            IndexError::SourceUnavailable { .. } => "source_unavailable",
            IndexError::SourceMissing { .. } => "source_missing",
            IndexError::UnsupportedFormat { .. } => "unsupported_format",
            IndexError::StoreUnavailable(_) => "store_unavailable",
            IndexError::Store(_) => "store_error",
            IndexError::IndexingFailed { .. } => "indexing_failed",
            IndexError::CorruptMetadata { .. } => "corrupt_metadata",
            IndexError::DimensionMismatch { .. } => "dimension_mismatch",
            IndexError::InvalidArgument(_) => "invalid_argument",
        }
    }
}
