//! Core data types that flow through indexing and retrieval.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of one successfully indexed source file.
///
/// The owning path is the key of [`IndexMetadata::processed_files`].
/// All fields are required: an entry missing any of them is treated as if
/// the file had never been indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileRecord {
    /// Hex content digest at the last successful indexing.
    #[serde(rename = "file_hash")]
    pub fingerprint: String,
    pub chunk_count: u64,
    #[serde(rename = "processed_date", with = "unix_ts_string")]
    pub processed_at: DateTime<Utc>,
    pub file_size: u64,
}

/// Cached summary of the vector collection.
///
/// Advisory only: the collection's own `count()` is authoritative and the
/// coordinator never makes a reindex decision from this value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    #[serde(default)]
    pub total_entities: u64,
    #[serde(default)]
    pub collection_name: String,
}

/// Everything the metadata store persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    #[serde(default)]
    pub processed_files: BTreeMap<PathBuf, SourceFileRecord>,
    #[serde(default)]
    pub collection_stats: CollectionStats,
}

impl IndexMetadata {
    pub fn get(&self, path: &Path) -> Option<&SourceFileRecord> {
        self.processed_files.get(path)
    }

    /// Sum of recorded chunk counts; the minimum number of entities the
    /// collection must hold for the records to be believable.
    pub fn recorded_chunks(&self) -> u64 {
        self.processed_files.values().map(|r| r.chunk_count).sum()
    }
}

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number within the source document.
    pub page_num: u32,
    pub text: String,
}

/// A contiguous span of extracted text, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub source: PathBuf,
    pub page_num: u32,
    /// Sequence index within the source file, contiguous from 0.
    pub chunk_index: u32,
    pub text: String,
}

/// A chunk together with its embedding vector, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    /// Entity id assigned at insertion; increases with insertion order.
    pub id: u64,
    pub text: String,
    pub source: String,
    pub page_num: u32,
    pub chunk_index: u32,
    pub score: f32,
}

/// Lifecycle of one source file as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Never evaluated, or the last attempt failed and committed nothing.
    Unknown,
    /// Recorded fingerprint no longer describes what the collection should hold.
    Stale,
    Indexing,
    Indexed,
}

/// `processed_date` is a unix timestamp stored as a string.
///
/// Written as whole seconds; fractional strings such as `"1718000000.25"`
/// are accepted on read.
mod unix_ts_string {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.timestamp().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid unix timestamp: {raw:?}")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let secs: f64 = raw.trim().parse().ok()?;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let whole = secs.trunc();
        let nanos = ((secs - whole) * 1e9).round() as u32;
        DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
    }
}
