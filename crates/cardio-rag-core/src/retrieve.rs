//! Retrieval engine: top-k similarity search over a [`VectorCollection`].
//!
//! The similarity metric belongs to the collection. This module only
//! defines ordering, truncation, and the empty-result convention:
//!
//! 1. `k` must be positive.
//! 2. An empty (or missing) collection yields an empty result, not an error.
//! 3. Results are sorted by score descending; equal scores keep insertion
//!    order (ascending entity id).
//! 4. At most `k` results are returned; a `k` larger than the collection
//!    returns everything.

use std::cmp::Ordering;
use std::path::Path;

use tracing::debug;

use crate::error::IndexError;
use crate::models::ScoredChunk;
use crate::store::VectorCollection;

/// Sort candidates by descending score (ties by ascending id) and keep the
/// first `limit`. NaN scores sort last.
pub fn rank(mut candidates: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| {
        match (a.score.is_nan(), b.score.is_nan()) {
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(limit);
    candidates
}

/// Run a top-`k` similarity search, optionally restricted to one source.
pub async fn retrieve<C: VectorCollection + ?Sized>(
    collection: &C,
    query: &[f32],
    k: usize,
    source_filter: Option<&Path>,
) -> Result<Vec<ScoredChunk>, IndexError> {
    if k == 0 {
        return Err(IndexError::InvalidArgument(
            "k must be a positive integer".to_string(),
        ));
    }
    collection.schema().check_dims(query)?;

    if collection.count().await? == 0 {
        debug!(collection = %collection.schema().name, "collection empty, nothing to retrieve");
        return Ok(Vec::new());
    }

    collection.load().await?;
    let candidates = collection.search(query, k, source_filter).await?;
    Ok(rank(candidates, k))
}
