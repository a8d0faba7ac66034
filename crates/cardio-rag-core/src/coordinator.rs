//! Index coordinator: decides which source files need (re)indexing and keeps
//! the metadata record consistent with the vector collection.
//!
//! # Per-file decision
//!
//! ```text
//! resolve + fingerprint ──fail──▶ Skipped (no state change)
//!        │
//!        ▼
//! record? fingerprint equal? not forced? no drift? ──yes──▶ UpToDate
//!        │ no
//!        ▼
//! extract ──fail──▶ Skipped
//!        │
//!        ▼
//! chunk + embed ──▶ replace_source ──▶ record_success ──▶ Indexed
//!        └───────────── any failure ──▶ Failed (metadata untouched)
//! ```
//!
//! `replace_source` removes the previous entities for a file and inserts the
//! new ones in a single transaction, so stale and fresh chunks never coexist
//! and a failed insertion leaves the last good set in place.
//!
//! # Drift
//!
//! The metadata record is only a claim about the collection. At the start of
//! every batch the live entity count is compared with the recorded chunk
//! total; if the collection holds fewer entities than recorded (including
//! none at all), every recorded file is forced back through the pipeline.
//! During such a pass a recorded file whose source no longer exists is
//! dropped from the record, since its entities cannot be rebuilt. Outside a
//! drift pass, and for files that exist but cannot be read, the record and
//! entities are kept and the file is only skipped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::IndexError;
use crate::metadata::MetadataStore;
use crate::models::{CollectionStats, FileState, IndexMetadata, ScoredChunk, SourceFileRecord};
use crate::pipeline::ChunkEmbedPipeline;
use crate::retrieve;
use crate::source::DocumentSource;
use crate::store::{CollectionSchema, VectorCollection};

/// Evidence that the collection no longer holds what the metadata claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub recorded_files: usize,
    pub recorded_chunks: u64,
    pub live_entities: u64,
}

/// Compare the metadata record with the live entity count.
pub fn detect_drift(metadata: &IndexMetadata, live_entities: u64) -> Option<Drift> {
    let recorded_files = metadata.processed_files.len();
    if recorded_files == 0 {
        return None;
    }
    let recorded_chunks = metadata.recorded_chunks();
    if live_entities == 0 || live_entities < recorded_chunks {
        Some(Drift {
            recorded_files,
            recorded_chunks,
            live_entities,
        })
    } else {
        None
    }
}

/// Why a file went through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    New,
    Changed,
    Forced,
    Drift,
}

#[derive(Debug)]
pub enum FileOutcome {
    /// Fresh entities were committed and the record updated.
    Indexed { reason: StaleReason, chunk_count: u64 },
    /// Fingerprint matched the record; nothing was done.
    UpToDate,
    /// The source could not be read or extracted. Nothing changed.
    Skipped(IndexError),
    /// Chunking, embedding, insertion, or the record update failed. The
    /// metadata entry, if any, is the one from before this attempt.
    Failed(IndexError),
    /// A recorded source no longer exists and a drift pass dropped its
    /// entities and record.
    Removed { deleted: usize },
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Skipped(_) | FileOutcome::Failed(_))
    }

    /// Short label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Indexed { .. } => "indexed",
            FileOutcome::UpToDate => "up_to_date",
            FileOutcome::Skipped(_) => "skipped",
            FileOutcome::Failed(_) => "failed",
            FileOutcome::Removed { .. } => "removed",
        }
    }

    pub fn error(&self) -> Option<&IndexError> {
        match self {
            FileOutcome::Skipped(e) | FileOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Result of one reindex batch.
#[derive(Debug, Default)]
pub struct ReindexReport {
    pub files: Vec<FileReport>,
    pub drift: Option<Drift>,
    /// Fatal error that stopped the batch early. Files after the one that
    /// hit it were not attempted.
    pub aborted: Option<IndexError>,
    /// Live entity count after the batch, when the store could report it.
    pub total_entities: Option<u64>,
}

impl ReindexReport {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    pub fn indexed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Indexed { .. }))
    }

    pub fn up_to_date(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::UpToDate))
    }

    pub fn failed(&self) -> usize {
        self.count(FileOutcome::is_failure)
    }

    pub fn removed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Removed { .. }))
    }

    /// True when every attempted file succeeded and the batch ran to the end.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.failed() == 0
    }
}

/// Progress hook for long batches. All methods default to no-ops.
pub trait ReindexObserver: Send + Sync {
    fn batch_started(&self, _total: usize, _drift: Option<&Drift>) {}
    fn file_started(&self, _index: usize, _total: usize, _path: &Path) {}
    fn file_finished(&self, _index: usize, _total: usize, _report: &FileReport) {}
}

pub struct NoopObserver;

impl ReindexObserver for NoopObserver {}

/// One recorded file as reported by [`IndexCoordinator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: PathBuf,
    #[serde(flatten)]
    pub record: SourceFileRecord,
    pub state: FileState,
    /// Whether the source still resolves; `None` when not checked.
    pub source_present: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub collection_name: String,
    pub dims: usize,
    /// Live entity count; `None` when the store could not be reached.
    pub live_entities: Option<u64>,
    pub store_error: Option<String>,
    pub metadata_location: String,
    pub metadata_exists: bool,
    pub recorded_chunks: u64,
    pub drift: Option<Drift>,
    pub files: Vec<FileStatus>,
}

struct Target {
    path: PathBuf,
    /// Not named by the caller. Only such targets are ever pruned.
    recorded_only: bool,
}

/// Drives the per-file decision over a set of collaborators.
pub struct IndexCoordinator<D, M, C, P> {
    source: D,
    metadata: M,
    collection: C,
    pipeline: P,
}

impl<D, M, C, P> IndexCoordinator<D, M, C, P>
where
    D: DocumentSource,
    M: MetadataStore,
    C: VectorCollection,
    P: ChunkEmbedPipeline,
{
    pub fn new(source: D, metadata: M, collection: C, pipeline: P) -> Self {
        Self {
            source,
            metadata,
            collection,
            pipeline,
        }
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Make sure the collection exists and is ready for search.
    pub async fn prepare(&self) -> Result<(), IndexError> {
        if self.collection.ensure_collection().await? {
            info!(collection = %self.collection.schema().name, "created collection");
        }
        self.collection.load().await
    }

    /// Reindex the named files. Unchanged files are skipped unless `force`.
    pub async fn reindex(
        &self,
        paths: &[PathBuf],
        force: bool,
        observer: &dyn ReindexObserver,
    ) -> Result<ReindexReport, IndexError> {
        self.run_batch(paths, false, force, observer).await
    }

    /// Reindex every discovered corpus file plus every recorded file.
    pub async fn reindex_all(
        &self,
        discovered: &[PathBuf],
        force: bool,
        observer: &dyn ReindexObserver,
    ) -> Result<ReindexReport, IndexError> {
        self.run_batch(discovered, true, force, observer).await
    }

    async fn run_batch(
        &self,
        named: &[PathBuf],
        include_recorded: bool,
        force: bool,
        observer: &dyn ReindexObserver,
    ) -> Result<ReindexReport, IndexError> {
        self.prepare().await?;
        let metadata = self.metadata.load().await;
        let live = self.collection.count().await?;

        let drift = detect_drift(&metadata, live);
        if let Some(d) = &drift {
            warn!(
                recorded_files = d.recorded_files,
                recorded_chunks = d.recorded_chunks,
                live_entities = d.live_entities,
                "collection holds fewer entities than recorded, reindexing all recorded files"
            );
        }
        let force = force || drift.is_some();

        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();
        for path in named {
            if seen.insert(path.clone()) {
                targets.push(Target {
                    path: path.clone(),
                    recorded_only: false,
                });
            }
        }
        if include_recorded || drift.is_some() {
            for path in metadata.processed_files.keys() {
                if seen.insert(path.clone()) {
                    targets.push(Target {
                        path: path.clone(),
                        recorded_only: true,
                    });
                }
            }
        }

        let total = targets.len();
        observer.batch_started(total, drift.as_ref());

        let mut report = ReindexReport {
            drift,
            ..ReindexReport::default()
        };
        let mut resolved = BTreeSet::new();

        for (index, target) in targets.iter().enumerate() {
            observer.file_started(index, total, &target.path);
            let result = self
                .index_one(target, &metadata, force, drift.is_some(), &mut resolved)
                .await;
            let outcome = match result {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(fatal) => {
                    warn!(path = %target.path.display(), error = %fatal, "aborting batch");
                    let file = FileReport {
                        path: target.path.clone(),
                        outcome: FileOutcome::Failed(IndexError::indexing_failed(
                            &target.path,
                            fatal.to_string(),
                        )),
                    };
                    observer.file_finished(index, total, &file);
                    report.files.push(file);
                    report.aborted = Some(fatal);
                    break;
                }
            };
            let file = FileReport {
                path: target.path.clone(),
                outcome,
            };
            observer.file_finished(index, total, &file);
            report.files.push(file);
        }

        report.total_entities = self.refresh_stats().await;
        info!(
            indexed = report.indexed(),
            up_to_date = report.up_to_date(),
            failed = report.failed(),
            removed = report.removed(),
            "reindex batch finished"
        );
        Ok(report)
    }

    /// Decide and, if stale, reindex one target. `Ok(None)` means the target
    /// resolved to a file already handled in this batch. `Err` is reserved
    /// for fatal errors.
    async fn index_one(
        &self,
        target: &Target,
        metadata: &IndexMetadata,
        force: bool,
        drift: bool,
        resolved: &mut BTreeSet<PathBuf>,
    ) -> Result<Option<FileOutcome>, IndexError> {
        let path = match self.source.resolve(&target.path).await {
            Ok(p) => p,
            Err(e) => return self.unavailable(target, metadata, drift, e).await.map(Some),
        };
        if !resolved.insert(path.clone()) {
            debug!(path = %path.display(), "already handled in this batch");
            return Ok(None);
        }

        let fingerprint = match self.source.fingerprint(&path).await {
            Ok(fp) => fp,
            Err(e) => return self.unavailable(target, metadata, drift, e).await.map(Some),
        };

        let reason = match metadata.get(&path) {
            None => StaleReason::New,
            Some(rec) if rec.fingerprint != fingerprint.hash => StaleReason::Changed,
            Some(_) if drift => StaleReason::Drift,
            Some(_) if force => StaleReason::Forced,
            Some(_) => {
                debug!(path = %path.display(), "fingerprint unchanged");
                return Ok(Some(FileOutcome::UpToDate));
            }
        };
        debug!(path = %path.display(), ?reason, "file is stale");

        let pages = match self.source.extract_text(&path).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "text extraction failed");
                return Ok(Some(FileOutcome::Skipped(e)));
            }
        };

        let chunks = match self.pipeline.chunk_and_embed(&path, &pages).await {
            Ok(chunks) if chunks.is_empty() => {
                return Ok(Some(FileOutcome::Failed(IndexError::indexing_failed(
                    &path,
                    "no indexable text",
                ))));
            }
            Ok(chunks) => chunks,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(Some(FileOutcome::Failed(e))),
        };
        self.collection.schema().check_batch(&chunks)?;

        match self.collection.replace_source(&path, &chunks).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(Some(FileOutcome::Failed(IndexError::insertion_failed(&path, e)))),
        }

        let chunk_count = chunks.len() as u64;
        if let Err(e) = self
            .metadata
            .record_success(&path, &fingerprint, chunk_count)
            .await
        {
            warn!(path = %path.display(), error = %e, "entities committed but record update failed");
            return Ok(Some(FileOutcome::Failed(e)));
        }

        info!(path = %path.display(), chunks = chunk_count, ?reason, "indexed");
        Ok(Some(FileOutcome::Indexed { reason, chunk_count }))
    }

    /// A target whose source cannot be resolved or read. It is skipped unless
    /// this is a drift pass, the target came from the record, and the file no
    /// longer exists; only then are its entities and record dropped.
    async fn unavailable(
        &self,
        target: &Target,
        metadata: &IndexMetadata,
        drift: bool,
        err: IndexError,
    ) -> Result<FileOutcome, IndexError> {
        let gone = matches!(err, IndexError::SourceMissing { .. });
        let prune = drift && target.recorded_only && gone && metadata.get(&target.path).is_some();
        if !prune {
            warn!(path = %target.path.display(), error = %err, "source unavailable");
            return Ok(FileOutcome::Skipped(err));
        }

        let deleted = match self.collection.delete_by_source(&target.path).await {
            Ok(n) => n,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(FileOutcome::Failed(e)),
        };
        if let Err(e) = self.metadata.remove(&target.path).await {
            return Ok(FileOutcome::Failed(e));
        }
        info!(path = %target.path.display(), deleted, "source removed, dropped its record");
        Ok(FileOutcome::Removed { deleted })
    }

    /// Write the live count into the cached stats. Returns the count, or
    /// `None` when the store could not be asked.
    async fn refresh_stats(&self) -> Option<u64> {
        let total = match self.collection.count().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "could not refresh collection stats");
                return None;
            }
        };
        let stats = CollectionStats {
            total_entities: total,
            collection_name: self.collection.schema().name.clone(),
        };
        if let Err(e) = self.metadata.update_stats(stats).await {
            warn!(error = %e, "could not persist collection stats");
        }
        Some(total)
    }

    /// Report recorded files, the live entity count, and any drift.
    ///
    /// An unreachable store is reported in the result rather than returned as
    /// an error so the metadata side can still be inspected.
    pub async fn status(&self, check_sources: bool) -> IndexStatus {
        let live = self.collection.count().await.map_err(|e| e.to_string());
        if live.is_ok() && self.metadata.exists().await {
            self.refresh_stats().await;
        }
        build_status(
            &self.source,
            &self.metadata,
            self.collection.schema(),
            live,
            check_sources,
        )
        .await
    }

    /// Drop and recreate the collection, then empty the metadata record.
    /// If the drop fails the metadata is left alone.
    pub async fn clear(&self) -> Result<(), IndexError> {
        self.collection.drop_collection().await?;
        self.collection.ensure_collection().await?;
        self.metadata.clear().await?;
        self.metadata
            .update_stats(CollectionStats {
                total_entities: 0,
                collection_name: self.collection.schema().name.clone(),
            })
            .await?;
        info!(collection = %self.collection.schema().name, "index cleared");
        Ok(())
    }

    /// Top-`k` chunks for an already embedded query, optionally restricted to
    /// one source file.
    pub async fn retrieve(
        &self,
        query: &[f32],
        k: usize,
        source_filter: Option<&Path>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let filter = match source_filter {
            Some(p) => Some(self.source.resolve(p).await.unwrap_or_else(|_| p.to_path_buf())),
            None => None,
        };
        retrieve::retrieve(&self.collection, query, k, filter.as_deref()).await
    }
}

/// Status from the metadata side alone, for when the collection could not
/// be opened at all.
pub async fn offline_status<D, M>(
    source: &D,
    metadata: &M,
    schema: &CollectionSchema,
    store_error: String,
    check_sources: bool,
) -> IndexStatus
where
    D: DocumentSource,
    M: MetadataStore,
{
    build_status(source, metadata, schema, Err(store_error), check_sources).await
}

async fn build_status<D, M>(
    source: &D,
    metadata_store: &M,
    schema: &CollectionSchema,
    live: Result<u64, String>,
    check_sources: bool,
) -> IndexStatus
where
    D: DocumentSource,
    M: MetadataStore,
{
    let metadata_exists = metadata_store.exists().await;
    let metadata = metadata_store.load().await;
    let (live_entities, store_error) = match live {
        Ok(n) => (Some(n), None),
        Err(e) => (None, Some(e)),
    };
    let drift = live_entities.and_then(|n| detect_drift(&metadata, n));

    let mut files = Vec::with_capacity(metadata.processed_files.len());
    for (path, record) in &metadata.processed_files {
        let source_present = if check_sources {
            Some(!matches!(
                source.resolve(path).await,
                Err(IndexError::SourceMissing { .. })
            ))
        } else {
            None
        };
        let state = if drift.is_some() || source_present == Some(false) {
            FileState::Stale
        } else {
            FileState::Indexed
        };
        files.push(FileStatus {
            path: path.clone(),
            record: record.clone(),
            state,
            source_present,
        });
    }

    IndexStatus {
        collection_name: schema.name.clone(),
        dims: schema.dims,
        live_entities,
        store_error,
        metadata_location: metadata_store.location(),
        metadata_exists,
        recorded_chunks: metadata.recorded_chunks(),
        drift,
        files,
    }
}
