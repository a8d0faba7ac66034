//! Integration tests for the index coordinator.
//!
//! Every collaborator is an in-memory substitute, so these tests exercise
//! the reindex decision, drift recovery, and failure isolation without a
//! filesystem, a database, or a network.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cardio_rag_core::chunk::ChunkingParams;
use cardio_rag_core::coordinator::{
    offline_status, FileOutcome, IndexCoordinator, NoopObserver, ReindexObserver, StaleReason,
};
use cardio_rag_core::embedding::{EmbedKind, EmbeddingProvider};
use cardio_rag_core::error::IndexError;
use cardio_rag_core::fingerprint::{fingerprint_bytes, Fingerprint};
use cardio_rag_core::metadata::memory::InMemoryMetadataStore;
use cardio_rag_core::metadata::MetadataStore;
use cardio_rag_core::models::{EmbeddedChunk, IndexMetadata, PageText, ScoredChunk, SourceFileRecord};
use cardio_rag_core::pipeline::{ChunkEmbedPipeline, EmbeddingPipeline};
use cardio_rag_core::store::memory::InMemoryCollection;
use cardio_rag_core::store::{CollectionSchema, VectorCollection};

const DIMS: usize = 8;

// ─── Test Source ────────────────────────────────────────────────────

/// Documents held in memory. `.bin` files resolve and fingerprint but
/// cannot be extracted; locked files exist but refuse every read.
#[derive(Default)]
struct MemorySource {
    files: Mutex<HashMap<PathBuf, String>>,
    locked: Mutex<HashSet<PathBuf>>,
}

impl MemorySource {
    fn with(files: &[(&str, String)]) -> Self {
        let src = Self::default();
        for (path, body) in files {
            src.put(path, body.clone());
        }
        src
    }

    fn put(&self, path: &str, body: String) {
        self.files.lock().unwrap().insert(PathBuf::from(path), body);
    }

    fn delete(&self, path: &str) {
        self.files.lock().unwrap().remove(Path::new(path));
    }

    fn lock(&self, path: &str) {
        self.locked.lock().unwrap().insert(PathBuf::from(path));
    }

    fn body(&self, path: &Path) -> Result<String, IndexError> {
        let body = self
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| IndexError::SourceMissing {
                path: path.to_path_buf(),
            })?;
        if self.locked.lock().unwrap().contains(path) {
            return Err(IndexError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: "Permission denied (os error 13)".into(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl cardio_rag_core::source::DocumentSource for MemorySource {
    async fn resolve(&self, path: &Path) -> Result<PathBuf, IndexError> {
        self.body(path).map(|_| path.to_path_buf())
    }

    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, IndexError> {
        Ok(fingerprint_bytes(self.body(path)?.as_bytes()))
    }

    async fn extract_text(&self, path: &Path) -> Result<Vec<PageText>, IndexError> {
        let body = self.body(path)?;
        if path.extension().is_some_and(|e| e == "bin") {
            return Err(IndexError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "binary".into(),
            });
        }
        Ok(body
            .split('\u{c}')
            .enumerate()
            .map(|(i, text)| PageText {
                page_num: i as u32 + 1,
                text: text.to_string(),
            })
            .collect())
    }
}

// ─── Test Embedder / Pipeline ───────────────────────────────────────

/// Bag-of-letters embedding: similar texts get similar vectors.
struct LetterEmbedder {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String], _kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; self.dims];
                for b in t.bytes().filter(u8::is_ascii_lowercase) {
                    v[(b - b'a') as usize % self.dims] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Wraps the real pipeline and counts documents sent through it.
struct CountingPipeline {
    inner: EmbeddingPipeline,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChunkEmbedPipeline for CountingPipeline {
    async fn chunk_and_embed(
        &self,
        source: &Path,
        pages: &[PageText],
    ) -> Result<Vec<EmbeddedChunk>, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.chunk_and_embed(source, pages).await
    }
}

fn pipeline(embed_dims: usize) -> (CountingPipeline, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let params = ChunkingParams {
        chunk_size: 200,
        overlap: 40,
        min_chunk_chars: 20,
    };
    let inner = EmbeddingPipeline::new(Arc::new(LetterEmbedder { dims: embed_dims }), params, 4);
    (
        CountingPipeline {
            inner,
            calls: calls.clone(),
        },
        calls,
    )
}

// ─── Test Collection ────────────────────────────────────────────────

/// In-memory collection with switchable failures.
struct FlakyCollection {
    inner: InMemoryCollection,
    fail_replace: AtomicBool,
    unavailable: AtomicBool,
    count_fails: AtomicBool,
}

impl FlakyCollection {
    fn new() -> Self {
        Self {
            inner: InMemoryCollection::new(CollectionSchema::new("cardiology_rag", DIMS)),
            fail_replace: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            count_fails: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<(), IndexError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IndexError::StoreUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorCollection for FlakyCollection {
    fn schema(&self) -> &CollectionSchema {
        self.inner.schema()
    }

    async fn ensure_collection(&self) -> Result<bool, IndexError> {
        self.inner.ensure_collection().await
    }

    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<usize, IndexError> {
        self.check()?;
        self.inner.insert(chunks).await
    }

    async fn delete_by_source(&self, source: &Path) -> Result<usize, IndexError> {
        self.check()?;
        self.inner.delete_by_source(source).await
    }

    async fn replace_source(
        &self,
        source: &Path,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, IndexError> {
        self.check()?;
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(IndexError::Store("insert rejected".into()));
        }
        self.inner.replace_source(source, chunks).await
    }

    async fn load(&self) -> Result<(), IndexError> {
        self.inner.load().await
    }

    async fn count(&self) -> Result<u64, IndexError> {
        if self.count_fails.load(Ordering::SeqCst) {
            return Err(IndexError::StoreUnavailable("count timed out".into()));
        }
        self.inner.count().await
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        source: Option<&Path>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.inner.search(query, limit, source).await
    }

    async fn drop_collection(&self) -> Result<(), IndexError> {
        self.inner.drop_collection().await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

type Coordinator = IndexCoordinator<MemorySource, InMemoryMetadataStore, FlakyCollection, CountingPipeline>;

fn doc(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sentence {i} about {topic} and its clinical management. "))
        .collect()
}

fn coordinator(source: MemorySource) -> (Coordinator, Arc<AtomicUsize>) {
    coordinator_with(source, InMemoryMetadataStore::new(), DIMS)
}

fn coordinator_with(
    source: MemorySource,
    metadata: InMemoryMetadataStore,
    embed_dims: usize,
) -> (Coordinator, Arc<AtomicUsize>) {
    let (pipeline, calls) = pipeline(embed_dims);
    (
        IndexCoordinator::new(source, metadata, FlakyCollection::new(), pipeline),
        calls,
    )
}

fn paths(p: &[&str]) -> Vec<PathBuf> {
    p.iter().map(PathBuf::from).collect()
}

fn outcome<'a>(report: &'a cardio_rag_core::coordinator::ReindexReport, path: &str) -> &'a FileOutcome {
    &report
        .files
        .iter()
        .find(|f| f.path == Path::new(path))
        .unwrap_or_else(|| panic!("no outcome for {path}"))
        .outcome
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn second_run_does_no_work() {
    let source = MemorySource::with(&[
        ("/docs/heart.pdf", doc("arrhythmia", 20)),
        ("/docs/valve.pdf", doc("stenosis", 12)),
    ]);
    let (coord, calls) = coordinator(source);
    let targets = paths(&["/docs/heart.pdf", "/docs/valve.pdf"]);

    let first = coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    assert_eq!(first.indexed(), 2);
    assert!(first.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let entities = coord.collection().count().await.unwrap();
    let second = coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    assert_eq!(second.up_to_date(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(coord.collection().count().await.unwrap(), entities);
    assert_eq!(second.total_entities, Some(entities));
}

#[tokio::test]
async fn changed_file_is_reindexed_exactly_once() {
    let source = MemorySource::with(&[
        ("/docs/heart.pdf", doc("arrhythmia", 20)),
        ("/docs/valve.pdf", doc("stenosis", 12)),
    ]);
    let (coord, calls) = coordinator(source);
    let targets = paths(&["/docs/heart.pdf", "/docs/valve.pdf"]);
    coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    let old = coord.metadata().load().await.get(Path::new("/docs/valve.pdf")).cloned().unwrap();

    coord.source().put("/docs/valve.pdf", doc("regurgitation", 30));
    let report = coord.reindex(&targets, false, &NoopObserver).await.unwrap();

    assert!(matches!(outcome(&report, "/docs/heart.pdf"), FileOutcome::UpToDate));
    match outcome(&report, "/docs/valve.pdf") {
        FileOutcome::Indexed { reason, chunk_count } => {
            assert_eq!(*reason, StaleReason::Changed);
            assert!(*chunk_count > old.chunk_count);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let new = coord.metadata().load().await.get(Path::new("/docs/valve.pdf")).cloned().unwrap();
    assert_ne!(new.fingerprint, old.fingerprint);

    // Stale chunks are gone: the collection holds exactly what is recorded.
    let meta = coord.metadata().load().await;
    assert_eq!(coord.collection().count().await.unwrap(), meta.recorded_chunks());
}

#[tokio::test]
async fn wiped_collection_triggers_reindex_of_recorded_files() {
    let heart = doc("heart failure", 25);
    let fp = fingerprint_bytes(heart.as_bytes());
    let mut seeded = IndexMetadata::default();
    seeded.processed_files.insert(
        PathBuf::from("/docs/heart.pdf"),
        SourceFileRecord {
            fingerprint: fp.hash.clone(),
            chunk_count: 573,
            processed_at: chrono::Utc::now(),
            file_size: fp.size,
        },
    );
    let source = MemorySource::with(&[
        ("/docs/heart.pdf", heart),
        ("/docs/new.pdf", doc("hypertension", 5)),
    ]);
    let (coord, calls) = coordinator_with(source, InMemoryMetadataStore::with_metadata(seeded), DIMS);

    // Only the new file is named, but drift pulls in the recorded one too.
    let report = coord
        .reindex(&paths(&["/docs/new.pdf"]), false, &NoopObserver)
        .await
        .unwrap();

    let drift = report.drift.expect("drift detected");
    assert_eq!(drift.recorded_chunks, 573);
    assert_eq!(drift.live_entities, 0);
    assert!(matches!(
        outcome(&report, "/docs/heart.pdf"),
        FileOutcome::Indexed { reason: StaleReason::Drift, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let rec = coord.metadata().load().await.get(Path::new("/docs/heart.pdf")).cloned().unwrap();
    assert_ne!(rec.chunk_count, 573);
    assert!(coord.collection().count().await.unwrap() >= rec.chunk_count);
}

#[tokio::test]
async fn drift_recovers_after_external_drop() {
    let source = MemorySource::with(&[("/docs/heart.pdf", doc("ischemia", 15))]);
    let (coord, calls) = coordinator(source);
    let targets = paths(&["/docs/heart.pdf"]);
    coord.reindex(&targets, false, &NoopObserver).await.unwrap();

    coord.collection().drop_collection().await.unwrap();
    let report = coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    assert!(report.drift.is_some());
    assert_eq!(report.indexed(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(coord.collection().count().await.unwrap() > 0);

    // Converged: the next run is a no-op again.
    let again = coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    assert!(again.drift.is_none());
    assert_eq!(again.up_to_date(), 1);
}

#[tokio::test]
async fn drift_prunes_records_whose_source_is_gone() {
    let source = MemorySource::with(&[
        ("/docs/a.pdf", doc("atrial fibrillation", 10)),
        ("/docs/b.pdf", doc("bradycardia", 10)),
    ]);
    let (coord, _) = coordinator(source);
    coord
        .reindex(&paths(&["/docs/a.pdf", "/docs/b.pdf"]), false, &NoopObserver)
        .await
        .unwrap();

    coord.collection().drop_collection().await.unwrap();
    coord.source().delete("/docs/b.pdf");

    let report = coord
        .reindex(&paths(&["/docs/a.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    assert!(matches!(outcome(&report, "/docs/b.pdf"), FileOutcome::Removed { .. }));
    assert!(report.is_success());
    let meta = coord.metadata().load().await;
    assert!(meta.get(Path::new("/docs/b.pdf")).is_none());
    assert!(meta.get(Path::new("/docs/a.pdf")).is_some());

    let again = coord
        .reindex(&paths(&["/docs/a.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    assert!(again.drift.is_none());
}

#[tokio::test]
async fn failed_insert_commits_nothing() {
    let source = MemorySource::with(&[("/docs/heart.pdf", doc("angina", 15))]);
    let (coord, _) = coordinator(source);
    let targets = paths(&["/docs/heart.pdf"]);
    coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    let before = coord.metadata().load().await;
    let entities = coord.collection().count().await.unwrap();

    coord.source().put("/docs/heart.pdf", doc("unstable angina", 30));
    coord.collection().fail_replace.store(true, Ordering::SeqCst);
    let report = coord.reindex(&targets, false, &NoopObserver).await.unwrap();

    assert!(matches!(
        outcome(&report, "/docs/heart.pdf"),
        FileOutcome::Failed(IndexError::IndexingFailed { .. })
    ));
    assert!(!report.is_success());
    assert!(report.aborted.is_none());
    assert_eq!(
        coord.metadata().load().await.processed_files,
        before.processed_files
    );
    assert_eq!(coord.collection().count().await.unwrap(), entities);

    // Once the store accepts writes again the change is picked up.
    coord.collection().fail_replace.store(false, Ordering::SeqCst);
    let retry = coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    assert_eq!(retry.indexed(), 1);
}

#[tokio::test]
async fn force_refreshes_chunk_count() {
    let body = doc("cardiomyopathy", 18);
    let source = MemorySource::with(&[("/docs/heart.pdf", body.clone())]);
    let (coord, calls) = coordinator(source);
    let targets = paths(&["/docs/heart.pdf"]);
    coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    let real = coord.metadata().load().await.get(Path::new("/docs/heart.pdf")).unwrap().chunk_count;

    // A stale count that still passes the drift check.
    coord
        .metadata()
        .record_success(Path::new("/docs/heart.pdf"), &fingerprint_bytes(body.as_bytes()), 1)
        .await
        .unwrap();
    let unforced = coord.reindex(&targets, false, &NoopObserver).await.unwrap();
    assert_eq!(unforced.up_to_date(), 1);

    let forced = coord.reindex(&targets, true, &NoopObserver).await.unwrap();
    assert!(matches!(
        outcome(&forced, "/docs/heart.pdf"),
        FileOutcome::Indexed { reason: StaleReason::Forced, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let rec = coord.metadata().load().await.get(Path::new("/docs/heart.pdf")).cloned().unwrap();
    assert_eq!(rec.chunk_count, real);
}

#[tokio::test]
async fn clear_then_status_is_empty() {
    let source = MemorySource::with(&[("/docs/heart.pdf", doc("syncope", 12))]);
    let (coord, _) = coordinator(source);
    coord
        .reindex(&paths(&["/docs/heart.pdf"]), false, &NoopObserver)
        .await
        .unwrap();

    coord.clear().await.unwrap();
    let status = coord.status(false).await;
    assert!(status.files.is_empty());
    assert_eq!(status.live_entities, Some(0));
    assert!(status.drift.is_none());
    assert_eq!(coord.metadata().load().await.collection_stats.total_entities, 0);
}

#[tokio::test]
async fn status_reports_unreachable_store() {
    let source = MemorySource::with(&[("/docs/heart.pdf", doc("syncope", 12))]);
    let (coord, _) = coordinator(source);
    coord
        .reindex(&paths(&["/docs/heart.pdf"]), false, &NoopObserver)
        .await
        .unwrap();

    coord.collection().count_fails.store(true, Ordering::SeqCst);
    let status = coord.status(true).await;
    assert_eq!(status.live_entities, None);
    assert!(status.store_error.unwrap().contains("count timed out"));
    assert!(status.drift.is_none());
    assert_eq!(status.files.len(), 1);
    assert_eq!(status.files[0].source_present, Some(true));
    assert!(status.recorded_chunks > 0);
}

#[tokio::test]
async fn offline_status_reads_metadata_only() {
    let source = MemorySource::with(&[("/docs/heart.pdf", doc("syncope", 12))]);
    let (coord, _) = coordinator(source);
    coord
        .reindex(&paths(&["/docs/heart.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    coord.source().delete("/docs/heart.pdf");

    let schema = CollectionSchema::new("cardiology_rag", DIMS);
    let status = offline_status(
        coord.source(),
        coord.metadata(),
        &schema,
        "database is locked".into(),
        true,
    )
    .await;
    assert_eq!(status.collection_name, "cardiology_rag");
    assert_eq!(status.live_entities, None);
    assert_eq!(status.store_error.as_deref(), Some("database is locked"));
    assert_eq!(status.files.len(), 1);
    assert_eq!(status.files[0].source_present, Some(false));
}

#[tokio::test]
async fn one_bad_file_does_not_stop_the_batch() {
    let source = MemorySource::with(&[
        ("/docs/scan.bin", "binary".to_string()),
        ("/docs/tiny.pdf", "ok".to_string()),
        ("/docs/heart.pdf", doc("endocarditis", 12)),
    ]);
    let (coord, _) = coordinator(source);
    let report = coord
        .reindex(
            &paths(&["/docs/missing.pdf", "/docs/scan.bin", "/docs/tiny.pdf", "/docs/heart.pdf"]),
            false,
            &NoopObserver,
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome(&report, "/docs/missing.pdf"),
        FileOutcome::Skipped(IndexError::SourceMissing { .. })
    ));
    assert!(matches!(
        outcome(&report, "/docs/scan.bin"),
        FileOutcome::Skipped(IndexError::UnsupportedFormat { .. })
    ));
    assert!(matches!(
        outcome(&report, "/docs/tiny.pdf"),
        FileOutcome::Failed(IndexError::IndexingFailed { .. })
    ));
    assert!(matches!(outcome(&report, "/docs/heart.pdf"), FileOutcome::Indexed { .. }));
    assert_eq!(report.failed(), 3);

    let meta = coord.metadata().load().await;
    assert_eq!(meta.processed_files.len(), 1);
    assert!(meta.get(Path::new("/docs/heart.pdf")).is_some());
}

#[tokio::test]
async fn unavailable_store_aborts_remaining_files() {
    let source = MemorySource::with(&[
        ("/docs/a.pdf", doc("aorta", 10)),
        ("/docs/b.pdf", doc("bypass", 10)),
    ]);
    let (coord, calls) = coordinator(source);
    coord.collection().unavailable.store(true, Ordering::SeqCst);

    let report = coord
        .reindex(&paths(&["/docs/a.pdf", "/docs/b.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    assert!(matches!(report.aborted, Some(IndexError::StoreUnavailable(_))));
    assert_eq!(report.files.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(coord.metadata().load().await.processed_files.is_empty());
}

#[tokio::test]
async fn wrong_embedding_dimension_is_fatal() {
    let source = MemorySource::with(&[
        ("/docs/a.pdf", doc("aorta", 10)),
        ("/docs/b.pdf", doc("bypass", 10)),
    ]);
    let (coord, _) = coordinator_with(source, InMemoryMetadataStore::new(), DIMS / 2);
    let report = coord
        .reindex(&paths(&["/docs/a.pdf", "/docs/b.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    assert!(matches!(
        report.aborted,
        Some(IndexError::DimensionMismatch { expected: DIMS, actual: 4 })
    ));
    assert_eq!(report.files.len(), 1);
    assert_eq!(coord.collection().count().await.unwrap(), 0);
}

#[tokio::test]
async fn reindex_all_covers_recorded_files_and_keeps_missing_ones() {
    let source = MemorySource::with(&[
        ("/docs/a.pdf", doc("aorta", 10)),
        ("/docs/b.pdf", doc("bypass", 10)),
    ]);
    let (coord, _) = coordinator(source);
    coord
        .reindex(&paths(&["/docs/a.pdf", "/docs/b.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    let entities = coord.collection().count().await.unwrap();

    coord.source().delete("/docs/b.pdf");
    coord.source().put("/docs/c.pdf", doc("cardioversion", 10));
    let report = coord
        .reindex_all(&paths(&["/docs/a.pdf", "/docs/c.pdf"]), false, &NoopObserver)
        .await
        .unwrap();

    assert!(report.drift.is_none());
    assert!(matches!(outcome(&report, "/docs/a.pdf"), FileOutcome::UpToDate));
    assert!(matches!(outcome(&report, "/docs/c.pdf"), FileOutcome::Indexed { .. }));
    assert!(matches!(
        outcome(&report, "/docs/b.pdf"),
        FileOutcome::Skipped(IndexError::SourceMissing { .. })
    ));
    assert_eq!(report.removed(), 0);

    let meta = coord.metadata().load().await;
    assert_eq!(meta.processed_files.len(), 3);
    assert!(meta.get(Path::new("/docs/b.pdf")).is_some());
    assert!(coord.collection().count().await.unwrap() > entities);
}

#[tokio::test]
async fn unreadable_recorded_file_keeps_record_and_entities() {
    let source = MemorySource::with(&[
        ("/docs/locked.pdf", doc("pericarditis", 10)),
        ("/docs/open.pdf", doc("myocarditis", 10)),
    ]);
    let (coord, calls) = coordinator(source);
    coord
        .reindex(&paths(&["/docs/locked.pdf", "/docs/open.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    let entities = coord.collection().count().await.unwrap();
    let before = coord.metadata().load().await;
    calls.store(0, Ordering::SeqCst);

    coord.source().lock("/docs/locked.pdf");
    let report = coord.reindex_all(&[], false, &NoopObserver).await.unwrap();

    assert!(report.drift.is_none());
    assert!(matches!(
        outcome(&report, "/docs/locked.pdf"),
        FileOutcome::Skipped(IndexError::SourceUnavailable { .. })
    ));
    assert!(matches!(outcome(&report, "/docs/open.pdf"), FileOutcome::UpToDate));
    assert_eq!(report.removed(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(coord.collection().count().await.unwrap(), entities);
    let after = coord.metadata().load().await;
    assert_eq!(
        after.get(Path::new("/docs/locked.pdf")).map(|r| r.fingerprint.clone()),
        before.get(Path::new("/docs/locked.pdf")).map(|r| r.fingerprint.clone())
    );
}

#[tokio::test]
async fn drift_pass_does_not_prune_unreadable_files() {
    let source = MemorySource::with(&[
        ("/docs/a.pdf", doc("angina", 10)),
        ("/docs/locked.pdf", doc("pericarditis", 10)),
    ]);
    let (coord, _) = coordinator(source);
    coord
        .reindex(&paths(&["/docs/a.pdf", "/docs/locked.pdf"]), false, &NoopObserver)
        .await
        .unwrap();

    coord.collection().drop_collection().await.unwrap();
    coord.source().lock("/docs/locked.pdf");
    let report = coord
        .reindex(&paths(&["/docs/a.pdf"]), false, &NoopObserver)
        .await
        .unwrap();

    assert!(report.drift.is_some());
    assert!(matches!(outcome(&report, "/docs/a.pdf"), FileOutcome::Indexed { .. }));
    assert!(matches!(
        outcome(&report, "/docs/locked.pdf"),
        FileOutcome::Skipped(IndexError::SourceUnavailable { .. })
    ));
    assert!(coord
        .metadata()
        .load()
        .await
        .get(Path::new("/docs/locked.pdf"))
        .is_some());
}

#[tokio::test]
async fn rejected_insert_keeps_store_error_as_cause() {
    let source = MemorySource::with(&[("/docs/heart.pdf", doc("tamponade", 10))]);
    let (coord, _) = coordinator(source);
    coord.collection().fail_replace.store(true, Ordering::SeqCst);

    let report = coord
        .reindex(&paths(&["/docs/heart.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    match outcome(&report, "/docs/heart.pdf") {
        FileOutcome::Failed(IndexError::IndexingFailed { cause, .. }) => {
            assert!(matches!(cause.as_deref(), Some(IndexError::Store(_))));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn retrieval_is_ranked_and_bounded() {
    let source = MemorySource::with(&[
        ("/docs/a.pdf", doc("aorta", 20)),
        ("/docs/b.pdf", doc("bypass", 20)),
    ]);
    let (coord, _) = coordinator(source);

    let empty = coord.retrieve(&[1.0; DIMS], 5, None).await.unwrap();
    assert!(empty.is_empty());

    coord
        .reindex(&paths(&["/docs/a.pdf", "/docs/b.pdf"]), false, &NoopObserver)
        .await
        .unwrap();
    let total = coord.collection().count().await.unwrap() as usize;

    let hits = coord.retrieve(&[1.0; DIMS], 3, None).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let all = coord.retrieve(&[1.0; DIMS], total + 10, None).await.unwrap();
    assert_eq!(all.len(), total);

    let filtered = coord
        .retrieve(&[1.0; DIMS], 100, Some(Path::new("/docs/b.pdf")))
        .await
        .unwrap();
    assert!(!filtered.is_empty());
    assert!(filtered.iter().all(|h| h.source == "/docs/b.pdf"));

    assert!(matches!(
        coord.retrieve(&[1.0; DIMS], 0, None).await,
        Err(IndexError::InvalidArgument(_))
    ));
    assert!(matches!(
        coord.retrieve(&[1.0; 3], 1, None).await,
        Err(IndexError::DimensionMismatch { .. })
    ));
}

#[tokio::test]
async fn observer_sees_every_file() {
    #[derive(Default)]
    struct Recorder {
        started: AtomicUsize,
        finished: Mutex<Vec<String>>,
    }
    impl ReindexObserver for Recorder {
        fn file_started(&self, _index: usize, _total: usize, _path: &Path) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn file_finished(&self, _index: usize, _total: usize, report: &cardio_rag_core::coordinator::FileReport) {
            self.finished
                .lock()
                .unwrap()
                .push(report.outcome.label().to_string());
        }
    }

    let source = MemorySource::with(&[("/docs/a.pdf", doc("aorta", 10))]);
    let (coord, _) = coordinator(source);
    let recorder = Recorder::default();
    coord
        .reindex(&paths(&["/docs/a.pdf", "/docs/gone.pdf"]), false, &recorder)
        .await
        .unwrap();
    assert_eq!(recorder.started.load(Ordering::SeqCst), 2);
    assert_eq!(*recorder.finished.lock().unwrap(), vec!["indexed", "skipped"]);
}
