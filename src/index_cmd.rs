//! Index maintenance commands: `status`, `add`, `reindex`, and `clear`.
//!
//! Each command opens the SQLite vector collection, the JSON metadata file,
//! and the configured embedding provider, hands them to the core
//! [`IndexCoordinator`], and prints a summary on stdout. Progress and logs go
//! to stderr.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::warn;

use cardio_rag_core::coordinator::{
    offline_status, FileOutcome, IndexCoordinator, IndexStatus, NoopObserver, ReindexReport,
};
use cardio_rag_core::models::FileState;
use cardio_rag_core::pipeline::EmbeddingPipeline;
use cardio_rag_core::store::CollectionSchema;

use crate::config::Config;
use crate::corpus;
use crate::db;
use crate::embedding;
use crate::metadata_file::JsonMetadataStore;
use crate::progress::{format_number, ProgressMode};
use crate::source::FsSource;
use crate::sqlite_store::SqliteCollection;

pub type Coordinator =
    IndexCoordinator<FsSource, JsonMetadataStore, SqliteCollection, EmbeddingPipeline>;

/// Wire the filesystem source, metadata file, SQLite collection, and
/// embedding pipeline described by `config`.
pub async fn open_coordinator(config: &Config) -> Result<Coordinator> {
    let provider = embedding::create_provider(&config.embedding)?;
    let schema = CollectionSchema::new(&config.index.collection_name, provider.dims());
    let collection = open_collection(config, schema).await?;

    Ok(IndexCoordinator::new(
        FsSource::new(config.io_timeout()),
        metadata_store(config),
        collection,
        EmbeddingPipeline::new(provider, config.chunking.params(), config.embedding.batch_size),
    ))
}

async fn open_collection(config: &Config, schema: CollectionSchema) -> Result<SqliteCollection> {
    let pool = db::connect(config).await?;
    SqliteCollection::open(pool, schema, config.db_timeout())
        .await
        .context("Failed to open vector collection")
}

fn metadata_store(config: &Config) -> JsonMetadataStore {
    JsonMetadataStore::new(&config.index.metadata_path, config.io_timeout())
}

async fn close(coordinator: Coordinator) {
    coordinator.collection().pool().close().await;
}

/// Print recorded files, the live entity count, and any drift.
///
/// An unreachable store, including one that cannot be opened, is shown in
/// the output rather than failing the command.
pub async fn run_status(config: &Config, json: bool) -> Result<()> {
    let provider = embedding::create_provider(&config.embedding)?;
    let schema = CollectionSchema::new(&config.index.collection_name, provider.dims());
    let status = match open_collection(config, schema.clone()).await {
        Ok(collection) => {
            let coordinator = IndexCoordinator::new(
                FsSource::new(config.io_timeout()),
                metadata_store(config),
                collection,
                EmbeddingPipeline::new(provider, config.chunking.params(), config.embedding.batch_size),
            );
            let status = coordinator.status(true).await;
            close(coordinator).await;
            status
        }
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(error = %reason, "vector store could not be opened");
            offline_status(
                &FsSource::new(config.io_timeout()),
                &metadata_store(config),
                &schema,
                reason,
                true,
            )
            .await
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &IndexStatus) {
    println!("Cardio RAG Index Status");
    println!("=======================");
    println!();
    println!("  Collection:  {} ({} dims)", status.collection_name, status.dims);
    match (&status.live_entities, &status.store_error) {
        (Some(n), _) => println!("  Entities:    {}", format_number(*n)),
        (None, Some(e)) => println!("  Entities:    unavailable ({})", e),
        (None, None) => println!("  Entities:    unavailable"),
    }
    println!(
        "  Metadata:    {}{}",
        status.metadata_location,
        if status.metadata_exists { "" } else { " (not created yet)" }
    );
    println!("  Files:       {}", status.files.len());
    println!("  Recorded:    {} chunks", format_number(status.recorded_chunks));

    if let Some(d) = &status.drift {
        println!();
        println!(
            "  DRIFT: collection holds {} entities but {} chunks are recorded.",
            format_number(d.live_entities),
            format_number(d.recorded_chunks)
        );
        println!("         Run `cardio reindex --all` to rebuild.");
    }

    if status.files.is_empty() {
        println!();
        println!("  No files indexed.");
        println!();
        return;
    }

    println!();
    println!(
        "  {:<8} {:>8} {:>10}   {:<20} {}",
        "STATE", "CHUNKS", "SIZE", "PROCESSED", "PATH"
    );
    println!("  {}", "-".repeat(76));
    for f in &status.files {
        let state = match (f.source_present, f.state) {
            (Some(false), _) => "missing",
            (_, FileState::Indexed) => "indexed",
            (_, FileState::Stale) => "stale",
            (_, FileState::Indexing) => "indexing",
            (_, FileState::Unknown) => "unknown",
        };
        println!(
            "  {:<8} {:>8} {:>10}   {:<20} {}",
            state,
            format_number(f.record.chunk_count),
            format_bytes(f.record.file_size),
            f.record.processed_at.format("%Y-%m-%d %H:%M:%S"),
            f.path.display()
        );
    }
    println!();
}

/// Index one file if it is new or has changed.
pub async fn run_add(config: &Config, file: PathBuf) -> Result<()> {
    let coordinator = open_coordinator(config).await?;
    let report = coordinator.reindex(&[file], false, &NoopObserver).await;
    close(coordinator).await;
    finish(report?)
}

/// Reindex the named files, or the whole corpus plus every recorded file
/// with `all`.
pub async fn run_reindex(
    config: &Config,
    files: Vec<PathBuf>,
    all: bool,
    force: bool,
    progress: ProgressMode,
) -> Result<()> {
    if files.is_empty() && !all {
        bail!("Nothing to reindex: name one or more files or pass --all");
    }

    let discovered = if all {
        match &config.corpus {
            Some(corpus_cfg) => corpus::discover(corpus_cfg)?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    let coordinator = open_coordinator(config).await?;
    let observer = progress.observer();
    let report = if all {
        let mut targets = discovered;
        targets.extend(files);
        coordinator
            .reindex_all(&targets, force, observer.as_ref())
            .await
    } else {
        coordinator.reindex(&files, force, observer.as_ref()).await
    };
    close(coordinator).await;
    finish(report?)
}

/// Print the batch summary, then fail if any file failed or the batch was
/// aborted.
fn finish(report: ReindexReport) -> Result<()> {
    print_report(&report);
    if let Some(e) = &report.aborted {
        bail!("Reindex aborted: {}", e);
    }
    if report.failed() > 0 {
        bail!("{} file(s) failed to index", report.failed());
    }
    Ok(())
}

fn print_report(report: &ReindexReport) {
    if let Some(d) = &report.drift {
        println!(
            "drift: collection held {} entities, {} chunks recorded across {} files",
            format_number(d.live_entities),
            format_number(d.recorded_chunks),
            d.recorded_files
        );
    }
    for f in &report.files {
        match &f.outcome {
            FileOutcome::Indexed { chunk_count, .. } => println!(
                "  indexed     {}  ({} chunks)",
                f.path.display(),
                format_number(*chunk_count)
            ),
            FileOutcome::UpToDate => println!("  up to date  {}", f.path.display()),
            FileOutcome::Removed { deleted } => {
                println!("  removed     {}  ({} entities)", f.path.display(), deleted)
            }
            FileOutcome::Skipped(e) => println!("  skipped     {}  {}", f.path.display(), e),
            FileOutcome::Failed(e) => println!("  failed      {}  {}", f.path.display(), e),
        }
    }
    println!(
        "reindex summary: indexed={} up_to_date={} removed={} failed={}",
        report.indexed(),
        report.up_to_date(),
        report.removed(),
        report.failed()
    );
    if let Some(total) = report.total_entities {
        println!("total entities: {}", format_number(total));
    }
}

/// Drop the collection and empty the metadata record. Refuses without `yes`.
pub async fn run_clear(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to clear the index without --yes");
    }
    let coordinator = open_coordinator(config).await?;
    let result = coordinator.clear().await;
    close(coordinator).await;
    result.context("Failed to clear index")?;
    println!("Index cleared.");
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
