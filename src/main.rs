//! # Cardio RAG CLI (`cardio`)
//!
//! The `cardio` binary maintains the persistent index over a PDF corpus and
//! answers questions against it.
//!
//! ## Usage
//!
//! ```bash
//! cardio --config ./config/cardio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cardio status` | Recorded files, live entity count, drift |
//! | `cardio add <file>` | Index one file if new or changed |
//! | `cardio reindex <file>...` | Reindex the named files |
//! | `cardio reindex --all` | Reindex the corpus plus every recorded file |
//! | `cardio clear --yes` | Drop the collection and the metadata record |
//! | `cardio search "<query>"` | Top-k chunks for a query |
//! | `cardio ask "<question>"` | Answer a question from retrieved chunks |
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cardio_rag::config;
use cardio_rag::index_cmd;
use cardio_rag::progress::ProgressMode;
use cardio_rag::search;

/// Cardio RAG: persistent PDF indexing and retrieval-augmented answers.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cardio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cardio",
    about = "Persistent PDF indexing and retrieval-augmented question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cardio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recorded files, the live entity count, and any drift.
    Status {
        /// Print the status as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Index a single file if it is new or has changed since the last run.
    Add { file: PathBuf },

    /// Reindex files.
    ///
    /// Unchanged files are skipped unless `--force`. With `--all`, every
    /// file under `[corpus].root` plus every recorded file is considered,
    /// and recorded files whose source has disappeared are dropped.
    Reindex {
        files: Vec<PathBuf>,

        #[arg(long)]
        all: bool,

        #[arg(long)]
        force: bool,

        /// Progress on stderr: human, json, or off. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Drop the vector collection and empty the metadata record.
    Clear {
        /// Confirm the destructive operation.
        #[arg(long)]
        yes: bool,
    },

    /// Search indexed chunks by semantic similarity.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// Restrict results to one source file.
        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the top-k retrieved chunks.
    Ask {
        question: String,

        #[arg(short = 'k', long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init()
        .ok();

    let cli = Cli::parse();

    // Refuse before touching the config or the store.
    if let Commands::Clear { yes: false } = &cli.command {
        anyhow::bail!("Refusing to clear the index without --yes");
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Status { json } => {
            index_cmd::run_status(&cfg, json).await?;
        }
        Commands::Add { file } => {
            index_cmd::run_add(&cfg, file).await?;
        }
        Commands::Reindex {
            files,
            all,
            force,
            progress,
        } => {
            let mode = match progress {
                Some(p) => ProgressMode::parse(&p)?,
                None => ProgressMode::default_for_tty(),
            };
            index_cmd::run_reindex(&cfg, files, all, force, mode).await?;
        }
        Commands::Clear { yes } => {
            index_cmd::run_clear(&cfg, yes).await?;
        }
        Commands::Search {
            query,
            k,
            source,
            json,
        } => {
            search::run_search(&cfg, &query, k, source, json).await?;
        }
        Commands::Ask { question, k } => {
            search::run_ask(&cfg, &question, k).await?;
        }
    }

    Ok(())
}
