//! # Cardio RAG
//!
//! Persistent retrieval-augmented question answering over a corpus of PDF
//! documents.
//!
//! The indexing core (fingerprints, metadata record, chunk/embed pipeline,
//! coordinator, retrieval) lives in the runtime-free `cardio-rag-core`
//! crate. This crate supplies the concrete backends and the `cardio` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────────┐
//! │  FsSource   │──▶│  Pipeline   │──▶│ SqliteCollection│
//! │ PDF / text  │   │ Chunk+Embed │   │  vectors + text │
//! └─────────────┘   └─────────────┘   └───────┬───────┘
//!        ▲                                    │
//!        │          ┌──────────────┐          ▼
//!        └──────────│ Coordinator  │    ┌──────────┐
//!                   │ + JSON meta  │    │ search / │
//!                   └──────────────┘    │   ask    │
//!                                       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cardio reindex --all              # index every PDF under [corpus].root
//! cardio status                     # recorded files, entity count, drift
//! cardio search "beta blockers in HFrEF" -k 5
//! cardio ask "When is an ICD indicated?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite pool setup |
//! | [`sqlite_store`] | SQLite-backed vector collection |
//! | [`metadata_file`] | JSON metadata file with atomic replace |
//! | [`source`] | Filesystem document source |
//! | [`extract`] | PDF and plain-text page extraction |
//! | [`corpus`] | Corpus discovery for `reindex --all` |
//! | [`embedding`] | Embedding provider backends |
//! | [`http`] | Shared HTTP retry loop |
//! | [`answer`] | Answer generation over retrieved context |
//! | [`progress`] | Reindex progress on stderr |
//! | [`index_cmd`] | `status`, `add`, `reindex`, `clear` |
//! | [`search`] | `search` and `ask` |

pub mod answer;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod index_cmd;
pub mod metadata_file;
pub mod progress;
pub mod search;
pub mod source;
pub mod sqlite_store;
