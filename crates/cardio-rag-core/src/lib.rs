//! # cardio-rag core
//!
//! Runtime-free logic for the persistent document index: data model,
//! error taxonomy, content fingerprints, chunking, the embedding and
//! vector-collection traits, the metadata store, the index coordinator,
//! and the retrieval engine.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Everything that
//! touches the outside world is reached through a trait so the coordinator
//! can be driven against in-memory substitutes:
//!
//! | Seam | Trait | In-crate implementation |
//! |------|-------|-------------------------|
//! | source files | [`source::DocumentSource`] | none (the filesystem source lives in the app crate) |
//! | durable index record | [`metadata::MetadataStore`] | [`metadata::memory::InMemoryMetadataStore`] |
//! | vector collection | [`store::VectorCollection`] | [`store::memory::InMemoryCollection`] |
//! | chunk + embed | [`pipeline::ChunkEmbedPipeline`] | [`pipeline::EmbeddingPipeline`] |

pub mod chunk;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod source;
pub mod store;

pub use error::IndexError;
