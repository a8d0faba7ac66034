use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cardio_rag_core::chunk::ChunkingParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub corpus: Option<CorpusConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Upper bound for every vector store call.
    #[serde(default = "default_db_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_db_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    /// Upper bound for reading a source file or the metadata file.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            metadata_path: default_metadata_path(),
            collection_name: default_collection_name(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/index_metadata.json")
}
fn default_collection_name() -> String {
    "cardiology_rag".to_string()
}
fn default_io_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_chars: default_min_chunk_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            min_chunk_chars: self.min_chunk_chars,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_min_chunk_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override (Ollama, or an OpenAI/Gemini-compatible proxy).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Dimensionality of the collection schema.
    pub fn collection_dims(&self) -> usize {
        self.dims.unwrap_or(768)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}

impl Config {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.index.io_timeout_secs)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db.timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.index.collection_name.trim().is_empty() {
        anyhow::bail!("index.collection_name must not be empty");
    }
    if config.db.timeout_secs == 0 || config.index.io_timeout_secs == 0 {
        anyhow::bail!("db.timeout_secs and index.io_timeout_secs must be > 0");
    }

    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" | "gemini" => {
            if config.embedding.dims.is_none() {
                anyhow::bail!(
                    "embedding.dims must be set when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, gemini, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or gemini.",
            other
        ),
    }

    Ok(())
}
