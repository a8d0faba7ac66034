//! Embedding provider implementations.
//!
//! Concrete backends for the core [`EmbeddingProvider`] trait:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`GeminiProvider`]**: calls the Gemini `batchEmbedContents` endpoint with
//!   document/query task types.
//! - **`LocalProvider`**: runs models locally via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! HTTP providers share the retry loop in [`crate::http`]. A failed call is
//! always an error; no provider ever substitutes placeholder vectors.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use cardio_rag::config::EmbeddingConfig;
//! # use cardio_rag::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use cardio_rag_core::embedding::{EmbedKind, EmbeddingProvider};

use crate::config::EmbeddingConfig;
use crate::http::{self, parse_vector};

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Reports the configured collection dimensionality so status and clear
/// still work without an embedding backend.
pub struct DisabledProvider {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, _texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled; set [embedding].provider in the config")
    }
}

fn required_model(config: &EmbeddingConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))
}

fn required_dims(config: &EmbeddingConfig, provider: &str) -> Result<usize> {
    config
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", provider))
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    url: String,
    max_retries: u32,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = required_model(config, "OpenAI")?;
        let dims = required_dims(config, "OpenAI")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            model,
            dims,
            api_key,
            url,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/v1/embeddings", self.url.trim_end_matches('/'));
        let json = http::send_json_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance (`POST /api/embed`,
/// default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "Ollama")?,
            dims: required_dims(config, "Ollama")?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let json = http::send_json_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|e| parse_vector(e, "Ollama"))
        .collect()
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini API (`models/{model}:batchEmbedContents`).
///
/// Reads the key from `API_KEY_GEMINI`, falling back to `GEMINI_API_KEY`.
/// Documents are embedded with task type `RETRIEVAL_DOCUMENT` and queries
/// with `RETRIEVAL_QUERY`.
pub struct GeminiProvider {
    model: String,
    dims: usize,
    api_key: String,
    url: String,
    max_retries: u32,
    client: Client,
}

pub(crate) fn gemini_api_key() -> Result<String> {
    std::env::var("API_KEY_GEMINI")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .map_err(|_| anyhow::anyhow!("API_KEY_GEMINI (or GEMINI_API_KEY) environment variable not set"))
}

pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = required_model(config, "Gemini")?;
        Ok(Self {
            model: model.trim_start_matches("models/").to_string(),
            dims: required_dims(config, "Gemini")?,
            api_key: gemini_api_key()?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

fn gemini_task_type(kind: EmbedKind) -> &'static str {
    match kind {
        EmbedKind::Document => "RETRIEVAL_DOCUMENT",
        EmbedKind::Query => "RETRIEVAL_QUERY",
    }
}

fn gemini_request_body(model: &str, texts: &[String], kind: EmbedKind) -> serde_json::Value {
    let requests: Vec<serde_json::Value> = texts
        .iter()
        .map(|t| {
            serde_json::json!({
                "model": format!("models/{}", model),
                "content": { "parts": [{ "text": t }] },
                "taskType": gemini_task_type(kind),
            })
        })
        .collect();
    serde_json::json!({ "requests": requests })
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let body = gemini_request_body(&self.model, texts, kind);
        let endpoint = format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.url.trim_end_matches('/'),
            self.model
        );
        let json = http::send_json_with_retry("Gemini", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?
        .iter()
        .map(|e| {
            let values = e
                .get("values")
                .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
            parse_vector(values, "Gemini")
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// Local models: config name, fastembed model, output dims.
#[cfg(feature = "local-embeddings-fastembed")]
const LOCAL_MODELS: &[(&str, fastembed::EmbeddingModel, usize)] = &[
    ("all-minilm-l6-v2", fastembed::EmbeddingModel::AllMiniLML6V2, 384),
    ("bge-small-en-v1.5", fastembed::EmbeddingModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", fastembed::EmbeddingModel::BGEBaseENV15, 768),
    ("bge-large-en-v1.5", fastembed::EmbeddingModel::BGELargeENV15, 1024),
    ("nomic-embed-text-v1.5", fastembed::EmbeddingModel::NomicEmbedTextV15, 768),
    ("multilingual-e5-small", fastembed::EmbeddingModel::MultilingualE5Small, 384),
    ("multilingual-e5-base", fastembed::EmbeddingModel::MultilingualE5Base, 768),
    ("multilingual-e5-large", fastembed::EmbeddingModel::MultilingualE5Large, 1024),
];

#[cfg(feature = "local-embeddings-fastembed")]
fn local_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    LOCAL_MODELS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, model, dims)| (model.clone(), *dims))
        .ok_or_else(|| {
            let known: Vec<&str> = LOCAL_MODELS.iter().map(|(n, _, _)| *n).collect();
            anyhow::anyhow!(
                "Unknown local embedding model '{}'. Supported: {}",
                name,
                known.join(", ")
            )
        })
}

/// Embedding provider for local inference via fastembed.
///
/// The model is downloaded from Hugging Face on first use, then loaded once
/// and kept behind a mutex for later batches.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-base-en-v1.5".to_string());
        let (model, native_dims) = local_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            dims: config.dims.unwrap_or(native_dims),
            batch_size: config.batch_size,
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let loaded = Arc::clone(&self.loaded);

        tokio::task::spawn_blocking(move || {
            let mut slot = loaded
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if slot.is_none() {
                let engine = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to load local embedding model: {}", e))?;
                *slot = Some(engine);
            }
            slot.as_mut()
                .ok_or_else(|| anyhow::anyhow!("local embedding model unavailable"))?
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"local"` | `LocalProvider` (requires `local-embeddings-fastembed`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider {
            dims: config.collection_dims(),
        })),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn disabled_provider_refuses() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.dims(), 768);
        assert!(provider
            .embed_texts(&["x".to_string()], EmbedKind::Query)
            .await
            .is_err());
    }

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let v = parse_openai_response(&json).unwrap();
        assert_eq!(v, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn ollama_response() {
        let v = parse_ollama_response(&json!({"embeddings": [[0.25, 0.5]]})).unwrap();
        assert_eq!(v, vec![vec![0.25, 0.5]]);
        assert!(parse_ollama_response(&json!({})).is_err());
    }

    #[test]
    fn gemini_request_uses_task_type() {
        let body = gemini_request_body(
            "text-embedding-004",
            &["chest pain".to_string()],
            EmbedKind::Query,
        );
        let req = &body["requests"][0];
        assert_eq!(req["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(req["model"], "models/text-embedding-004");
        assert_eq!(req["content"]["parts"][0]["text"], "chest pain");
        assert_eq!(gemini_task_type(EmbedKind::Document), "RETRIEVAL_DOCUMENT");
    }

    #[test]
    fn gemini_response() {
        let json = json!({"embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]});
        let v = parse_gemini_response(&json).unwrap();
        assert_eq!(v.len(), 2);
        assert!(parse_gemini_response(&json!({"embeddings": [{}]})).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "cohere".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
