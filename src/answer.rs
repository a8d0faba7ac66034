//! Answer generation over retrieved chunks.
//!
//! Retrieved chunks are rendered into numbered context blocks and sent to the
//! configured generation provider (`gemini` or `openai`) through the shared
//! retry loop in [`crate::http`]. When retrieval found nothing the model is
//! not called.

use anyhow::{bail, Result};
use serde::Serialize;

use cardio_rag_core::models::ScoredChunk;

use crate::config::GenerationConfig;
use crate::embedding::{gemini_api_key, GEMINI_BASE_URL};
use crate::http;

pub const NO_CONTEXT_ANSWER: &str = "I couldn't find relevant information in the indexed \
documents to answer your question. Try rephrasing it, or check that the relevant PDFs have been \
indexed with `cardio reindex`.";

const INSTRUCTIONS: &str = "You are a knowledgeable cardiology assistant. Answer the question \
using the numbered context blocks taken from medical documents. If the context does not contain \
enough information, say so. Explain technical terms where helpful. Your answer is for educational \
purposes; recommend consulting a healthcare professional for medical advice.";

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
}

/// Render chunks as `Context i (Page p, Score s):` blocks separated by blank
/// lines.
pub fn format_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Context {} (Page {}, Score: {:.3}):\n{}\n",
                i + 1,
                hit.page_num,
                hit.score,
                hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "{}\n\nContext from documents:\n{}\nQuestion: {}\n",
        INSTRUCTIONS, context, question
    )
}

/// Generate an answer for `question` grounded in `hits`.
pub async fn answer(config: &GenerationConfig, question: &str, hits: Vec<ScoredChunk>) -> Result<Answer> {
    if hits.is_empty() {
        return Ok(Answer {
            question: question.to_string(),
            answer: NO_CONTEXT_ANSWER.to_string(),
            sources: hits,
        });
    }

    let prompt = build_prompt(question, &format_context(&hits));
    let text = match config.provider.as_str() {
        "gemini" => generate_gemini(config, &prompt).await?,
        "openai" => generate_openai(config, &prompt).await?,
        "disabled" => bail!("Answer generation is disabled; set [generation].provider in the config"),
        other => bail!("Unknown generation provider: {}", other),
    };

    Ok(Answer {
        question: question.to_string(),
        answer: text,
        sources: hits,
    })
}

async fn generate_gemini(config: &GenerationConfig, prompt: &str) -> Result<String> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| "gemini-1.5-flash".to_string());
    let model = model.trim_start_matches("models/");
    let api_key = gemini_api_key()?;
    let base = config.url.as_deref().unwrap_or(GEMINI_BASE_URL);
    let endpoint = format!(
        "{}/v1beta/models/{}:generateContent",
        base.trim_end_matches('/'),
        model
    );
    let body = serde_json::json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
    });
    let client = http::client(config.timeout_secs)?;

    let json = http::send_json_with_retry("Gemini", config.max_retries, || {
        client
            .post(&endpoint)
            .header("x-goog-api-key", &api_key)
            .json(&body)
    })
    .await?;
    parse_gemini_text(&json)
}

fn parse_gemini_text(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: no candidate content"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        bail!("Gemini returned an empty answer");
    }
    Ok(text)
}

async fn generate_openai(config: &GenerationConfig, prompt: &str) -> Result<String> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
    let base = config.url.as_deref().unwrap_or("https://api.openai.com");
    let endpoint = format!("{}/v1/chat/completions", base.trim_end_matches('/'));
    let body = serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
    });
    let client = http::client(config.timeout_secs)?;

    let json = http::send_json_with_retry("OpenAI", config.max_retries, || {
        client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
    })
    .await?;
    parse_openai_text(&json)
}

fn parse_openai_text(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: no message content"))
}
