//! Query commands: `search` and `ask`.
//!
//! Both embed the query with the configured provider (query task type),
//! retrieve the top-`k` chunks from the collection, and print them. `ask`
//! additionally sends the chunks to the generation provider.

use anyhow::{bail, Result};
use std::path::PathBuf;

use cardio_rag_core::embedding::embed_query;
use cardio_rag_core::models::ScoredChunk;

use crate::answer;
use crate::config::Config;
use crate::index_cmd::{open_coordinator, Coordinator};

const SNIPPET_CHARS: usize = 240;

async fn retrieve(
    coordinator: &Coordinator,
    query: &str,
    k: usize,
    source: Option<&PathBuf>,
) -> Result<Vec<ScoredChunk>> {
    let provider = coordinator.pipeline().provider();
    let vector = embed_query(&**provider, query).await?;
    Ok(coordinator
        .retrieve(&vector, k, source.map(|p| p.as_path()))
        .await?)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    source: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let k = k.unwrap_or(config.retrieval.top_k);
    let coordinator = open_coordinator(config).await?;
    let hits = retrieve(&coordinator, query, k, source.as_ref()).await;
    coordinator.collection().pool().close().await;
    let hits = hits?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[ScoredChunk]) {
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {} (page {})", i + 1, hit.score, hit.source, hit.page_num);
        println!("    excerpt: \"{}\"", snippet(&hit.text));
        println!("    chunk: {}  id: {}", hit.chunk_index, hit.id);
        println!();
    }
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub async fn run_ask(config: &Config, question: &str, k: Option<usize>) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question must not be empty");
    }
    if !config.embedding.is_enabled() {
        bail!("Ask requires embeddings. Set [embedding] provider in config.");
    }

    let k = k.unwrap_or(config.retrieval.top_k);
    let coordinator = open_coordinator(config).await?;
    let hits = retrieve(&coordinator, question, k, None).await;
    coordinator.collection().pool().close().await;
    let hits = hits?;

    let result = answer::answer(&config.generation, question, hits).await?;
    println!("{}", result.answer.trim());
    if !result.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, s) in result.sources.iter().enumerate() {
            println!("  {}. {} (page {}, score {:.3})", i + 1, s.source, s.page_num, s.score);
        }
    }
    Ok(())
}
