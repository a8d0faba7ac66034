//! Shared HTTP plumbing for the embedding and generation clients.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, warn};

pub fn client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a JSON request built by `build`, retrying transient failures, and
/// return the parsed response body.
///
/// `build` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`.
pub async fn send_json_with_retry<F>(
    service: &str,
    max_retries: u32,
    build: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(service, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, "transient API error");
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", service, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                warn!(service, error = %e, "request failed");
                last_err = Some(anyhow::anyhow!("{} request failed: {}", service, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}

/// Read a JSON array of numbers as an `f32` vector. Non-numeric entries are
/// an error rather than a silent zero.
pub fn parse_vector(value: &serde_json::Value, service: &str) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid {} response: embedding is not an array", service))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("Invalid {} response: non-numeric embedding value", service))
        })
        .collect()
}
