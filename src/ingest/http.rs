// src/ingest/http.rs
//! Shared upstream HTTP client: bounded timeout per attempt and at most
//! `max_retries` extra attempts with exponential backoff, for network
//! failures and 5xx/429 only.

use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::{UpstreamConfig, MAX_RETRY_BACKOFF_MS, MAX_UPSTREAM_RETRIES};
use crate::error::{PipelineError, PipelineResult};

pub const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const CURL_UA: &str = "curl/7.68.0";

/// Status + body of a completed exchange. Network failures never get here.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff: Duration,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(timeout)
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            timeout,
            max_retries: 1,
            backoff: Duration::from_millis(250),
        }
    }

    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self::new(cfg.timeout())
            .with_retries(cfg.max_retries)
            .with_backoff(Duration::from_millis(cfg.retry_backoff_ms))
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.min(MAX_UPSTREAM_RETRIES);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff.min(Duration::from_millis(MAX_RETRY_BACKOFF_MS));
        self
    }

    /// GET `url` with query pairs. Returns any non-5xx response as-is so
    /// adapters can map 404 and friends to their own kinds.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        user_agent: &str,
    ) -> PipelineResult<UpstreamResponse> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .get(url)
                .query(query)
                .header(reqwest::header::USER_AGENT, user_agent)
                .timeout(self.timeout)
                .send()
                .await;

            let outcome = match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        Err(PipelineError::UpstreamUnavailable(format!(
                            "{url} answered {status}"
                        )))
                    } else {
                        match rsp.text().await {
                            Ok(body) => Ok(UpstreamResponse { status, body }),
                            Err(e) => Err(PipelineError::UpstreamUnavailable(format!(
                                "reading body from {url}: {e}"
                            ))),
                        }
                    }
                }
                Err(e) => Err(PipelineError::UpstreamUnavailable(describe(url, &e))),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    tracing::warn!(target: "ingest", %url, attempt, error = %e, "retrying upstream call");
                    let factor = 1u32.checked_shl(u32::from(attempt - 1)).unwrap_or(u32::MAX);
                    tokio::time::sleep(self.backoff.saturating_mul(factor)).await;
                    continue;
                }
                other => return other,
            }
        }
    }
}

fn describe(url: &str, e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out calling {url}")
    } else if e.is_connect() {
        format!("cannot connect to {url}")
    } else {
        format!("request to {url} failed: {e}")
    }
}
