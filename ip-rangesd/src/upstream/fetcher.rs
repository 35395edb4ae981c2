//! Outbound retrieval of the upstream ip-ranges document

use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use shared::types::Dataset;
use thiserror::Error;
use crate::config::UpstreamConfig;
use crate::upstream::document::parse_dataset;

/// Upper bound on the backoff exponent so delays stay sane
const MAX_BACKOFF_SHIFT: u32 = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Upstream returned status {status}")]
    Status { status: u16 },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Upstream request failed: {0}")]
    Transport(String),
}

impl FetchError {
    /// Transport failures, timeouts and 5xx are worth another attempt; 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status } => *status >= 500,
            FetchError::Timeout | FetchError::Transport(_) => true,
            FetchError::Client(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// A fetched document: the body as received plus its decoded dataset
#[derive(Debug, Clone)]
pub struct Document {
    pub body: Bytes,
    pub dataset: Dataset,
}

/// Source of the raw upstream document.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Canonical URL of the document; also the cache key
    fn source_url(&self) -> &str;

    async fn fetch_raw(&self) -> Result<Bytes, FetchError>;

    async fn fetch(&self) -> Result<Document, FetchError> {
        let body = self.fetch_raw().await?;
        let dataset = parse_dataset(&body);
        Ok(Document { body, dataset })
    }
}

/// HTTP fetcher for the published feed
pub struct Fetcher {
    client: Client,
    url: String,
    retries: u32,
    retry_backoff: Duration,
}

impl Fetcher {
    pub fn new(url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            retries: 0,
            retry_backoff: Duration::ZERO,
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, FetchError> {
        Ok(Self::new(&config.url, &config.user_agent, config.timeout())?
            .with_retries(config.retries, config.retry_backoff()))
    }

    /// Retry retryable failures up to `retries` extra times
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.retry_backoff = backoff;
        self
    }

    async fn fetch_once(&self) -> Result<Bytes, FetchError> {
        tracing::debug!("Fetching {}", self.url);

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            tracing::warn!("GET {} failed: {}", self.url, e);
            FetchError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Upstream returned {} for {}", status, self.url);
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let body = response.bytes().await?;
        tracing::info!("Fetched {} bytes from {}", body.len(), self.url);
        Ok(body)
    }

    /// Exponential backoff with up to one extra base interval of jitter
    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.retry_backoff.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(MAX_BACKOFF_SHIFT));
        let jitter = if base > 0 { fastrand::u64(0..=base) } else { 0 };
        Duration::from_millis(exp.saturating_add(jitter))
    }
}

#[async_trait]
impl Upstream for Fetcher {
    fn source_url(&self) -> &str {
        &self.url
    }

    async fn fetch_raw(&self) -> Result<Bytes, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once().await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.retries && e.is_retryable() => {
                    let delay = self.backoff_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Retrying upstream fetch ({}/{}) in {:?}: {}",
                        attempt,
                        self.retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
