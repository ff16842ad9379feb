use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::feed::parser::{parse_feed, FeedEntry, ParsedFeed};
use crate::storage::{Channel, Item};

const MAX_RETRIES: u32 = 3;
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB
const USER_AGENT: &str = concat!("tubefeed/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while retrieving a feed or channel page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Document could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Source of feed documents and channel pages.
///
/// [`HttpFeedSource`] is the production implementation; the sync engine only
/// sees this trait so runs can be driven from scripted sources.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and parse the feed document at `feed_url`.
    async fn fetch_feed(&self, feed_url: &str) -> Result<ParsedFeed, FetchError>;

    /// Fetch the HTML body of a channel's web page.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetch a channel's feed and map its entries to items owned by the channel.
///
/// Items keep feed order and start with `downloaded = false`.
pub async fn fetch_items(
    source: &dyn FeedSource,
    channel: &Channel,
) -> Result<Vec<Item>, FetchError> {
    let feed = source.fetch_feed(&channel.feed_url).await?;

    if feed.skipped > 0 {
        tracing::warn!(
            channel = %channel.id,
            skipped = feed.skipped,
            "Feed entries without link or timestamp skipped"
        );
    }

    Ok(feed_items(feed.entries, &channel.id))
}

/// Map parsed entries to items owned by `channel_id`, keeping feed order.
pub fn feed_items(entries: Vec<FeedEntry>, channel_id: &str) -> Vec<Item> {
    entries
        .into_iter()
        .map(|entry| Item {
            id: entry.id,
            url: entry.url,
            title: entry.title,
            published: entry.published,
            channel_id: channel_id.to_string(),
            downloaded: false,
        })
        .collect()
}

/// HTTP implementation of [`FeedSource`] built on a shared `reqwest::Client`.
///
/// - Each attempt (request and body) is bounded by the configured timeout
/// - 429 and 5xx responses are retried with exponential backoff, up to 3 times
/// - Other non-2xx statuses fail immediately
/// - Bodies are limited to 10MB
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    timeout: Duration,
    backoff: Duration,
}

impl HttpFeedSource {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, config.fetch_timeout()))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            backoff: Duration::from_secs(2),
        }
    }

    /// Base delay between retries; doubles on every attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let attempt = tokio::time::timeout(self.timeout, self.attempt(url))
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))?;

            match attempt {
                Ok(bytes) => return Ok(bytes),
                Err(e) if is_transient(&e) && retry_count < MAX_RETRIES => {
                    let delay = self.backoff * 2u32.pow(retry_count);
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        retry = retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Transient fetch error, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(FetchError::HttpStatus(429)) => return Err(FetchError::RateLimited(MAX_RETRIES)),
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        read_limited_bytes(response, MAX_BODY_SIZE).await
    }
}

fn is_transient(error: &FetchError) -> bool {
    matches!(error, FetchError::HttpStatus(status) if *status == 429 || *status >= 500)
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_feed(&self, feed_url: &str) -> Result<ParsedFeed, FetchError> {
        let bytes = self.get_bytes(feed_url).await?;
        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
