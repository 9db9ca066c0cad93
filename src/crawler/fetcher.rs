//! HTTP page fetcher
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building a pooled HTTP client from configuration
//! - Expanding the page URL template
//! - Bounding concurrent connections with an acquire timeout
//! - Classifying failures as transient or permanent
//! - Wrapping single fetches in the retry policy

use crate::config::{Config, EndpointConfig, HttpConfig, PAGE_PLACEHOLDER};
use crate::crawler::retry::{retry_with_backoff, RetryError, RetryPolicy, Retryable};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Errors from fetching one page
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection faults, HTTP 429 and 5xx
    #[error("Transient failure fetching {url}: {reason}")]
    Retryable { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Rejected { url: String, status: u16 },

    #[error("Invalid request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("Fetch of page {page} interrupted")]
    Interrupted { page: u32 },

    #[error("Page {page} failed after {attempts} attempt(s): {source}")]
    Failed {
        page: u32,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Retryable { .. })
    }
}

/// Anything that can return the raw body of a listing page
#[async_trait]
pub trait PageSource: Send + Sync {
    /// One attempt at fetching page `page` (1-based)
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `endpoint` - Supplies the user agent
/// * `http` - Timeouts and idle pool sizing
///
/// The client only caps idle connections; the number in use is bounded
/// by the connection slots of [`HttpPageFetcher`].
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(endpoint: &EndpointConfig, http: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(endpoint.user_agent.as_str())
        .connect_timeout(http.connect_timeout())
        .timeout(http.response_timeout())
        .pool_max_idle_per_host(http.max_idle_per_host as usize)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Expands the URL template for `page`, with pipes in the query encoded
pub fn page_url(url_template: &str, page: u32) -> String {
    encode_query_pipes(&url_template.replace(PAGE_PLACEHOLDER, &page.to_string()))
}

/// Percent-encodes `|` in the query string
///
/// The upstream rejects raw pipes, and the URL parser leaves them alone.
/// The path and anything before `?` are untouched.
pub fn encode_query_pipes(url: &str) -> String {
    match url.split_once('?') {
        Some((base, query)) if query.contains('|') => {
            format!("{}?{}", base, query.replace('|', "%7C"))
        }
        _ => url.to_string(),
    }
}

/// Fetches listing pages over HTTP
pub struct HttpPageFetcher {
    client: Client,
    url_template: String,
    connection_slots: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(client: Client, url_template: impl Into<String>, max_connections: usize, acquire_timeout: Duration) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            connection_slots: Arc::new(Semaphore::new(max_connections.max(1))),
            acquire_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.endpoint, &config.http)?;
        Ok(Self::new(
            client,
            config.endpoint.url_template.clone(),
            config.http.max_connections as usize,
            config.http.pool_acquire_timeout(),
        ))
    }
}

#[async_trait]
impl PageSource for HttpPageFetcher {
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        let url = page_url(&self.url_template, page);

        let _slot = match tokio::time::timeout(self.acquire_timeout, self.connection_slots.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(FetchError::Retryable {
                    url,
                    reason: "connection pool closed".to_string(),
                })
            }
            Err(_) => {
                return Err(FetchError::Retryable {
                    url,
                    reason: format!("no connection available within {:?}", self.acquire_timeout),
                })
            }
        };

        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_error(&url, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Retryable {
                url,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Rejected {
                url,
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify_error(&url, e))
    }
}

/// Classifies a transport error
fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_builder() {
        return FetchError::InvalidRequest {
            url: url.to_string(),
            reason: error.to_string(),
        };
    }

    let reason = if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    FetchError::Retryable {
        url: url.to_string(),
        reason,
    }
}

/// Fetches a page with bounded retries
///
/// Cancellation of `cancel` ends any pending backoff and yields
/// [`FetchError::Interrupted`]; exhausted or permanent failures yield
/// [`FetchError::Failed`] wrapping the last error.
pub async fn fetch_with_retry(
    source: &dyn PageSource,
    page: u32,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, FetchError> {
    let label = format!("page {}", page);

    match retry_with_backoff(policy, cancel, &label, move |_| source.fetch_page(page)).await {
        Ok(body) => Ok(body),
        Err(RetryError::Interrupted { .. }) => Err(FetchError::Interrupted { page }),
        Err(RetryError::Exhausted { attempts, last } | RetryError::Aborted { attempts, error: last }) => {
            Err(FetchError::Failed {
                page,
                attempts,
                source: Box::new(last),
            })
        }
    }
}
