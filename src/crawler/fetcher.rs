//! Repository fetcher with retry and GBK fallback decoding
//!
//! This module retrieves raw channel-list text from repositories:
//! - `http(s)://` locators over reqwest, retried with exponential backoff
//! - `file://` locators and bare paths read from disk
//! - bodies that are not valid UTF-8 decoded as GBK
//!
//! [`SourceFetcher`] fans out over every configured repository and collects
//! one result per locator, in configured order.

use async_trait::async_trait;
use encoding_rs::{GBK, UTF_8};
use futures::future::join_all;
use reqwest::{header::CONTENT_TYPE, Client};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::Config;
use crate::crawler::headers::build_list_headers;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Retrieves the raw text of one repository
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Fetch the full list body for `locator`
    async fn fetch_repository(&self, locator: &str) -> Result<String, FetchError>;
}

/// Where a repository lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Remote(String),
    Local(PathBuf),
}

impl Locator {
    /// Classify a configured locator string
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidLocator` for unsupported schemes and
    /// malformed `file://` URLs.
    pub fn parse(locator: &str) -> Result<Self, FetchError> {
        let trimmed = locator.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Remote(trimmed.to_string()));
        }

        if lower.starts_with("file://") {
            return Url::parse(trimmed)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .map(Self::Local)
                .ok_or_else(|| FetchError::InvalidLocator(trimmed.to_string()));
        }

        if trimmed.is_empty() || trimmed.contains("://") {
            return Err(FetchError::InvalidLocator(trimmed.to_string()));
        }

        Ok(Self::Local(PathBuf::from(trimmed)))
    }
}

/// reqwest-backed fetcher for remote and local repositories
pub struct HttpRepositoryFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Retry policy for recoverable failures
    retry: RetryConfig,

    /// Fixed User-Agent; rotated when `None`
    user_agent: Option<String>,
}

impl HttpRepositoryFetcher {
    /// Create a fetcher
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(
        request_timeout: Duration,
        retry: RetryConfig,
        user_agent: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            retry,
            user_agent,
        })
    }

    /// Create a fetcher from the `[sources]` section
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(
            config.fetch_timeout(),
            config.retry_config(),
            config.sources.user_agent.clone(),
        )
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, FetchError> {
        with_retry_if(&self.retry, || self.fetch_once(url), FetchError::is_recoverable).await
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(build_list_headers(self.user_agent.as_deref()))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response.bytes().await?;
        decode_bytes(&bytes, &content_type)
    }

    async fn read_local(&self, path: &PathBuf) -> Result<String, FetchError> {
        let bytes = tokio::fs::read(path).await?;
        decode_bytes(&bytes, "")
    }
}

#[async_trait]
impl RepositoryFetcher for HttpRepositoryFetcher {
    async fn fetch_repository(&self, locator: &str) -> Result<String, FetchError> {
        match Locator::parse(locator)? {
            Locator::Remote(url) => self.fetch_remote(&url).await,
            Locator::Local(path) => self.read_local(&path).await,
        }
    }
}

/// Decode a list body as UTF-8, falling back to GBK
///
/// An explicit GBK-family charset in `content_type` skips the UTF-8 attempt.
///
/// # Errors
///
/// Returns `FetchError::Decode` if neither encoding decodes cleanly
pub fn decode_bytes(bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
    let content_type = content_type.to_ascii_lowercase();
    let declared_gbk = ["charset=gbk", "charset=gb2312", "charset=gb18030"]
        .iter()
        .any(|c| content_type.contains(c));

    if !declared_gbk {
        let (text, _, had_errors) = UTF_8.decode(bytes);
        if !had_errors {
            return Ok(text.into_owned());
        }
    }

    let (text, _, had_errors) = GBK.decode(bytes);
    if had_errors {
        return Err(FetchError::Decode(
            "Failed to decode content with UTF-8 or GBK".to_string(),
        ));
    }

    Ok(text.into_owned())
}

// ============================================================================
// Fan-out over repositories
// ============================================================================

/// Outcome of one repository retrieval
#[derive(Debug)]
pub struct RepositoryFetch {
    pub locator: String,
    pub result: Result<String, FetchError>,
    pub elapsed: Duration,
}

impl RepositoryFetch {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fetches every repository in parallel under a per-retrieval timeout
#[derive(Clone)]
pub struct SourceFetcher {
    fetcher: Arc<dyn RepositoryFetcher>,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(fetcher: Arc<dyn RepositoryFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Fetch one repository, mapping an elapsed timeout to `FetchError::Timeout`
    pub async fn fetch_one(&self, locator: &str) -> RepositoryFetch {
        let started = Instant::now();
        let result =
            match tokio::time::timeout(self.timeout, self.fetcher.fetch_repository(locator)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout),
            };

        match &result {
            Ok(text) => tracing::debug!(
                repository = %locator,
                bytes = text.len(),
                "Fetched repository"
            ),
            Err(e) => tracing::warn!(repository = %locator, error = %e, "Repository fetch failed"),
        }

        RepositoryFetch {
            locator: locator.to_string(),
            result,
            elapsed: started.elapsed(),
        }
    }

    /// Fetch all repositories; results keep the order of `locators`
    pub async fn fetch_all(&self, locators: &[String]) -> Vec<RepositoryFetch> {
        join_all(locators.iter().map(|locator| self.fetch_one(locator))).await
    }
}
