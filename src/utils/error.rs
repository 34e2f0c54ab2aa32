//! Error types for the refresh pipeline
//!
//! This module defines the per-stage error types. None of them abort a run on
//! their own; only [`RunAbort`] discards a run's output.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while retrieving a repository's raw list text
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Retrieval exceeded its timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded (last error: {0})")]
    MaxRetriesExceeded(String),

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Locator is neither a URL nor a readable path
    #[error("Invalid repository locator: {0}")]
    InvalidLocator(String),

    /// Local repository could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether another attempt might succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status(code) => matches!(code, 408 | 429 | 500 | 502 | 503 | 504),
            Self::Timeout => true,
            Self::MaxRetriesExceeded(_)
            | Self::Decode(_)
            | Self::InvalidLocator(_)
            | Self::Io(_) => false,
        }
    }
}

/// Reasons a list line is dropped by the parser
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Data line without a channel name
    #[error("line {line}: missing channel name")]
    MissingName { line: usize },

    /// URL that cannot be parsed or has no host
    #[error("line {line}: invalid URL '{url}'")]
    InvalidUrl { line: usize, url: String },

    /// URL with a scheme that cannot carry a live stream
    #[error("line {line}: unsupported scheme '{scheme}'")]
    UnsupportedScheme { line: usize, scheme: String },

    /// M3U URL line that does not follow an `#EXTINF` line
    #[error("line {line}: stream URL without preceding #EXTINF")]
    OrphanUrl { line: usize },
}

impl ParseError {
    /// Line number (1-based) the error refers to
    pub fn line(&self) -> usize {
        match self {
            Self::MissingName { line }
            | Self::InvalidUrl { line, .. }
            | Self::UnsupportedScheme { line, .. }
            | Self::OrphanUrl { line } => *line,
        }
    }
}

/// Errors raised by the persistence collaborator
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem error
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Catalog (de)serialization failed
    #[error("Catalog serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// No persisted catalog was found
    #[error("No persisted catalog at {0}")]
    NoCatalog(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Conditions that discard a whole run and keep the previous generation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunAbort {
    /// No repositories are configured
    #[error("no repositories configured")]
    NoRepositories,

    /// Every configured repository failed to fetch
    #[error("all {failed} repositories failed to fetch")]
    AllRepositoriesFailed { failed: usize },

    /// The run exceeded the run-level timeout
    #[error("run exceeded timeout of {}s", limit.as_secs())]
    Timeout { limit: Duration },
}
