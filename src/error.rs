//! Unified error handling for the tvbox-sync crate
//!
//! Each stage keeps its own error type (see [`crate::utils::error`] and
//! [`crate::scheduler::error`]). This module folds them into one [`Error`]
//! for callers that cross module boundaries.
//!
//! # Architecture
//!
//! - [`TvboxErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust
//! use tvbox_sync::error::{Error, ErrorCategory, TvboxErrorTrait};
//! use tvbox_sync::utils::error::FetchError;
//!
//! let err: Error = FetchError::Timeout.into();
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), ErrorCategory::Network);
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{FetchError, ParseError, RunAbort, StorageError};

/// Common trait for tvbox-sync error types
pub trait TvboxErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Parsing and decoding errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Scheduler and run-level errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        })
    }
}

/// Unified error type for the tvbox-sync crate
#[derive(Error, Debug)]
pub enum Error {
    /// Repository retrieval errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Malformed list lines
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A run was discarded
    #[error("Run aborted: {0}")]
    RunAbort(#[from] RunAbort),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TvboxErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            // The line is skipped and the run goes on
            Self::Parse(_) => true,
            Self::Storage(e) => !matches!(e, StorageError::Json(_)),
            // The previous generation stays; the next run may succeed
            Self::RunAbort(_) => true,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) | Self::Toml(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) | Self::Http(_) => ErrorCategory::Network,
            Self::Parse(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::RunAbort(_) | Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Toml(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
