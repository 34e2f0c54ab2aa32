//! tvbox-sync - live-stream channel catalog aggregator
//!
//! Pulls channel lists from several repositories, merges them into one
//! catalog, checks every stream on a bounded worker pool and repairs dead
//! channels with working alternates.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`parser`] - TVBox text and M3U list grammar
//! - [`crawler`] - Fetching, probing, checking, resolution and the run pipeline
//! - [`storage`] - Deduplication, catalog generations and persistence
//! - [`scheduler`] - Interval and manual run triggers
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Normalization helpers, retry and stage errors
//!
//! # Example
//!
//! ```no_run
//! use tvbox_sync::config::Config;
//! use tvbox_sync::crawler::PipelineBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let pipeline = PipelineBuilder::from_config(&config)?.build()?;
//!     let result = pipeline.run_once().await;
//!     println!("published generation {}", result.generation);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{PipelineBuilder, RefreshPipeline};
    pub use crate::error::{Error, ErrorCategory, Result, TvboxErrorTrait};
    pub use crate::models::{ChannelEntry, ChannelStatus, IdentityKey, RunResult};
    pub use crate::scheduler::{RefreshTrigger, TriggerConfig};
    pub use crate::storage::{Catalog, CatalogQuery, CatalogStore, FileCatalogStore};
}

// Direct re-exports for convenience
pub use models::{ChannelEntry, ChannelStatus, RunResult};
