//! Refresh scheduling
//!
//! Drives [`RefreshPipeline`](crate::crawler::pipeline::RefreshPipeline) runs
//! from a fixed interval and from manual requests.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tvbox_sync::config::Config;
//! use tvbox_sync::crawler::pipeline::PipelineBuilder;
//! use tvbox_sync::scheduler::{RefreshTrigger, TriggerConfig, TriggerEvent};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let pipeline = Arc::new(PipelineBuilder::from_config(&config)?.build()?);
//! let trigger = Arc::new(RefreshTrigger::new(TriggerConfig::from_config(&config)?, pipeline)?);
//!
//! let mut events = trigger.subscribe();
//! let looped = Arc::clone(&trigger);
//! tokio::spawn(async move { looped.start().await });
//!
//! while let Ok(event) = events.recv().await {
//!     if let TriggerEvent::RunCompleted { result, .. } = event {
//!         println!("generation {} published", result.generation);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use trigger::{RefreshTrigger, TriggerConfig, TriggerEvent, TriggerReason};
