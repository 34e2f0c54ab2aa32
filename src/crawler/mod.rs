//! Network side of the refresh pipeline
//!
//! - [`fetcher`] retrieves repository list text (HTTP or local files)
//! - [`prober`] checks whether one stream URL is playable
//! - [`checker`] runs probes for every entry on a bounded worker pool
//! - [`resolver`] finds a working replacement when a primary URL fails
//! - [`pipeline`] ties the stages together into one run

pub mod checker;
pub mod fetcher;
pub mod headers;
pub mod pipeline;
pub mod prober;
pub mod resolver;

pub use checker::{CheckReport, CheckStats, TimedProber, ValidityChecker};
pub use fetcher::{HttpRepositoryFetcher, RepositoryFetcher, SourceFetcher};
pub use pipeline::{PipelineBuilder, RefreshPipeline};
pub use prober::{HttpStreamProber, ProbeFailure, ProbeOutcome, StreamProber};
pub use resolver::{AlternateSource, ReplacementResolver, RepositoryAlternateSource, Resolution};
