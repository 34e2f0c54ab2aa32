//! Refresh pipeline
//!
//! One run goes through every stage and publishes a new catalog generation:
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌───────┐   ┌──────────────┐   ┌─────────┐   ┌─────────┐
//! │ Fetcher │──▶│ Parser │──▶│ Dedup │──▶│ Check+Resolve│──▶│ Replace │──▶│ Persist │
//! └─────────┘   └────────┘   └───────┘   └──────────────┘   └─────────┘   └─────────┘
//!  fan-out,       sync         sync        bounded pool        atomic       best effort
//!  join_all
//! ```
//!
//! Everything up to and including the check is covered by the run-level
//! timeout. A run that times out or gets nothing from any repository is
//! discarded and the previous generation stays published.
//!
//! # Example
//!
//! ```no_run
//! use tvbox_sync::config::Config;
//! use tvbox_sync::crawler::pipeline::PipelineBuilder;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let pipeline = PipelineBuilder::from_config(&config)?.build()?;
//!
//! let result = pipeline.run_once().await;
//! println!("{} entries, {} dead", result.updated_count, result.dead_count);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::crawler::checker::{CheckReport, TimedProber, ValidityChecker};
use crate::crawler::fetcher::{HttpRepositoryFetcher, RepositoryFetcher, SourceFetcher};
use crate::crawler::prober::{HttpStreamProber, StreamProber};
use crate::crawler::resolver::{RepositoryAlternateSource, ReplacementResolver};
use crate::metrics;
use crate::models::{ChannelStatus, ProvisionalEntry, RunResult};
use crate::parser::parse_repository;
use crate::storage::catalog::{Catalog, CatalogStore};
use crate::storage::dedup::Deduplicator;
use crate::storage::{CatalogPersister, NullPersister};
use crate::utils::error::RunAbort;

// ============================================================================
// Run staging
// ============================================================================

/// Output of the stages covered by the run timeout
struct StagedRun {
    report: CheckReport,
    failed_repositories: Vec<String>,
}

/// A discarded run
struct AbortedRun {
    reason: RunAbort,
    failed_repositories: Vec<String>,
}

impl From<RunAbort> for AbortedRun {
    fn from(reason: RunAbort) -> Self {
        Self {
            reason,
            failed_repositories: Vec::new(),
        }
    }
}

// ============================================================================
// Refresh Pipeline
// ============================================================================

/// Fetch, dedup, check and publish, one generation per run
pub struct RefreshPipeline {
    store: Arc<CatalogStore>,
    fetcher: SourceFetcher,
    checker: ValidityChecker,
    dedup: Deduplicator,
    repositories: Vec<String>,
    supplementary: Vec<String>,
    persister: Arc<dyn CatalogPersister>,
    run_timeout: Duration,
    run_lock: Mutex<()>,
}

impl RefreshPipeline {
    /// Store the pipeline publishes into
    pub fn store(&self) -> Arc<CatalogStore> {
        Arc::clone(&self.store)
    }

    /// Current published generation
    pub async fn snapshot(&self) -> Arc<Catalog> {
        self.store.snapshot().await
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Run every stage once
    ///
    /// Concurrent callers are serialized; a second caller waits for the
    /// running run to finish and then starts its own.
    pub async fn run_once(&self) -> RunResult {
        let _guard = self.run_lock.lock().await;
        let started_at = Utc::now();
        let clock = Instant::now();
        let previous = self.store.snapshot().await;

        tracing::info!(
            generation = previous.generation(),
            repositories = self.repositories.len(),
            "Starting refresh run"
        );

        let staged = match tokio::time::timeout(self.run_timeout, self.stage(&previous)).await {
            Ok(staged) => staged,
            Err(_) => Err(AbortedRun::from(RunAbort::Timeout {
                limit: self.run_timeout,
            })),
        };

        let mut result = RunResult {
            generation: previous.generation(),
            repository_count: self.repositories.len(),
            started_at,
            ..Default::default()
        };

        match staged {
            Ok(StagedRun {
                report,
                failed_repositories,
            }) => {
                let catalog = Catalog::new(previous.generation() + 1, report.entries);

                result.generation = catalog.generation();
                result.updated_count = catalog.len();
                result.live_count = catalog.count_status(ChannelStatus::Live);
                result.dead_count = catalog.count_status(ChannelStatus::Dead);
                result.unchecked_count = catalog.count_status(ChannelStatus::Unchecked);
                result.url_count = catalog.entries().iter().map(|e| e.urls.len()).sum();
                result.resolved_count = report.stats.resolved;
                result.failed_repositories = failed_repositories;

                self.store.replace(catalog).await;

                let current = self.store.snapshot().await;
                if let Err(e) = self.persister.persist(&current).await {
                    tracing::error!(
                        generation = current.generation(),
                        error = %e,
                        "Failed to persist catalog generation"
                    );
                    result.persist_error = Some(e.to_string());
                }

                tracing::info!(
                    generation = result.generation,
                    entries = result.updated_count,
                    live = result.live_count,
                    dead = result.dead_count,
                    resolved = result.resolved_count,
                    unchecked = result.unchecked_count,
                    failed_repositories = result.failed_repositories.len(),
                    elapsed_ms = clock.elapsed().as_millis() as u64,
                    "Refresh run published"
                );
            }
            Err(AbortedRun {
                reason,
                failed_repositories,
            }) => {
                tracing::error!(
                    reason = %reason,
                    kept_generation = previous.generation(),
                    "Refresh run aborted"
                );
                result.aborted_reason = Some(reason.to_string());
                result.failed_repositories = failed_repositories;
            }
        }

        result.finished_at = Utc::now();
        if let Err(e) = self.persister.persist_run(&result).await {
            tracing::warn!(error = %e, "Failed to write run summary");
        }
        metrics::record_run(&result, clock.elapsed().as_secs_f64());
        result
    }

    /// Fetch, parse, fold and check; nothing is published here
    async fn stage(&self, previous: &Catalog) -> Result<StagedRun, AbortedRun> {
        if self.repositories.is_empty() {
            return Err(RunAbort::NoRepositories.into());
        }

        let fetches = self.fetcher.fetch_all(&self.repositories).await;

        let mut locators: Vec<String> = Vec::with_capacity(fetches.len());
        let mut lists: Vec<Vec<ProvisionalEntry>> = Vec::with_capacity(fetches.len());
        let mut failed_repositories = Vec::new();

        for fetch in fetches {
            metrics::record_fetch(fetch.is_ok());
            match fetch.result {
                Ok(text) => {
                    let parsed = parse_repository(&text, &fetch.locator);
                    tracing::info!(
                        repository = %fetch.locator,
                        entries = parsed.len(),
                        skipped = parsed.skipped.len(),
                        elapsed_ms = fetch.elapsed.as_millis() as u64,
                        "Repository parsed"
                    );
                    locators.push(fetch.locator);
                    lists.push(parsed.entries);
                }
                Err(_) => failed_repositories.push(fetch.locator),
            }
        }

        if locators.is_empty() {
            return Err(AbortedRun {
                reason: RunAbort::AllRepositoriesFailed {
                    failed: failed_repositories.len(),
                },
                failed_repositories,
            });
        }

        let candidates = self
            .dedup
            .fold(locators.iter().map(String::as_str).zip(lists));

        let failed: HashSet<&str> = failed_repositories.iter().map(String::as_str).collect();
        let (candidates, _) = self.dedup.carry_over(candidates, previous, &failed);

        let resolver = if self.supplementary.is_empty() {
            ReplacementResolver::local_only()
        } else {
            ReplacementResolver::new(Arc::new(RepositoryAlternateSource::new(
                self.fetcher.clone(),
                self.supplementary.clone(),
                self.dedup.clone(),
            )))
        };

        let report = self.checker.check_all(candidates, Arc::new(resolver)).await;

        Ok(StagedRun {
            report,
            failed_repositories,
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`RefreshPipeline`]
pub struct PipelineBuilder {
    store: Option<Arc<CatalogStore>>,
    fetcher: Option<Arc<dyn RepositoryFetcher>>,
    prober: Option<Arc<dyn StreamProber>>,
    persister: Option<Arc<dyn CatalogPersister>>,
    dedup: Deduplicator,
    repositories: Vec<String>,
    supplementary: Option<Vec<String>>,
    fetch_timeout: Duration,
    probe_timeout: Duration,
    run_timeout: Duration,
    workers: usize,
    probes_per_second: Option<u32>,
}

impl PipelineBuilder {
    /// Create a builder with default limits and no collaborators
    pub fn new() -> Self {
        let config = Config::default();
        Self {
            store: None,
            fetcher: None,
            prober: None,
            persister: None,
            dedup: Deduplicator::default(),
            repositories: Vec::new(),
            supplementary: None,
            fetch_timeout: config.fetch_timeout(),
            probe_timeout: config.probe_timeout(),
            run_timeout: config.run_timeout(),
            workers: config.checker.workers,
            probes_per_second: None,
        }
    }

    /// Builder wired with the HTTP fetcher and prober and every setting
    /// from `config`
    ///
    /// The persister is left unset.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = HttpRepositoryFetcher::from_config(config)
            .context("Failed to create repository fetcher")?;
        let prober =
            HttpStreamProber::new(config.probe_timeout()).context("Failed to create stream prober")?;

        Ok(Self::new()
            .fetcher(Arc::new(fetcher))
            .prober(Arc::new(prober))
            .deduplicator(Deduplicator::from_config(config))
            .repositories(config.sources.repositories.clone())
            .supplementary_repositories(config.supplementary_repositories().to_vec())
            .fetch_timeout(config.fetch_timeout())
            .probe_timeout(config.probe_timeout())
            .run_timeout(config.run_timeout())
            .workers(config.checker.workers)
            .probes_per_second(config.checker.probes_per_second))
    }

    /// Publish into an existing store
    pub fn store(mut self, store: Arc<CatalogStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn RepositoryFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn prober(mut self, prober: Arc<dyn StreamProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn persister(mut self, persister: Arc<dyn CatalogPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn deduplicator(mut self, dedup: Deduplicator) -> Self {
        self.dedup = dedup;
        self
    }

    /// Repository locators, in priority order
    pub fn repositories(mut self, repositories: Vec<String>) -> Self {
        self.repositories = repositories;
        self
    }

    /// Repositories re-queried for replacements
    ///
    /// Defaults to the main repositories. An empty list disables the
    /// supplementary search.
    pub fn supplementary_repositories(mut self, repositories: Vec<String>) -> Self {
        self.supplementary = Some(repositories);
        self
    }

    /// Per-repository retrieval timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Per-probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Timeout for a whole run
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Worker pool size
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }

    pub fn probes_per_second(mut self, rate: Option<u32>) -> Self {
        self.probes_per_second = rate;
        self
    }

    /// Build the pipeline
    ///
    /// # Errors
    ///
    /// Fails when no fetcher or prober was supplied.
    pub fn build(self) -> Result<RefreshPipeline> {
        let fetcher = self.fetcher.context("Pipeline needs a repository fetcher")?;
        let prober = self.prober.context("Pipeline needs a stream prober")?;

        let timed = TimedProber::new(prober, self.probe_timeout, self.probes_per_second);
        let supplementary = self
            .supplementary
            .unwrap_or_else(|| self.repositories.clone());

        Ok(RefreshPipeline {
            store: self.store.unwrap_or_default(),
            fetcher: SourceFetcher::new(fetcher, self.fetch_timeout),
            checker: ValidityChecker::new(timed, self.workers),
            dedup: self.dedup,
            repositories: self.repositories,
            supplementary,
            persister: self.persister.unwrap_or_else(|| Arc::new(NullPersister)),
            run_timeout: self.run_timeout,
            run_lock: Mutex::new(()),
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
