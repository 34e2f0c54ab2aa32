//! Validity checker worker pool
//!
//! Entries are queued on an mpsc channel and pulled by a fixed number of
//! workers. A worker owns one entry at a time: it probes the primary URL and,
//! if that fails, runs the resolver for the same entry before taking the next
//! job. Probes in flight therefore never exceed the worker count, whatever the
//! catalog size.
//!
//! ```text
//! ┌──────────┐   mpsc    ┌──────────────┐   mpsc    ┌───────────┐
//! │ producer │──────────▶│ N workers    │──────────▶│ collector │
//! └──────────┘  entries  │ probe+resolve│  verdicts └───────────┘
//!                        └──────────────┘
//! ```

use chrono::Utc;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::crawler::prober::{ProbeFailure, ProbeOutcome, StreamProber};
use crate::crawler::resolver::{ReplacementResolver, Resolution};
use crate::metrics;
use crate::models::{ChannelEntry, ChannelStatus};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ============================================================================
// Timed prober
// ============================================================================

/// A [`StreamProber`] bounded by a per-probe timeout and an optional rate
///
/// An elapsed timeout is reported as [`ProbeFailure::Timeout`], the same as
/// any other unreachable verdict.
#[derive(Clone)]
pub struct TimedProber {
    prober: Arc<dyn StreamProber>,
    timeout: Duration,
    limiter: Option<Arc<DirectLimiter>>,
}

impl TimedProber {
    pub fn new(
        prober: Arc<dyn StreamProber>,
        timeout: Duration,
        probes_per_second: Option<u32>,
    ) -> Self {
        let limiter = probes_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        Self {
            prober,
            timeout,
            limiter,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe one URL
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let outcome = match tokio::time::timeout(self.timeout, self.prober.probe(url)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Unreachable(ProbeFailure::Timeout),
        };

        match &outcome {
            ProbeOutcome::Reachable => metrics::record_probe("live"),
            ProbeOutcome::Unreachable(failure) => {
                tracing::debug!(url = %url, reason = %failure, "Probe failed");
                metrics::record_probe(failure.label());
            }
        }

        outcome
    }
}

// ============================================================================
// Verdicts
// ============================================================================

/// Final state of one entry after check and resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryVerdict {
    /// Primary URL is live
    Live,
    /// Primary failed; a replacement is live
    Resolved { from_supplementary: bool },
    /// Nothing reachable
    Dead,
    /// No URL to probe anywhere
    Unchecked,
}

/// Counts of verdicts for one check pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckStats {
    pub live: usize,
    pub resolved: usize,
    pub resolved_supplementary: usize,
    pub dead: usize,
    pub unchecked: usize,
}

impl CheckStats {
    fn record(&mut self, verdict: EntryVerdict) {
        match verdict {
            EntryVerdict::Live => self.live += 1,
            EntryVerdict::Resolved { from_supplementary } => {
                self.live += 1;
                self.resolved += 1;
                if from_supplementary {
                    self.resolved_supplementary += 1;
                }
            }
            EntryVerdict::Dead => self.dead += 1,
            EntryVerdict::Unchecked => self.unchecked += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.live + self.dead + self.unchecked
    }
}

/// Checked entries, in input order, plus verdict counts
#[derive(Debug, Default)]
pub struct CheckReport {
    pub entries: Vec<ChannelEntry>,
    pub stats: CheckStats,
}

struct CheckJob {
    index: usize,
    entry: ChannelEntry,
}

struct CheckResult {
    index: usize,
    entry: ChannelEntry,
    verdict: EntryVerdict,
}

// ============================================================================
// Validity Checker
// ============================================================================

/// Bounded worker pool assigning a status to every entry
pub struct ValidityChecker {
    prober: TimedProber,
    workers: usize,
}

impl ValidityChecker {
    pub fn new(prober: TimedProber, workers: usize) -> Self {
        Self {
            prober,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Check every entry, resolving failed primaries, with at most
    /// `workers` probes in flight
    ///
    /// Dropping the returned future aborts all workers.
    pub async fn check_all(
        &self,
        entries: Vec<ChannelEntry>,
        resolver: Arc<ReplacementResolver>,
    ) -> CheckReport {
        let total = entries.len();
        if total == 0 {
            return CheckReport::default();
        }

        tracing::info!(
            entries = total,
            workers = self.workers,
            probe_timeout_ms = self.prober.timeout().as_millis() as u64,
            "Checking channel entries"
        );

        let (job_tx, job_rx) = mpsc::channel::<CheckJob>(self.workers * 2);
        let (result_tx, mut result_rx) = mpsc::channel::<CheckResult>(self.workers * 2);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut tasks = JoinSet::new();

        for worker_id in 0..self.workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let prober = self.prober.clone();
            let resolver = Arc::clone(&resolver);

            tasks.spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };

                    let Some(CheckJob { index, mut entry }) = job else {
                        break;
                    };

                    let verdict = check_entry(&mut entry, &prober, &resolver).await;

                    if result_tx
                        .send(CheckResult {
                            index,
                            entry,
                            verdict,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }

                tracing::trace!(worker_id, "Check worker shutting down");
            });
        }
        drop(result_tx);

        tasks.spawn(async move {
            for (index, entry) in entries.into_iter().enumerate() {
                if job_tx.send(CheckJob { index, entry }).await.is_err() {
                    tracing::error!("Check queue closed early");
                    break;
                }
            }
        });

        let mut slots: Vec<Option<ChannelEntry>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut stats = CheckStats::default();
        let mut done = 0usize;

        while let Some(result) = result_rx.recv().await {
            stats.record(result.verdict);
            slots[result.index] = Some(result.entry);
            done += 1;
            if done % 500 == 0 {
                tracing::info!(done, total, "Check progress");
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Check worker failed");
            }
        }

        let entries: Vec<ChannelEntry> = slots.into_iter().flatten().collect();
        if entries.len() != total {
            tracing::error!(
                expected = total,
                checked = entries.len(),
                "Some entries were lost by failed check workers"
            );
        }

        CheckReport { entries, stats }
    }
}

/// Probe the primary URL, falling back to the resolver
async fn check_entry(
    entry: &mut ChannelEntry,
    prober: &TimedProber,
    resolver: &ReplacementResolver,
) -> EntryVerdict {
    if let Some(primary) = entry.url().map(str::to_owned) {
        if prober.probe(&primary).await.is_reachable() {
            entry.mark_live(0, Utc::now());
            return EntryVerdict::Live;
        }
    }

    match resolver.resolve(entry, prober).await {
        Resolution::Recovered {
            from_supplementary, ..
        } => EntryVerdict::Resolved { from_supplementary },
        Resolution::Exhausted { .. } if entry.status() == ChannelStatus::Dead => EntryVerdict::Dead,
        Resolution::Exhausted { .. } => EntryVerdict::Unchecked,
    }
}
