//! Interval and manual triggers for refresh runs
//!
//! The trigger loop owns the only path into [`RefreshPipeline::run_once`]
//! while it is running, so runs happen one after another: an interval tick
//! that comes due during a long run is delayed, not stacked.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::error::{SchedulerError, SchedulerResult};
use crate::config::Config;
use crate::crawler::pipeline::RefreshPipeline;
use crate::models::RunResult;

// ============================================================================
// Trigger Configuration
// ============================================================================

/// Configuration for the refresh trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Time between scheduled runs
    pub interval: Duration,

    /// Run once immediately when the loop starts
    pub run_on_startup: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            run_on_startup: true,
        }
    }
}

impl TriggerConfig {
    /// Create a new config builder
    pub fn builder() -> TriggerConfigBuilder {
        TriggerConfigBuilder::default()
    }

    /// Build from the `[schedule]` section
    pub fn from_config(config: &Config) -> SchedulerResult<Self> {
        let trigger = Self {
            interval: config.schedule_interval(),
            run_on_startup: config.schedule.run_on_startup,
        };
        trigger.validate()?;
        Ok(trigger)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.interval.is_zero() {
            return Err(SchedulerError::trigger_config(
                "interval",
                "Interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Builder for TriggerConfig
#[derive(Debug, Default)]
pub struct TriggerConfigBuilder {
    interval: Option<Duration>,
    run_on_startup: Option<bool>,
}

impl TriggerConfigBuilder {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn run_on_startup(mut self, value: bool) -> Self {
        self.run_on_startup = Some(value);
        self
    }

    /// Build the config
    pub fn build(self) -> SchedulerResult<TriggerConfig> {
        let defaults = TriggerConfig::default();
        let config = TriggerConfig {
            interval: self.interval.unwrap_or(defaults.interval),
            run_on_startup: self.run_on_startup.unwrap_or(defaults.run_on_startup),
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Trigger Events
// ============================================================================

/// Why a run was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Startup,
    Interval,
    Manual,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Startup => "startup",
            Self::Interval => "interval",
            Self::Manual => "manual",
        })
    }
}

/// Events emitted by the trigger loop
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    /// A run has started
    RunStarted {
        reason: TriggerReason,
        triggered_at: DateTime<Utc>,
    },

    /// A run published a new generation
    RunCompleted {
        reason: TriggerReason,
        result: RunResult,
    },

    /// A run was discarded; the previous generation stays
    RunAborted {
        reason: TriggerReason,
        result: RunResult,
    },
}

struct ManualRequest {
    reply: oneshot::Sender<RunResult>,
}

// ============================================================================
// Refresh Trigger
// ============================================================================

/// Runs the pipeline on an interval and on request
pub struct RefreshTrigger {
    config: TriggerConfig,
    pipeline: Arc<RefreshPipeline>,
    event_sender: broadcast::Sender<TriggerEvent>,
    manual_tx: mpsc::Sender<ManualRequest>,
    manual_rx: Mutex<Option<mpsc::Receiver<ManualRequest>>>,
    shutdown: watch::Sender<bool>,
    is_running: RwLock<bool>,
    last_result: RwLock<Option<RunResult>>,
}

impl RefreshTrigger {
    /// Create a new trigger
    pub fn new(config: TriggerConfig, pipeline: Arc<RefreshPipeline>) -> SchedulerResult<Self> {
        config.validate()?;

        let (event_sender, _) = broadcast::channel(100);
        let (manual_tx, manual_rx) = mpsc::channel(8);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            pipeline,
            event_sender,
            manual_tx,
            manual_rx: Mutex::new(Some(manual_rx)),
            shutdown,
            is_running: RwLock::new(false),
            last_result: RwLock::new(None),
        })
    }

    /// Subscribe to trigger events
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.event_sender.subscribe()
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Check if the trigger loop is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Result of the most recent run started by this trigger
    pub async fn last_result(&self) -> Option<RunResult> {
        self.last_result.read().await.clone()
    }

    /// Start the trigger loop (runs until stopped)
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if another call to `start` is active.
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut manual_rx = self
            .manual_rx
            .lock()
            .await
            .take()
            .ok_or(SchedulerError::AlreadyRunning)?;

        let mut shutdown = self.shutdown.subscribe();
        *self.is_running.write().await = true;

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            run_on_startup = self.config.run_on_startup,
            "Refresh scheduler started"
        );

        if self.config.run_on_startup && !*shutdown.borrow_and_update() {
            self.execute(TriggerReason::Startup).await;
        }

        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // A stop issued during a run ends the loop before the next one starts
        while !*shutdown.borrow_and_update() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.execute(TriggerReason::Interval).await;
                }
                Some(request) = manual_rx.recv() => {
                    let result = self.execute(TriggerReason::Manual).await;
                    let _ = request.reply.send(result);
                }
            }
        }

        *self.is_running.write().await = false;
        self.shutdown.send_replace(false);
        // Requests queued after the last select are answered with TriggerDropped
        while let Ok(request) = manual_rx.try_recv() {
            drop(request);
        }
        *self.manual_rx.lock().await = Some(manual_rx);

        tracing::info!("Refresh scheduler stopped");
        Ok(())
    }

    /// Stop the trigger loop; a run in progress is finished first
    ///
    /// A stop requested before `start` makes the next `start` return at once.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Request a run now and wait for its result
    ///
    /// # Errors
    ///
    /// `NotRunning` when the loop is stopped, `TriggerDropped` when it stops
    /// before the run completes.
    pub async fn trigger(&self) -> SchedulerResult<RunResult> {
        if !self.is_running().await {
            return Err(SchedulerError::NotRunning);
        }

        let (reply, response) = oneshot::channel();
        self.manual_tx
            .send(ManualRequest { reply })
            .await
            .map_err(|_| SchedulerError::TriggerDropped)?;

        response.await.map_err(|_| SchedulerError::TriggerDropped)
    }

    async fn execute(&self, reason: TriggerReason) -> RunResult {
        let _ = self.event_sender.send(TriggerEvent::RunStarted {
            reason,
            triggered_at: Utc::now(),
        });
        tracing::debug!(%reason, "Run triggered");

        let result = self.pipeline.run_once().await;

        let event = if result.is_published() {
            TriggerEvent::RunCompleted {
                reason,
                result: result.clone(),
            }
        } else {
            TriggerEvent::RunAborted {
                reason,
                result: result.clone(),
            }
        };
        let _ = self.event_sender.send(event);

        *self.last_result.write().await = Some(result.clone());
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
