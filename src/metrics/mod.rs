//! Prometheus metrics for the refresh pipeline
//!
//! Tracks runs, repository fetches, probes and the status mix of the
//! published catalog. Call `init_metrics()` once at startup; until then every
//! recording function is a no-op.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::RunResult;

// ============================================================================
// Metrics Storage
// ============================================================================

struct PipelineMetrics {
    runs: CounterVec,
    run_duration: Histogram,
    fetches: CounterVec,
    probes: CounterVec,
    entries: GaugeVec,
    generation: Gauge,
    persist_failures: Counter,
}

static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default registry
///
/// Idempotent. On failure the error is returned and recording stays a no-op.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        runs: register_counter_vec!(
            "tvbox_runs_total",
            "Pipeline runs by outcome",
            &["outcome"]
        )?,
        run_duration: register_histogram!(
            "tvbox_run_duration_seconds",
            "Pipeline run duration in seconds",
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]
        )?,
        fetches: register_counter_vec!(
            "tvbox_repository_fetches_total",
            "Repository fetches by outcome",
            &["outcome"]
        )?,
        probes: register_counter_vec!(
            "tvbox_probes_total",
            "Stream probes by result",
            &["result"]
        )?,
        entries: register_gauge_vec!(
            "tvbox_catalog_entries",
            "Entries in the published catalog by status",
            &["status"]
        )?,
        generation: register_gauge!(
            "tvbox_catalog_generation",
            "Generation number of the published catalog"
        )?,
        persist_failures: register_counter!(
            "tvbox_persist_failures_total",
            "Catalog generations that could not be persisted"
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn gather() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one probe result (`live` or a failure label)
pub fn record_probe(result: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.probes.with_label_values(&[result]).inc();
    }
}

/// Record one repository fetch
pub fn record_fetch(ok: bool) {
    if let Some(m) = PIPELINE_METRICS.get() {
        let outcome = if ok { "ok" } else { "error" };
        m.fetches.with_label_values(&[outcome]).inc();
    }
}

/// Record a finished run
pub fn record_run(result: &RunResult, duration_secs: f64) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    m.run_duration.observe(duration_secs);

    if !result.is_published() {
        m.runs.with_label_values(&["aborted"]).inc();
        return;
    }

    m.runs.with_label_values(&["published"]).inc();
    m.generation.set(result.generation as f64);
    m.entries
        .with_label_values(&["live"])
        .set(result.live_count as f64);
    m.entries
        .with_label_values(&["dead"])
        .set(result.dead_count as f64);
    m.entries
        .with_label_values(&["unchecked"])
        .set(result.unchecked_count as f64);

    if result.persist_error.is_some() {
        m.persist_failures.inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
