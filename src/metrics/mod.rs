//! Prometheus metrics for the provider client and the refresh scheduler
//!
//! This module provides metrics tracking for:
//! - Provider: request outcomes, rate limiter waits
//! - Scheduler: refresh cycles and their duration, per-group failures, live plan state
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for provider client metrics
struct ProviderMetrics {
    requests: CounterVec,
    rate_limit_waits: Counter,
}

/// Container for scheduler metrics
struct SchedulerMetrics {
    refresh_cycles: CounterVec,
    refresh_duration: HistogramVec,
    group_failures: CounterVec,
    live_plan_active: Gauge,
}

static PROVIDER_METRICS: OnceLock<ProviderMetrics> = OnceLock::new();

static SCHEDULER_METRICS: OnceLock<SchedulerMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
///
/// ```ignore
/// if let Err(e) = slotroster::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics disabled");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let provider = ProviderMetrics {
        requests: register_counter_vec!(
            "slotroster_provider_requests_total",
            "Provider requests by outcome",
            &["outcome"]
        )?,
        rate_limit_waits: register_counter!(
            "slotroster_provider_rate_limit_waits_total",
            "Times a request waited for the rolling request window to free up"
        )?,
    };

    let scheduler = SchedulerMetrics {
        refresh_cycles: register_counter_vec!(
            "slotroster_refresh_cycles_total",
            "Completed schedule refresh cycles",
            &["kind"]
        )?,
        refresh_duration: register_histogram_vec!(
            "slotroster_refresh_duration_seconds",
            "Duration of a schedule refresh cycle in seconds",
            &["kind"],
            vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
        )?,
        group_failures: register_counter_vec!(
            "slotroster_group_refresh_failures_total",
            "Schedule groups whose plan list could not be fetched",
            &["group"]
        )?,
        live_plan_active: register_gauge!(
            "slotroster_live_plan_active",
            "Whether a scheduled plan is currently live (1 = yes, 0 = no)"
        )?,
    };

    PROVIDER_METRICS
        .set(provider)
        .map_err(|_| "Provider metrics already initialized")?;
    SCHEDULER_METRICS
        .set(scheduler)
        .map_err(|_| "Scheduler metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PROVIDER_METRICS.get().is_some() && SCHEDULER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the final outcome of one provider request
///
/// Outcomes: `ok`, `not_found`, `client_error`, `exhausted`.
pub fn record_provider_request(outcome: &str) {
    let Some(m) = PROVIDER_METRICS.get() else {
        return;
    };
    m.requests.with_label_values(&[outcome]).inc();
}

pub fn record_rate_limit_wait() {
    if let Some(m) = PROVIDER_METRICS.get() {
        m.rate_limit_waits.inc();
    }
}

/// Record a finished refresh cycle (`scheduled`, `daily`, `forced`, `startup`)
pub fn record_refresh_cycle(kind: &str) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.refresh_cycles.with_label_values(&[kind]).inc();
    }
}

pub fn record_group_failure(group_id: &str) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };
    m.group_failures.with_label_values(&[group_id]).inc();
}

pub fn set_live_plan_active(active: bool) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.live_plan_active.set(if active { 1.0 } else { 0.0 });
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a refresh timer that records on drop
pub fn start_refresh_timer(kind: &str) -> MetricsTimer {
    match SCHEDULER_METRICS.get() {
        Some(m) => MetricsTimer::new(m.refresh_duration.with_label_values(&[kind]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(metrics_initialized());
    }

    #[test]
    fn test_gather_metrics() {
        let _ = init_metrics();
        record_refresh_cycle("forced");

        let text = gather_metrics().unwrap();
        assert!(text.contains("slotroster_refresh_cycles_total"));
    }

    #[test]
    fn test_recording_does_not_panic() {
        let _ = init_metrics();
        record_provider_request("ok");
        record_rate_limit_wait();
        record_group_failure("546904");
        set_live_plan_active(true);
        let _timer = start_refresh_timer("scheduled");
    }
}
