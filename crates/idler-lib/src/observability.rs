//! Observability infrastructure for the idler
//!
//! Provides:
//! - Prometheus metrics (passes, idled deployments, skips, patch failures, pass latency)
//! - Structured JSON logging with tracing

use crate::models::{ResourceKind, Verdict};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Pass duration buckets in seconds; a pass may include a metrics query
/// and one exec per pod, so the range is wide.
const PASS_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<IdlerMetricsInner> = OnceLock::new();

struct IdlerMetricsInner {
    passes: IntCounterVec,
    deployments_idled: IntCounterVec,
    environments_skipped: IntCounterVec,
    patch_failures: IntCounterVec,
    probe_parse_fallbacks: IntCounter,
    pass_duration_seconds: Histogram,
}

impl IdlerMetricsInner {
    fn new() -> Self {
        Self {
            passes: register_int_counter_vec!(
                "workload_idler_passes_total",
                "Idle passes run, by path",
                &["path"]
            )
            .expect("Failed to register passes_total"),

            deployments_idled: register_int_counter_vec!(
                "workload_idler_deployments_idled_total",
                "Deployments scaled to zero, by path",
                &["path"]
            )
            .expect("Failed to register deployments_idled_total"),

            environments_skipped: register_int_counter_vec!(
                "workload_idler_environments_skipped_total",
                "Passes that ended without idling, by reason",
                &["reason"]
            )
            .expect("Failed to register environments_skipped_total"),

            patch_failures: register_int_counter_vec!(
                "workload_idler_patch_failures_total",
                "Failed merge patches, by resource kind",
                &["kind"]
            )
            .expect("Failed to register patch_failures_total"),

            probe_parse_fallbacks: register_int_counter!(
                "workload_idler_probe_parse_fallbacks_total",
                "Probe outputs that could not be parsed and were counted as zero processes"
            )
            .expect("Failed to register probe_parse_fallbacks_total"),

            pass_duration_seconds: register_histogram!(
                "workload_idler_pass_duration_seconds",
                "Wall time of one environment pass",
                PASS_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_duration_seconds"),
        }
    }
}

/// Handle to the process-wide idler metrics.
///
/// Every handle shares the same registered collectors.
#[derive(Clone)]
pub struct IdlerMetrics {
    _private: (),
}

impl Default for IdlerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IdlerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(IdlerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &IdlerMetricsInner {
        GLOBAL_METRICS.get_or_init(IdlerMetricsInner::new)
    }

    /// One evaluation pass finished on `path` (`cli` or `service`)
    pub fn inc_passes(&self, path: &str) {
        self.inner().passes.with_label_values(&[path]).inc();
    }

    /// Deployments scaled to zero by a pass
    pub fn add_deployments_idled(&self, path: &str, count: usize) {
        self.inner()
            .deployments_idled
            .with_label_values(&[path])
            .inc_by(count as u64);
    }

    /// A pass ended without actuating, labelled by verdict
    pub fn inc_skipped(&self, verdict: &Verdict) {
        self.inner()
            .environments_skipped
            .with_label_values(&[verdict.as_str()])
            .inc();
    }

    pub fn inc_patch_failures(&self, kind: ResourceKind) {
        let kind = kind.to_string();
        self.inner()
            .patch_failures
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Process probe output that could not be parsed and was read as zero
    pub fn inc_probe_parse_fallbacks(&self) {
        self.inner().probe_parse_fallbacks.inc();
    }

    pub fn observe_pass_duration(&self, duration_secs: f64) {
        self.inner().pass_duration_seconds.observe(duration_secs);
    }
}

/// Event-shaped log lines for the outcomes operators alert on
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, dry_run: bool) {
        info!(
            event = "idler_started",
            instance = %self.instance,
            version = %version,
            dry_run = dry_run,
            "Workload idler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "idler_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Workload idler shutting down"
        );
    }

    /// Emitted once per pass, whatever the verdict
    pub fn log_pass_complete(
        &self,
        namespace: &str,
        path: &str,
        verdict: &Verdict,
        idled: usize,
        failures: usize,
        duration_secs: f64,
    ) {
        info!(
            event = "idle_pass_complete",
            instance = %self.instance,
            namespace = %namespace,
            path = %path,
            verdict = %verdict.as_str(),
            idled = idled,
            failures = failures,
            duration_secs = duration_secs,
            "Idle pass complete"
        );
    }

    /// Emitted only when at least one deployment was scaled down
    pub fn log_environment_idled(&self, namespace: &str, path: &str, deployments: &[String]) {
        info!(
            event = "environment_idled",
            instance = %self.instance,
            namespace = %namespace,
            path = %path,
            deployments = ?deployments,
            "Environment idled"
        );
    }

    /// Namespace listing failed; no environment was visited
    pub fn log_cycle_failed(&self, error: &str) {
        warn!(
            event = "idle_cycle_failed",
            instance = %self.instance,
            error = %error,
            "Could not list environments, cycle skipped"
        );
    }

    pub fn log_cycle_complete(&self, environments: usize, idled: usize, duration_secs: f64) {
        info!(
            event = "idle_cycle_complete",
            instance = %self.instance,
            environments = environments,
            idled = idled,
            duration_secs = duration_secs,
            "Idle cycle complete"
        );
    }
}
