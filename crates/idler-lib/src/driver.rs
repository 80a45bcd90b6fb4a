//! Per-environment idle passes and the polling cycle that fans them out
//!
//! A pass evaluates one path for one environment and, on a positive
//! decision, hands the matched workloads to that path's actuator. Passes
//! for different environments share nothing and run concurrently; within
//! an environment the CLI path runs before the service path.

use crate::actuator::{CliActuator, IdleActuator};
use crate::error::Result;
use crate::eligibility::{CliEligibilityEvaluator, ServiceEligibilityEvaluator};
use crate::models::{ActuationOutcome, ActuationStatus, Environment, ResourceKind, Verdict};
use crate::observability::{IdlerMetrics, StructuredLogger};
use crate::probe::{ActivityProbe, MetricsQuerier, TrafficProbe};
use crate::repository::{PodExecutor, WorkloadRepository};
use crate::selector::LabelSelector;
use crate::settings::IdlerSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlePath {
    Cli,
    Service,
}

impl IdlePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdlePath::Cli => "cli",
            IdlePath::Service => "service",
        }
    }
}

impl fmt::Display for IdlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one path's pass over one environment
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub namespace: String,
    pub path: IdlePath,
    pub verdict: Verdict,
    /// Every mutation attempted, ingresses first
    pub outcomes: Vec<ActuationOutcome>,
    pub ingress_failure: Option<String>,
}

impl PassReport {
    fn new(namespace: &str, path: IdlePath, verdict: Verdict) -> Self {
        Self {
            namespace: namespace.to_string(),
            path,
            verdict,
            outcomes: Vec::new(),
            ingress_failure: None,
        }
    }

    /// Names of deployments scaled to zero in this pass
    pub fn idled(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.kind == ResourceKind::Deployment && o.status == ActuationStatus::Applied)
            .map(|o| o.name.clone())
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Knobs for how a cycle is run, as opposed to how a pass decides
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub cli_enabled: bool,
    pub service_enabled: bool,
    pub max_concurrent_environments: usize,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            cli_enabled: true,
            service_enabled: true,
            max_concurrent_environments: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub environments: usize,
    pub passes: usize,
    pub deployments_idled: usize,
    pub patch_failures: usize,
    /// Service passes abandoned because traffic could not be measured
    pub metrics_unavailable: usize,
}

impl CycleSummary {
    fn absorb(&mut self, reports: &[PassReport]) {
        self.environments += 1;
        for report in reports {
            self.passes += 1;
            self.deployments_idled += report.idled().len();
            self.patch_failures += report.failures();
            if report.verdict == Verdict::MetricsUnavailable {
                self.metrics_unavailable += 1;
            }
        }
    }
}

pub struct Idler {
    repository: Arc<dyn WorkloadRepository>,
    cli_evaluator: CliEligibilityEvaluator,
    service_evaluator: ServiceEligibilityEvaluator,
    cli_actuator: CliActuator,
    idle_actuator: IdleActuator,
    options: CycleOptions,
    metrics: IdlerMetrics,
    logger: StructuredLogger,
}

impl Idler {
    /// Wire evaluators and actuators over the given capabilities.
    ///
    /// `query_timeout` bounds each traffic query independently of the caller.
    pub fn new(
        repository: Arc<dyn WorkloadRepository>,
        executor: Arc<dyn PodExecutor>,
        querier: Arc<dyn MetricsQuerier>,
        settings: IdlerSettings,
        query_timeout: Duration,
    ) -> Self {
        let settings = Arc::new(settings);
        let traffic = TrafficProbe::new(querier, settings.request_metric.clone(), query_timeout);

        Self {
            cli_evaluator: CliEligibilityEvaluator::new(
                repository.clone(),
                ActivityProbe::new(executor),
                settings.clone(),
            ),
            service_evaluator: ServiceEligibilityEvaluator::new(
                repository.clone(),
                traffic,
                settings.clone(),
            ),
            cli_actuator: CliActuator::new(repository.clone(), settings.clone()),
            idle_actuator: IdleActuator::new(repository.clone(), settings),
            repository,
            options: CycleOptions::default(),
            metrics: IdlerMetrics::new(),
            logger: StructuredLogger::new("workload-idler"),
        }
    }

    pub fn with_options(mut self, options: CycleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Scale down idle CLI deployments in one environment
    pub async fn idle_cli(&self, environment: &Environment) -> PassReport {
        let started = Instant::now();
        let decision = self.cli_evaluator.evaluate(environment).await;

        let mut report = PassReport::new(&environment.namespace, IdlePath::Cli, decision.verdict.clone());
        if decision.is_eligible() {
            report.outcomes = self
                .cli_actuator
                .scale_down(environment, &decision.matched_workloads)
                .await;
        }

        self.record(&report, started.elapsed());
        report
    }

    /// Idle an environment's services if they are old enough and unused
    pub async fn idle_services(&self, environment: &Environment, now: DateTime<Utc>) -> PassReport {
        let started = Instant::now();
        let decision = self.service_evaluator.evaluate(environment, now).await;

        let mut report = PassReport::new(
            &environment.namespace,
            IdlePath::Service,
            decision.verdict.clone(),
        );
        if decision.is_eligible() {
            let actuation = self
                .idle_actuator
                .actuate(environment, &decision.matched_workloads, now)
                .await;
            report.ingress_failure = actuation.ingress_failure;
            report.outcomes = actuation.ingresses;
            report.outcomes.extend(actuation.deployments);
        }

        self.record(&report, started.elapsed());
        report
    }

    /// Run every enabled path against one environment, CLI first
    pub async fn run_environment(&self, environment: &Environment) -> Vec<PassReport> {
        let mut reports = Vec::with_capacity(2);
        if self.options.cli_enabled {
            reports.push(self.idle_cli(environment).await);
        }
        if self.options.service_enabled {
            reports.push(self.idle_services(environment, Utc::now()).await);
        }
        reports
    }

    /// List environments and run their passes concurrently.
    ///
    /// Only a failure to list environments is returned; everything after
    /// that is reported through the pass reports.
    pub async fn run_cycle(self: &Arc<Self>, selector: &LabelSelector) -> Result<CycleSummary> {
        let started = Instant::now();
        let environments = self
            .repository
            .list_environments(selector)
            .await
            .map_err(|e| {
                self.logger.log_cycle_failed(&e.to_string());
                e
            })?;
        info!(environments = environments.len(), "Starting idle cycle");

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_environments.max(1)));
        let mut tasks = JoinSet::new();
        for environment in environments {
            let idler = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                idler.run_environment(&environment).await
            });
        }

        let mut summary = CycleSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(reports) => summary.absorb(&reports),
                Err(e) => error!(error = %e, "Environment pass aborted"),
            }
        }

        self.logger.log_cycle_complete(
            summary.environments,
            summary.deployments_idled,
            started.elapsed().as_secs_f64(),
        );
        Ok(summary)
    }

    fn record(&self, report: &PassReport, elapsed: Duration) {
        let path = report.path.as_str();
        let idled = report.idled();

        self.metrics.inc_passes(path);
        self.metrics.observe_pass_duration(elapsed.as_secs_f64());
        if report.verdict != Verdict::Eligible {
            self.metrics.inc_skipped(&report.verdict);
        }
        for failure in report.outcomes.iter().filter(|o| o.is_failure()) {
            self.metrics.inc_patch_failures(failure.kind);
        }
        if !idled.is_empty() {
            self.metrics.add_deployments_idled(path, idled.len());
            self.logger
                .log_environment_idled(&report.namespace, path, &idled);
        }

        self.logger.log_pass_complete(
            &report.namespace,
            path,
            &report.verdict,
            idled.len(),
            report.failures(),
            elapsed.as_secs_f64(),
        );
    }
}
