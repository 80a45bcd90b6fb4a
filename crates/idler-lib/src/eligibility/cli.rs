//! Eligibility of CLI workloads

use super::build_in_progress;
use crate::models::{EligibilityDecision, Environment, PodPhase, Verdict, WorkloadDescriptor};
use crate::probe::ActivityProbe;
use crate::repository::WorkloadRepository;
use crate::settings::{IdlerSettings, LoopPolicy};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Container variable listing the workload's scheduled jobs
pub const CRONJOBS_ENV: &str = "CRONJOBS";

/// Number of cron jobs a deployment declares, if any.
///
/// Jobs are separated by the literal two characters `\n`.
pub fn cron_job_count(deployment: &WorkloadDescriptor) -> Option<usize> {
    deployment
        .containers
        .iter()
        .flat_map(|c| c.env.iter())
        .filter(|var| var.name == CRONJOBS_ENV)
        .filter_map(|var| var.value.as_deref())
        .find(|value| !value.is_empty())
        .map(|value| value.split("\\n").count())
}

/// Decides which CLI deployments of an environment have gone idle.
///
/// A running build blocks the whole environment. Deployments that declare
/// cron jobs are never idled; the rest qualify once a CLI pod reports no
/// running processes.
pub struct CliEligibilityEvaluator {
    repository: Arc<dyn WorkloadRepository>,
    probe: ActivityProbe,
    settings: Arc<IdlerSettings>,
}

impl CliEligibilityEvaluator {
    pub fn new(
        repository: Arc<dyn WorkloadRepository>,
        probe: ActivityProbe,
        settings: Arc<IdlerSettings>,
    ) -> Self {
        Self {
            repository,
            probe,
            settings,
        }
    }

    /// Decide which CLI deployments in the environment can be scaled down.
    ///
    /// The matched workloads are the individually eligible deployments, in
    /// listing order.
    pub async fn evaluate(&self, environment: &Environment) -> EligibilityDecision {
        let namespace = environment.namespace.as_str();
        let cli = &self.settings.cli;

        if !cli.skip_build_check
            && build_in_progress(
                self.repository.as_ref(),
                namespace,
                &cli.builds,
                &[PodPhase::Running],
            )
            .await
        {
            return EligibilityDecision::skipped(Verdict::BuildInProgress);
        }

        let deployments = match self
            .repository
            .list_deployments(namespace, &cli.deployments)
            .await
        {
            Ok(deployments) => deployments,
            Err(e) => {
                error!(namespace = %namespace, error = %e, "Error getting deployments");
                return EligibilityDecision::skipped(Verdict::ListingFailed);
            }
        };

        let mut eligible = Vec::new();
        for deployment in deployments {
            if deployment.is_idled() {
                info!(
                    namespace = %namespace,
                    deployment = %deployment.name,
                    "Deployment is already idled"
                );
                // Break ends the pass for every deployment listed after this one
                match cli.on_already_idled {
                    LoopPolicy::Break => break,
                    LoopPolicy::Continue => continue,
                }
            }
            info!(
                namespace = %namespace,
                deployment = %deployment.name,
                replicas = deployment.replicas,
                "Deployment has running replicas"
            );

            if !cli.skip_cron_check {
                if self.settings.debug {
                    info!(deployment = %deployment.name, "Checking deployment for cronjobs");
                }
                if let Some(count) = cron_job_count(&deployment) {
                    info!(
                        namespace = %namespace,
                        deployment = %deployment.name,
                        cronjobs = count,
                        "Deployment has cronjobs defined"
                    );
                    continue;
                }
            }

            if self.has_idle_pod(namespace, &deployment).await {
                eligible.push(deployment);
            }
        }

        if eligible.is_empty() {
            EligibilityDecision::skipped(Verdict::NoCandidates)
        } else {
            EligibilityDecision::eligible(eligible)
        }
    }

    /// Whether any CLI pod reports no active processes.
    ///
    /// With the process check skipped, any pod at all qualifies.
    async fn has_idle_pod(&self, namespace: &str, deployment: &WorkloadDescriptor) -> bool {
        let cli = &self.settings.cli;

        let pods = match self.repository.list_pods(namespace, &cli.pods).await {
            Ok(pods) => pods,
            Err(e) => {
                error!(
                    namespace = %namespace,
                    deployment = %deployment.name,
                    error = %e,
                    "Error listing pods"
                );
                return false;
            }
        };

        if cli.skip_process_check {
            return !pods.is_empty();
        }

        let mut idle = false;
        for pod in &pods {
            if self.settings.debug {
                info!(pod = %pod.name, "Checking pod for running processes");
            }
            match self.probe.active_processes(namespace, &pod.name).await {
                Ok(0) => {
                    info!(
                        namespace = %namespace,
                        pod = %pod.name,
                        "Pod has no running processes, idling"
                    );
                    idle = true;
                }
                Ok(count) => {
                    debug!(pod = %pod.name, processes = count, "Pod has running processes");
                }
                Err(e) => {
                    error!(
                        namespace = %namespace,
                        pod = %pod.name,
                        error = %e,
                        "Error when trying to exec to pod"
                    );
                    // Break skips the remaining pods of this deployment
                    match cli.on_probe_error {
                        LoopPolicy::Break => break,
                        LoopPolicy::Continue => continue,
                    }
                }
            }
        }
        idle
    }
}
