//! Eligibility of an environment's traffic-serving workloads
//!
//! The decision is environment-wide: one pod past the age threshold in any
//! matched deployment puts every matched deployment up for idling, subject
//! to the traffic check.

use super::build_in_progress;
use crate::models::{EligibilityDecision, Environment, PodPhase, Verdict, WorkloadDescriptor};
use crate::probe::{traffic_window, TrafficProbe};
use crate::repository::WorkloadRepository;
use crate::selector::LabelSelector;
use crate::settings::IdlerSettings;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Environment-wide idle decision for web-facing workloads
pub struct ServiceEligibilityEvaluator {
    repository: Arc<dyn WorkloadRepository>,
    traffic: TrafficProbe,
    settings: Arc<IdlerSettings>,
}

impl ServiceEligibilityEvaluator {
    pub fn new(
        repository: Arc<dyn WorkloadRepository>,
        traffic: TrafficProbe,
        settings: Arc<IdlerSettings>,
    ) -> Self {
        Self {
            repository,
            traffic,
            settings,
        }
    }

    /// Running or pending builds, young pods and observed traffic each keep
    /// the environment up; a failed traffic query does too.
    pub async fn evaluate(&self, environment: &Environment, now: DateTime<Utc>) -> EligibilityDecision {
        let namespace = environment.namespace.as_str();
        let service = &self.settings.service;

        if !service.skip_build_check
            && build_in_progress(
                self.repository.as_ref(),
                namespace,
                &service.builds,
                &[PodPhase::Running, PodPhase::Pending],
            )
            .await
        {
            return EligibilityDecision::skipped(Verdict::BuildInProgress);
        }

        let deployments = match self
            .repository
            .list_deployments(namespace, &service.deployments)
            .await
        {
            Ok(deployments) => deployments,
            Err(e) => {
                error!(namespace = %namespace, error = %e, "Error getting deployments");
                return EligibilityDecision::skipped(Verdict::ListingFailed);
            }
        };

        let candidates: Vec<WorkloadDescriptor> = deployments
            .into_iter()
            .filter(|deployment| {
                if deployment.is_idled() {
                    if self.settings.debug {
                        info!(deployment = %deployment.name, "Deployment already idled");
                    }
                    return false;
                }
                info!(
                    namespace = %namespace,
                    deployment = %deployment.name,
                    replicas = deployment.replicas,
                    "Deployment has running replicas"
                );
                true
            })
            .collect();

        if candidates.is_empty() {
            return EligibilityDecision::skipped(Verdict::NoCandidates);
        }

        if !self.any_pod_past_threshold(namespace, &candidates, now).await {
            return EligibilityDecision::skipped(Verdict::PodsWithinThreshold);
        }

        if service.skip_hit_check {
            info!(namespace = %namespace, "Environment marked for idling, ignoring the router logs for hits");
            return EligibilityDecision::eligible(candidates);
        }

        info!(namespace = %namespace, "Environment marked for idling, checking router logs for hits");
        let window = traffic_window(
            &environment.environment_type,
            self.settings.idle_minutes,
            &self.settings.prometheus_check_interval,
        );
        match self.traffic.hits(namespace, &window, now).await {
            Ok(0) => {
                info!(namespace = %namespace, hits = 0, window = %window, "Environment has had no hits");
                EligibilityDecision::eligible(candidates)
            }
            Ok(hits) => {
                info!(
                    namespace = %namespace,
                    hits = hits,
                    window = %window,
                    "Environment does not need idling"
                );
                EligibilityDecision::skipped(Verdict::TrafficObserved { hits })
            }
            Err(e) => {
                error!(namespace = %namespace, error = %e, "Error querying Prometheus");
                EligibilityDecision::skipped(Verdict::MetricsUnavailable)
            }
        }
    }

    /// Fold pod ages across every candidate into one environment-wide flag.
    ///
    /// A failed pod listing stops further checks but keeps what was
    /// already found.
    async fn any_pod_past_threshold(
        &self,
        namespace: &str,
        candidates: &[WorkloadDescriptor],
        now: DateTime<Utc>,
    ) -> bool {
        let threshold = i64::from(self.settings.idle_minutes);
        let mut idle = false;

        for deployment in candidates {
            let selector = LabelSelector::equals(&self.settings.service_name_label, &deployment.name);
            let pods = match self.repository.list_pods(namespace, &selector).await {
                Ok(pods) => pods,
                Err(e) => {
                    error!(
                        namespace = %namespace,
                        deployment = %deployment.name,
                        error = %e,
                        "Error listing pods, skipping remaining age checks"
                    );
                    break;
                }
            };

            idle = pods.iter().fold(idle, |idle, pod| {
                let Some(minutes) = pod.minutes_running(now) else {
                    return idle;
                };
                if self.settings.debug {
                    info!(pod = %pod.name, minutes = minutes, "Pod running time");
                } else {
                    debug!(pod = %pod.name, minutes = minutes, "Pod running time");
                }
                if minutes >= threshold {
                    info!(
                        namespace = %namespace,
                        pod = %pod.name,
                        idle_minutes = threshold,
                        "Pod will be idled as it has been running longer than the threshold"
                    );
                    true
                } else {
                    idle
                }
            });
        }
        idle
    }
}
