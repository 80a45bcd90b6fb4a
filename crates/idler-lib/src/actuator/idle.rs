//! Two-phase idling of an environment's services
//!
//! Phase 1 annotates every matching ingress so the proxy routes 503s to
//! the wake-up backend. Phase 2 scales the deployments and records the
//! replica count to restore. Phase 2 only runs once phase 1 fully
//! succeeded (or is switched off): scaled deployments behind an
//! unannotated ingress would never be woken.

use super::ActuationReport;
use crate::error::Result;
use crate::models::{
    ActuationOutcome, ActuationStatus, Environment, ResourceKind, WorkloadDescriptor,
};
use crate::patch;
use crate::repository::WorkloadRepository;
use crate::settings::IdlerSettings;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Applies a positive service decision: ingresses first, then deployments
pub struct IdleActuator {
    repository: Arc<dyn WorkloadRepository>,
    settings: Arc<IdlerSettings>,
}

impl IdleActuator {
    pub fn new(repository: Arc<dyn WorkloadRepository>, settings: Arc<IdlerSettings>) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Run both phases; with dry-run set nothing is patched and every
    /// outcome is reported as `DryRun`.
    pub async fn actuate(
        &self,
        environment: &Environment,
        workloads: &[WorkloadDescriptor],
        now: DateTime<Utc>,
    ) -> ActuationReport {
        let namespace = environment.namespace.as_str();
        let mut report = ActuationReport::default();

        if self.settings.service.skip_ingress_patch {
            info!(namespace = %namespace, "Skipping ingress annotation");
        } else if let Err(e) = self.annotate_ingresses(namespace, &mut report.ingresses).await {
            warn!(
                namespace = %namespace,
                error = %e,
                "Environment not idled due to errors patching ingress"
            );
            report.ingress_failure = Some(e.to_string());
            return report;
        }

        info!(namespace = %namespace, deployments = workloads.len(), "Environment will be idled");
        for workload in workloads {
            let outcome = self.idle_deployment(namespace, workload, now).await;
            report.deployments.push(outcome);
        }
        report
    }

    /// Phase 1. Stops at the first failure.
    async fn annotate_ingresses(
        &self,
        namespace: &str,
        outcomes: &mut Vec<ActuationOutcome>,
    ) -> Result<()> {
        let ingresses = self
            .repository
            .list_ingresses(namespace, &self.settings.service.ingress)
            .await
            .map_err(|e| {
                error!(namespace = %namespace, error = %e, "Error getting ingress");
                e
            })?;

        let payload = patch::ingress_custom_errors(&self.settings);
        for ingress in ingresses {
            if self.settings.dry_run {
                info!(namespace = %namespace, ingress = %ingress.name, "Ingress would be patched");
                outcomes.push(ActuationOutcome {
                    kind: ResourceKind::Ingress,
                    name: ingress.name,
                    status: ActuationStatus::DryRun,
                });
                continue;
            }

            if let Err(e) = self
                .repository
                .patch_ingress(namespace, &ingress.name, &payload)
                .await
            {
                error!(namespace = %namespace, ingress = %ingress.name, error = %e, "Error patching ingress");
                outcomes.push(ActuationOutcome {
                    kind: ResourceKind::Ingress,
                    name: ingress.name,
                    status: ActuationStatus::Failed(e.to_string()),
                });
                return Err(e);
            }

            info!(namespace = %namespace, ingress = %ingress.name, "Ingress patched");
            outcomes.push(ActuationOutcome {
                kind: ResourceKind::Ingress,
                name: ingress.name,
                status: ActuationStatus::Applied,
            });
        }
        Ok(())
    }

    /// Phase 2 for one deployment. A failure here does not stop the others.
    async fn idle_deployment(
        &self,
        namespace: &str,
        workload: &WorkloadDescriptor,
        now: DateTime<Utc>,
    ) -> ActuationOutcome {
        let status = if self.settings.dry_run {
            info!(namespace = %namespace, deployment = %workload.name, "Deployment would be scaled to 0");
            ActuationStatus::DryRun
        } else {
            let payload = patch::idle_deployment(&self.settings, workload.replicas, now);
            match self
                .repository
                .patch_deployment(namespace, &workload.name, &payload)
                .await
            {
                Ok(()) => {
                    info!(
                        namespace = %namespace,
                        deployment = %workload.name,
                        unidle_replicas = patch::unidle_replicas(workload.replicas),
                        "Deployment scaled to 0"
                    );
                    ActuationStatus::Applied
                }
                Err(e) => {
                    error!(namespace = %namespace, deployment = %workload.name, error = %e, "Error scaling deployment");
                    ActuationStatus::Failed(e.to_string())
                }
            }
        };

        ActuationOutcome {
            kind: ResourceKind::Deployment,
            name: workload.name.clone(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvironmentType;
    use crate::settings::ServiceSelectors;
    use crate::testing::*;

    fn actuator(repository: FakeRepository, settings: IdlerSettings) -> (IdleActuator, Arc<FakeRepository>) {
        let repository = Arc::new(repository);
        (
            IdleActuator::new(repository.clone(), Arc::new(settings)),
            repository,
        )
    }

    #[tokio::test]
    async fn test_ingress_then_deployments() {
        let (actuator, repository) = actuator(
            FakeRepository::new().with_ingress(ingress("nginx")),
            IdlerSettings::default(),
        );
        let workloads = vec![deployment("nginx", "nginx", 3)];

        let report = actuator
            .actuate(&environment(EnvironmentType::Development), &workloads, Utc::now())
            .await;

        assert!(!report.aborted());
        assert_eq!(report.scaled(), 1);

        let patches = repository.patches();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].0, ResourceKind::Ingress);
        assert_eq!(
            patches[0].2["metadata"]["annotations"]["nginx.ingress.kubernetes.io/custom-http-errors"],
            "503"
        );
        assert_eq!(patches[1].0, ResourceKind::Deployment);
        assert_eq!(patches[1].2["spec"]["replicas"], 0);
        assert_eq!(
            patches[1].2["metadata"]["annotations"]["idling.amazee.io/unidle-replicas"],
            "3"
        );
        assert_eq!(patches[1].2["metadata"]["labels"]["idling.amazee.io/watch"], "true");
    }

    #[tokio::test]
    async fn test_zero_replica_deployment_records_one() {
        let (actuator, repository) = actuator(FakeRepository::new(), IdlerSettings::default());

        actuator
            .actuate(
                &environment(EnvironmentType::Development),
                &[deployment("nginx", "nginx", 0)],
                Utc::now(),
            )
            .await;

        let patches = repository.patches();
        assert_eq!(
            patches[0].2["metadata"]["annotations"]["idling.amazee.io/unidle-replicas"],
            "1"
        );
    }

    #[tokio::test]
    async fn test_ingress_failure_prevents_scaling() {
        let (actuator, repository) = actuator(
            FakeRepository::new()
                .with_ingress(ingress("nginx"))
                .with_ingress(ingress("nginx-alias"))
                .failing_patch(ResourceKind::Ingress, "nginx"),
            IdlerSettings::default(),
        );

        let report = actuator
            .actuate(
                &environment(EnvironmentType::Development),
                &[deployment("nginx", "nginx", 1), deployment("node", "node", 1)],
                Utc::now(),
            )
            .await;

        assert!(report.aborted());
        assert!(report.deployments.is_empty());
        assert_eq!(report.ingresses.len(), 1);
        assert!(repository.patches().is_empty());
    }

    #[tokio::test]
    async fn test_ingress_listing_failure_prevents_scaling() {
        let (actuator, repository) = actuator(
            FakeRepository::new().failing_list(ResourceKind::Ingress),
            IdlerSettings::default(),
        );

        let report = actuator
            .actuate(
                &environment(EnvironmentType::Development),
                &[deployment("nginx", "nginx", 1)],
                Utc::now(),
            )
            .await;

        assert!(report.aborted());
        assert!(repository.patched(ResourceKind::Deployment).is_empty());
    }

    #[tokio::test]
    async fn test_skip_ingress_patch_goes_straight_to_scaling() {
        let (actuator, repository) = actuator(
            FakeRepository::new()
                .with_ingress(ingress("nginx"))
                .failing_list(ResourceKind::Ingress),
            IdlerSettings {
                service: ServiceSelectors {
                    skip_ingress_patch: true,
                    ..ServiceSelectors::default()
                },
                ..IdlerSettings::default()
            },
        );

        let report = actuator
            .actuate(
                &environment(EnvironmentType::Development),
                &[deployment("nginx", "nginx", 1)],
                Utc::now(),
            )
            .await;

        assert!(!report.aborted());
        assert_eq!(repository.patched(ResourceKind::Deployment), vec!["nginx"]);
        assert!(repository.patched(ResourceKind::Ingress).is_empty());
    }

    #[tokio::test]
    async fn test_deployment_failure_does_not_stop_siblings() {
        let (actuator, repository) = actuator(
            FakeRepository::new().failing_patch(ResourceKind::Deployment, "nginx"),
            IdlerSettings::default(),
        );

        let report = actuator
            .actuate(
                &environment(EnvironmentType::Development),
                &[
                    deployment("nginx", "nginx", 1),
                    deployment("node", "node", 1),
                    deployment("php", "php", 2),
                ],
                Utc::now(),
            )
            .await;

        assert_eq!(report.failures(), 1);
        assert_eq!(report.scaled(), 2);
        assert_eq!(repository.patched(ResourceKind::Deployment), vec!["node", "php"]);
    }

    #[tokio::test]
    async fn test_dry_run_mutates_nothing() {
        let (actuator, repository) = actuator(
            FakeRepository::new().with_ingress(ingress("nginx")),
            IdlerSettings {
                dry_run: true,
                ..IdlerSettings::default()
            },
        );

        let report = actuator
            .actuate(
                &environment(EnvironmentType::Development),
                &[deployment("nginx", "nginx", 1)],
                Utc::now(),
            )
            .await;

        assert!(repository.patches().is_empty());
        assert_eq!(report.ingresses[0].status, ActuationStatus::DryRun);
        assert_eq!(report.deployments[0].status, ActuationStatus::DryRun);
        assert_eq!(report.scaled(), 0);
    }
}
