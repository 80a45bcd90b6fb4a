//! Scale-down of CLI deployments
//!
//! CLI workloads are not woken by traffic, so no ingress or wake-up
//! metadata is written.

use crate::models::{
    ActuationOutcome, ActuationStatus, Environment, ResourceKind, WorkloadDescriptor,
};
use crate::patch;
use crate::repository::WorkloadRepository;
use crate::settings::IdlerSettings;
use std::sync::Arc;
use tracing::{error, info};

/// Scales eligible CLI deployments to zero replicas
pub struct CliActuator {
    repository: Arc<dyn WorkloadRepository>,
    settings: Arc<IdlerSettings>,
}

impl CliActuator {
    pub fn new(repository: Arc<dyn WorkloadRepository>, settings: Arc<IdlerSettings>) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Scale each workload to zero; one failure does not stop the rest
    pub async fn scale_down(
        &self,
        environment: &Environment,
        workloads: &[WorkloadDescriptor],
    ) -> Vec<ActuationOutcome> {
        let namespace = environment.namespace.as_str();
        let payload = patch::scale_to_zero();
        let mut outcomes = Vec::with_capacity(workloads.len());

        for workload in workloads {
            let status = if self.settings.dry_run {
                info!(namespace = %namespace, deployment = %workload.name, "Deployment would be scaled to 0");
                ActuationStatus::DryRun
            } else {
                match self
                    .repository
                    .patch_deployment(namespace, &workload.name, &payload)
                    .await
                {
                    Ok(()) => {
                        info!(namespace = %namespace, deployment = %workload.name, "Deployment scaled to 0");
                        ActuationStatus::Applied
                    }
                    Err(e) => {
                        error!(namespace = %namespace, deployment = %workload.name, error = %e, "Error scaling deployment");
                        ActuationStatus::Failed(e.to_string())
                    }
                }
            };

            outcomes.push(ActuationOutcome {
                kind: ResourceKind::Deployment,
                name: workload.name.clone(),
                status,
            });
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvironmentType;
    use crate::testing::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scales_with_plain_patch() {
        let repository = Arc::new(FakeRepository::new());
        let actuator = CliActuator::new(repository.clone(), Arc::new(IdlerSettings::default()));

        let outcomes = actuator
            .scale_down(
                &environment(EnvironmentType::Development),
                &[deployment("cli", "cli", 1)],
            )
            .await;

        assert_eq!(outcomes[0].status, ActuationStatus::Applied);
        let patches = repository.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].2, json!({"spec": {"replicas": 0}}));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        let repository =
            Arc::new(FakeRepository::new().failing_patch(ResourceKind::Deployment, "cli"));
        let actuator = CliActuator::new(repository.clone(), Arc::new(IdlerSettings::default()));

        let outcomes = actuator
            .scale_down(
                &environment(EnvironmentType::Development),
                &[deployment("cli", "cli", 1), deployment("cli-worker", "cli", 1)],
            )
            .await;

        assert!(outcomes[0].is_failure());
        assert_eq!(outcomes[1].status, ActuationStatus::Applied);
        assert_eq!(repository.patched(ResourceKind::Deployment), vec!["cli-worker"]);
    }

    #[tokio::test]
    async fn test_dry_run_mutates_nothing() {
        let repository = Arc::new(FakeRepository::new());
        let settings = IdlerSettings {
            dry_run: true,
            ..IdlerSettings::default()
        };
        let actuator = CliActuator::new(repository.clone(), Arc::new(settings));

        let outcomes = actuator
            .scale_down(
                &environment(EnvironmentType::Development),
                &[deployment("cli", "cli", 1)],
            )
            .await;

        assert_eq!(outcomes[0].status, ActuationStatus::DryRun);
        assert!(repository.patches().is_empty());
    }
}
