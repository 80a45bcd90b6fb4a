//! Kubernetes API backed repository and pod executor

use super::{PodExecutor, WorkloadRepository};
use crate::error::{IdlerError, Result};
use crate::models::{
    ContainerSummary, EnvVar, Environment, EnvironmentType, IngressDescriptor, PodPhase,
    PodSnapshot, ResourceKind, WorkloadDescriptor,
};
use crate::selector::LabelSelector;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{AttachParams, ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Replica count the API server assumes when `spec.replicas` is unset
const DEFAULT_REPLICAS: i32 = 1;

/// Repository over a live cluster
#[derive(Clone)]
pub struct KubeRepository {
    client: Client,
    /// Namespace label holding the project name
    project_label: String,
    /// Namespace label holding the environment type
    environment_type_label: String,
}

impl KubeRepository {
    pub fn new(
        client: Client,
        project_label: impl Into<String>,
        environment_type_label: impl Into<String>,
    ) -> Self {
        Self {
            client,
            project_label: project_label.into(),
            environment_type_label: environment_type_label.into(),
        }
    }

    fn list_params(selector: &LabelSelector) -> ListParams {
        let params = ListParams::default();
        if selector.is_empty() {
            params
        } else {
            params.labels(&selector.to_query())
        }
    }

    fn to_environment(&self, namespace: Namespace) -> Environment {
        let labels = namespace.metadata.labels.unwrap_or_default();
        Environment {
            namespace: namespace.metadata.name.unwrap_or_default(),
            project: labels.get(&self.project_label).cloned(),
            environment_type: EnvironmentType::from_label(
                labels.get(&self.environment_type_label).map(String::as_str),
            ),
            labels,
        }
    }
}

fn to_workload(deployment: Deployment) -> WorkloadDescriptor {
    let spec = deployment.spec.unwrap_or_default();
    let containers = spec
        .template
        .spec
        .map(|pod_spec| pod_spec.containers)
        .unwrap_or_default()
        .into_iter()
        .map(|container| ContainerSummary {
            name: container.name,
            env: container
                .env
                .unwrap_or_default()
                .into_iter()
                .map(|var| EnvVar {
                    name: var.name,
                    value: var.value,
                })
                .collect(),
        })
        .collect();

    WorkloadDescriptor {
        name: deployment.metadata.name.unwrap_or_default(),
        namespace: deployment.metadata.namespace.unwrap_or_default(),
        replicas: spec.replicas.unwrap_or(DEFAULT_REPLICAS),
        labels: deployment.metadata.labels.unwrap_or_default(),
        containers,
        template_labels: spec
            .template
            .metadata
            .and_then(|meta| meta.labels)
            .unwrap_or_default(),
    }
}

fn to_pod(pod: Pod) -> PodSnapshot {
    let status = pod.status.unwrap_or_default();
    PodSnapshot {
        name: pod.metadata.name.unwrap_or_default(),
        namespace: pod.metadata.namespace.unwrap_or_default(),
        labels: pod.metadata.labels.unwrap_or_default(),
        owner: pod
            .metadata
            .owner_references
            .and_then(|refs| refs.into_iter().next())
            .map(|owner| owner.name),
        start_time: status.start_time.map(|time| time.0),
        phase: PodPhase::parse(status.phase.as_deref()),
    }
}

fn to_ingress(ingress: Ingress) -> IngressDescriptor {
    IngressDescriptor {
        name: ingress.metadata.name.unwrap_or_default(),
        namespace: ingress.metadata.namespace.unwrap_or_default(),
        labels: ingress.metadata.labels.unwrap_or_default(),
        annotations: ingress.metadata.annotations.unwrap_or_default(),
    }
}

#[async_trait]
impl WorkloadRepository for KubeRepository {
    async fn list_environments(&self, selector: &LabelSelector) -> Result<Vec<Environment>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&Self::list_params(selector))
            .await
            .map_err(|e| IdlerError::listing(ResourceKind::Namespace, "*", e))?;
        Ok(list
            .items
            .into_iter()
            .map(|ns| self.to_environment(ns))
            .collect())
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<WorkloadDescriptor>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&Self::list_params(selector))
            .await
            .map_err(|e| IdlerError::listing(ResourceKind::Deployment, namespace, e))?;
        Ok(list.items.into_iter().map(to_workload).collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodSnapshot>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&Self::list_params(selector))
            .await
            .map_err(|e| IdlerError::listing(ResourceKind::Pod, namespace, e))?;
        Ok(list.items.into_iter().map(to_pod).collect())
    }

    async fn list_ingresses(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<IngressDescriptor>> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&Self::list_params(selector))
            .await
            .map_err(|e| IdlerError::listing(ResourceKind::Ingress, namespace, e))?;
        Ok(list.items.into_iter().map(to_ingress).collect())
    }

    async fn patch_deployment(&self, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| IdlerError::patch(ResourceKind::Deployment, name, e))?;
        Ok(())
    }

    async fn patch_ingress(&self, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| IdlerError::patch(ResourceKind::Ingress, name, e))?;
        Ok(())
    }
}

/// Pod executor using the exec subresource over a websocket
#[derive(Clone)]
pub struct KubePodExecutor {
    client: Client,
}

impl KubePodExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodExecutor for KubePodExecutor {
    async fn exec(&self, namespace: &str, pod: &str, command: &[&str]) -> Result<String> {
        let exec_error = |message: String| IdlerError::ProbeExec {
            pod: pod.to_string(),
            message,
        };

        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .stdin(false)
            .stdout(true)
            .stderr(false);

        debug!(namespace = %namespace, pod = %pod, "Executing command in pod");
        let mut attached = api
            .exec(pod, command.iter().copied(), &params)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let mut output = String::new();
        if let Some(mut stdout) = attached.stdout() {
            stdout
                .read_to_string(&mut output)
                .await
                .map_err(|e| exec_error(e.to_string()))?;
        }
        attached
            .join()
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        Ok(output)
    }
}
