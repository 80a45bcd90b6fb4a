//! Capabilities the idler needs from the cluster
//!
//! Evaluators and actuators only see these traits. The Kubernetes-backed
//! implementations live in the `kubernetes` submodule.

mod kubernetes;

pub use kubernetes::{KubePodExecutor, KubeRepository};

use crate::error::Result;
use crate::models::{
    BuildSnapshot, Environment, IngressDescriptor, PodSnapshot, WorkloadDescriptor,
};
use crate::selector::LabelSelector;
use async_trait::async_trait;
use serde_json::Value;

/// List and merge-patch access to the resources of a namespace
#[async_trait]
pub trait WorkloadRepository: Send + Sync {
    /// List namespaces matching the selector as environments
    async fn list_environments(&self, selector: &LabelSelector) -> Result<Vec<Environment>>;

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<WorkloadDescriptor>>;

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector)
        -> Result<Vec<PodSnapshot>>;

    /// List build pods; only their phase matters
    async fn list_builds(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<BuildSnapshot>> {
        let pods = self.list_pods(namespace, selector).await?;
        Ok(pods.into_iter().map(BuildSnapshot::from).collect())
    }

    async fn list_ingresses(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<IngressDescriptor>>;

    /// Apply a JSON merge patch to a deployment
    async fn patch_deployment(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>;

    /// Apply a JSON merge patch to an ingress
    async fn patch_ingress(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>;
}

/// Runs a command inside a pod and returns its standard output
#[async_trait]
pub trait PodExecutor: Send + Sync {
    async fn exec(&self, namespace: &str, pod: &str, command: &[&str]) -> Result<String>;
}
