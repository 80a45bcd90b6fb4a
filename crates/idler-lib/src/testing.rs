//! In-memory fakes for the cluster capabilities, used by unit tests

use crate::error::{IdlerError, Result};
use crate::models::{
    ContainerSummary, EnvVar, Environment, IngressDescriptor, Labels, PodPhase, PodSnapshot,
    ResourceKind, WorkloadDescriptor,
};
use crate::probe::{MetricsQuerier, Sample};
use crate::repository::{PodExecutor, WorkloadRepository};
use crate::selector::LabelSelector;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const NAMESPACE: &str = "project-main";

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn deployment(name: &str, service: &str, replicas: i32) -> WorkloadDescriptor {
    WorkloadDescriptor {
        name: name.to_string(),
        namespace: NAMESPACE.to_string(),
        replicas,
        labels: labels(&[("lagoon.sh/service", service)]),
        containers: vec![ContainerSummary {
            name: service.to_string(),
            env: Vec::new(),
        }],
        template_labels: labels(&[("lagoon.sh/service", service)]),
    }
}

pub fn with_cronjobs(mut workload: WorkloadDescriptor, value: &str) -> WorkloadDescriptor {
    workload.containers[0].env.push(EnvVar {
        name: "CRONJOBS".to_string(),
        value: Some(value.to_string()),
    });
    workload
}

pub fn pod(name: &str, service: &str, started: Option<DateTime<Utc>>) -> PodSnapshot {
    PodSnapshot {
        name: name.to_string(),
        namespace: NAMESPACE.to_string(),
        labels: labels(&[("lagoon.sh/service", service)]),
        owner: None,
        start_time: started,
        phase: PodPhase::Running,
    }
}

pub fn pod_aged(name: &str, service: &str, now: DateTime<Utc>, minutes: i64) -> PodSnapshot {
    pod(name, service, Some(now - ChronoDuration::minutes(minutes)))
}

pub fn build_pod(name: &str, phase: PodPhase) -> PodSnapshot {
    PodSnapshot {
        name: name.to_string(),
        namespace: NAMESPACE.to_string(),
        labels: labels(&[("lagoon.sh/jobType", "build")]),
        owner: None,
        start_time: None,
        phase,
    }
}

pub fn ingress(name: &str) -> IngressDescriptor {
    IngressDescriptor {
        name: name.to_string(),
        namespace: NAMESPACE.to_string(),
        labels: Labels::new(),
        annotations: Labels::new(),
    }
}

pub fn environment(environment_type: crate::models::EnvironmentType) -> Environment {
    Environment::new(NAMESPACE, environment_type)
}

/// Repository over fixed resource lists that records every patch
#[derive(Default)]
pub struct FakeRepository {
    environments: Vec<Environment>,
    deployments: Vec<WorkloadDescriptor>,
    pods: Vec<PodSnapshot>,
    ingresses: Vec<IngressDescriptor>,
    failing_lists: HashSet<ResourceKind>,
    failing_pod_selectors: HashSet<String>,
    failing_patches: HashSet<(ResourceKind, String)>,
    patches: Mutex<Vec<(ResourceKind, String, Value)>>,
    pod_lists: Mutex<Vec<String>>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn with_deployment(mut self, deployment: WorkloadDescriptor) -> Self {
        self.deployments.push(deployment);
        self
    }

    pub fn with_pod(mut self, pod: PodSnapshot) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_ingress(mut self, ingress: IngressDescriptor) -> Self {
        self.ingresses.push(ingress);
        self
    }

    pub fn failing_list(mut self, kind: ResourceKind) -> Self {
        self.failing_lists.insert(kind);
        self
    }

    /// Fail pod listings whose rendered selector equals `query`
    pub fn failing_pod_list(mut self, query: &str) -> Self {
        self.failing_pod_selectors.insert(query.to_string());
        self
    }

    pub fn failing_patch(mut self, kind: ResourceKind, name: &str) -> Self {
        self.failing_patches.insert((kind, name.to_string()));
        self
    }

    /// Successful patches, in order
    pub fn patches(&self) -> Vec<(ResourceKind, String, Value)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn patched(&self, kind: ResourceKind) -> Vec<String> {
        self.patches()
            .into_iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, name, _)| name)
            .collect()
    }

    /// Selectors of every pod listing, in order
    pub fn pod_lists(&self) -> Vec<String> {
        self.pod_lists.lock().unwrap().clone()
    }

    fn check_list(&self, kind: ResourceKind, namespace: &str) -> Result<()> {
        if self.failing_lists.contains(&kind) {
            return Err(IdlerError::listing(kind, namespace, "injected failure"));
        }
        Ok(())
    }

    fn record_patch(&self, kind: ResourceKind, name: &str, patch: &Value) -> Result<()> {
        if self.failing_patches.contains(&(kind, name.to_string())) {
            return Err(IdlerError::patch(kind, name, "injected failure"));
        }
        self.patches
            .lock()
            .unwrap()
            .push((kind, name.to_string(), patch.clone()));
        Ok(())
    }
}

#[async_trait]
impl WorkloadRepository for FakeRepository {
    async fn list_environments(&self, selector: &LabelSelector) -> Result<Vec<Environment>> {
        self.check_list(ResourceKind::Namespace, "*")?;
        Ok(self
            .environments
            .iter()
            .filter(|e| selector.matches(&e.labels))
            .cloned()
            .collect())
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<WorkloadDescriptor>> {
        self.check_list(ResourceKind::Deployment, namespace)?;
        Ok(self
            .deployments
            .iter()
            .filter(|d| d.namespace == namespace && selector.matches(&d.labels))
            .cloned()
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodSnapshot>> {
        let query = selector.to_query();
        self.pod_lists.lock().unwrap().push(query.clone());
        self.check_list(ResourceKind::Pod, namespace)?;
        if self.failing_pod_selectors.contains(&query) {
            return Err(IdlerError::listing(ResourceKind::Pod, namespace, "injected failure"));
        }
        Ok(self
            .pods
            .iter()
            .filter(|p| p.namespace == namespace && selector.matches(&p.labels))
            .cloned()
            .collect())
    }

    async fn list_ingresses(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<IngressDescriptor>> {
        self.check_list(ResourceKind::Ingress, namespace)?;
        Ok(self
            .ingresses
            .iter()
            .filter(|i| i.namespace == namespace && selector.matches(&i.labels))
            .cloned()
            .collect())
    }

    async fn patch_deployment(&self, _namespace: &str, name: &str, patch: &Value) -> Result<()> {
        self.record_patch(ResourceKind::Deployment, name, patch)
    }

    async fn patch_ingress(&self, _namespace: &str, name: &str, patch: &Value) -> Result<()> {
        self.record_patch(ResourceKind::Ingress, name, patch)
    }
}

/// Executor returning canned output per pod; unknown pods fail
#[derive(Default)]
pub struct FakeExecutor {
    outputs: HashMap<String, Option<String>>,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, pod: &str, output: &str) -> Self {
        self.outputs.insert(pod.to_string(), Some(output.to_string()));
        self
    }

    pub fn with_failure(mut self, pod: &str) -> Self {
        self.outputs.insert(pod.to_string(), None);
        self
    }

    /// (namespace, pod, command) for every exec
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn probed_pods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, pod, _)| pod).collect()
    }
}

#[async_trait]
impl PodExecutor for FakeExecutor {
    async fn exec(&self, namespace: &str, pod: &str, command: &[&str]) -> Result<String> {
        self.calls.lock().unwrap().push((
            namespace.to_string(),
            pod.to_string(),
            command.join(" "),
        ));
        match self.outputs.get(pod) {
            Some(Some(output)) => Ok(output.clone()),
            _ => Err(IdlerError::ProbeExec {
                pod: pod.to_string(),
                message: "container not found".to_string(),
            }),
        }
    }
}

pub fn sample(status: &str, value: f64) -> Sample {
    Sample {
        labels: labels(&[("status", status)]),
        value,
    }
}

/// Querier returning a canned result
pub struct FakeQuerier {
    result: Option<Vec<Sample>>,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl FakeQuerier {
    pub fn returning(samples: Vec<Sample>) -> Self {
        Self {
            result: Some(samples),
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: None,
            delay: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsQuerier for FakeQuerier {
    async fn query(&self, query: &str, _at: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result
            .clone()
            .ok_or_else(|| IdlerError::Query("connection refused".to_string()))
    }
}
