//! Point-in-time snapshots of the cluster resources the idler reasons about

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label or annotation map, ordered so log output and patches are stable
pub type Labels = BTreeMap<String, String>;

/// Environment type as recorded on the namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Production,
    Development,
    Other(String),
}

impl EnvironmentType {
    pub fn from_label(value: Option<&str>) -> Self {
        match value {
            Some("production") => EnvironmentType::Production,
            Some("development") => EnvironmentType::Development,
            Some(other) => EnvironmentType::Other(other.to_string()),
            None => EnvironmentType::Other(String::new()),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, EnvironmentType::Production)
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentType::Production => write!(f, "production"),
            EnvironmentType::Development => write!(f, "development"),
            EnvironmentType::Other(value) => write!(f, "{}", value),
        }
    }
}

/// A namespace representing one deployed instance of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub namespace: String,
    pub project: Option<String>,
    pub environment_type: EnvironmentType,
    pub labels: Labels,
}

impl Environment {
    pub fn new(namespace: impl Into<String>, environment_type: EnvironmentType) -> Self {
        Self {
            namespace: namespace.into(),
            project: None,
            environment_type,
            labels: Labels::new(),
        }
    }
}

/// Environment variable declared on a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: Option<String>,
}

/// Container summary taken from a deployment's pod template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    pub env: Vec<EnvVar>,
}

/// A deployment as seen at listing time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub labels: Labels,
    pub containers: Vec<ContainerSummary>,
    /// Labels stamped onto pods created from this deployment
    pub template_labels: Labels,
}

impl WorkloadDescriptor {
    pub fn is_idled(&self) -> bool {
        self.replicas == 0
    }
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The parts of a pod the evaluators read: labels, owner, start time and phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
    /// Name of the first owner reference, usually a ReplicaSet
    pub owner: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub phase: PodPhase,
}

impl PodSnapshot {
    /// Whole minutes elapsed since the pod started, truncated
    pub fn minutes_running(&self, now: DateTime<Utc>) -> Option<i64> {
        self.start_time.map(|start| (now - start).num_minutes())
    }
}

/// A build pod's phase; Running or Pending builds block idling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSnapshot {
    pub name: String,
    pub phase: PodPhase,
}

impl From<PodSnapshot> for BuildSnapshot {
    fn from(pod: PodSnapshot) -> Self {
        Self {
            name: pod.name,
            phase: pod.phase,
        }
    }
}

/// An ingress that routes to an environment.
///
/// Annotated before its backends are scaled so the router serves the
/// unidle page instead of an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressDescriptor {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
    pub annotations: Labels,
}

/// Why an environment or workload was, or was not, judged idle-eligible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Eligible,
    BuildInProgress,
    ListingFailed,
    NoCandidates,
    PodsWithinThreshold,
    TrafficObserved { hits: i64 },
    MetricsUnavailable,
}

impl Verdict {
    /// Short label used for metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Eligible => "eligible",
            Verdict::BuildInProgress => "build_in_progress",
            Verdict::ListingFailed => "listing_failed",
            Verdict::NoCandidates => "no_candidates",
            Verdict::PodsWithinThreshold => "pods_within_threshold",
            Verdict::TrafficObserved { .. } => "traffic_observed",
            Verdict::MetricsUnavailable => "metrics_unavailable",
        }
    }
}

/// Outcome of an evaluator: the verdict and the workloads it applies to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub verdict: Verdict,
    pub matched_workloads: Vec<WorkloadDescriptor>,
}

impl EligibilityDecision {
    pub fn eligible(matched_workloads: Vec<WorkloadDescriptor>) -> Self {
        Self {
            verdict: Verdict::Eligible,
            matched_workloads,
        }
    }

    pub fn skipped(verdict: Verdict) -> Self {
        Self {
            verdict,
            matched_workloads: Vec::new(),
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.verdict == Verdict::Eligible && !self.matched_workloads.is_empty()
    }
}

/// Kind of resource touched by an actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Deployment,
    Pod,
    Ingress,
    Namespace,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Deployment => write!(f, "deployment"),
            ResourceKind::Pod => write!(f, "pod"),
            ResourceKind::Ingress => write!(f, "ingress"),
            ResourceKind::Namespace => write!(f, "namespace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationStatus {
    Applied,
    DryRun,
    Failed(String),
}

/// Per-resource result of a single at-most-once mutation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuationOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub status: ActuationStatus,
}

impl ActuationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ActuationStatus::Failed(_))
    }
}
