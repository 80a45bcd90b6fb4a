//! Workload idling core
//!
//! This crate provides:
//! - Idle eligibility evaluation for CLI and service workloads
//! - Activity probing (in-pod process counts) and traffic probing (Prometheus)
//! - Two-phase idle actuation (ingress annotation, then deployment scale-down)
//! - Kubernetes and Prometheus adapters behind capability traits
//! - Health checks and observability

pub mod actuator;
pub mod driver;
pub mod eligibility;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod patch;
pub mod probe;
pub mod repository;
pub mod selector;
pub mod settings;

#[cfg(test)]
mod testing;

pub use actuator::{ActuationReport, CliActuator, IdleActuator};
pub use driver::{CycleOptions, CycleSummary, IdlePath, Idler, PassReport};
pub use eligibility::{CliEligibilityEvaluator, ServiceEligibilityEvaluator};
pub use error::{IdlerError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, CycleRecord, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{IdlerMetrics, StructuredLogger};
pub use probe::{ActivityProbe, MetricsQuerier, PrometheusQuerier, Sample, TrafficProbe};
pub use repository::{KubePodExecutor, KubeRepository, PodExecutor, WorkloadRepository};
pub use selector::{LabelRequirement, LabelSelector, SelectorOperator};
pub use settings::{CliSelectors, IdlerSettings, LoopPolicy, ServiceSelectors};
