//! Health tracking for the idler process
//!
//! Backs the liveness and readiness endpoints. Each finished cycle is
//! folded into per-component status by [`HealthRegistry::record_cycle`];
//! the process reports ready once a cycle has completed.

use crate::driver::CycleSummary;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but the last interaction reported a problem
    Degraded,
    /// Failing; liveness reports 503
    Unhealthy,
}

impl ComponentStatus {
    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Outcome of the most recent idle cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub environments: usize,
    pub deployments_idled: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleRecord>,
}

/// Worst status across all components; healthy when there are none
pub fn overall_status<'a>(
    components: impl IntoIterator<Item = &'a ComponentHealth>,
) -> ComponentStatus {
    components
        .into_iter()
        .map(|health| health.status)
        .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
            (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                ComponentStatus::Unhealthy
            }
            (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                ComponentStatus::Degraded
            }
            _ => ComponentStatus::Healthy,
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    /// Namespace listing and resource patching
    pub const KUBE_API: &str = "kube_api";
    /// Traffic queries
    pub const PROMETHEUS: &str = "prometheus";
    /// The polling loop itself
    pub const POLLER: &str = "poller";
}

#[derive(Debug, Default)]
struct HealthState {
    components: HashMap<String, ComponentHealth>,
    last_cycle: Option<CycleRecord>,
}

/// Shared, cloneable view of component health and cycle progress
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Fold a finished cycle into component health.
    ///
    /// A namespace listing failure marks `kube_api` unhealthy. Environments
    /// whose traffic could not be measured mark `prometheus` degraded. The
    /// poller is healthy whenever a cycle finishes at all.
    pub async fn record_cycle(&self, outcome: &Result<CycleSummary>) {
        let mut state = self.state.write().await;
        let mut set = |name: &str, health: ComponentHealth| {
            state.components.insert(name.to_string(), health);
        };

        set(components::POLLER, ComponentHealth::healthy());
        match outcome {
            Ok(summary) => {
                set(components::KUBE_API, ComponentHealth::healthy());
                let prometheus = match summary.metrics_unavailable {
                    0 => ComponentHealth::healthy(),
                    n => ComponentHealth::degraded(format!(
                        "traffic query failed for {} environment(s)",
                        n
                    )),
                };
                set(components::PROMETHEUS, prometheus);
            }
            Err(e) => set(components::KUBE_API, ComponentHealth::unhealthy(e.to_string())),
        }

        let summary = outcome.as_ref().ok();
        state.last_cycle = Some(CycleRecord {
            finished_at: Utc::now(),
            succeeded: summary.is_some(),
            environments: summary.map_or(0, |s| s.environments),
            deployments_idled: summary.map_or(0, |s| s.deployments_idled),
        });
    }

    pub async fn last_cycle(&self) -> Option<CycleRecord> {
        self.state.read().await.last_cycle.clone()
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: overall_status(state.components.values()),
            components: state.components.clone(),
            last_cycle: state.last_cycle.clone(),
        }
    }

    /// Ready once a cycle has completed and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if state.last_cycle.is_none() {
            Some("no idle cycle has completed yet".to_string())
        } else {
            let mut failing: Vec<&str> = state
                .components
                .iter()
                .filter(|(_, health)| !health.status.is_operational())
                .map(|(name, _)| name.as_str())
                .collect();
            failing.sort_unstable();
            (!failing.is_empty()).then(|| format!("unhealthy: {}", failing.join(", ")))
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
