//! Side-effecting half of an idle pass
//!
//! Each resource gets at most one mutation attempt per pass. Failures are
//! reported per resource and never retried here; the next polling cycle
//! re-evaluates from scratch.

mod cli;
mod idle;

pub use cli::CliActuator;
pub use idle::IdleActuator;

use crate::models::{ActuationOutcome, ActuationStatus};
use serde::Serialize;

/// Everything an actuator attempted during one pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActuationReport {
    pub ingresses: Vec<ActuationOutcome>,
    pub deployments: Vec<ActuationOutcome>,
    /// Set when ingress annotation failed and scaling was not attempted
    pub ingress_failure: Option<String>,
}

impl ActuationReport {
    pub fn aborted(&self) -> bool {
        self.ingress_failure.is_some()
    }

    /// Deployments actually scaled to zero
    pub fn scaled(&self) -> usize {
        self.deployments
            .iter()
            .filter(|o| o.status == ActuationStatus::Applied)
            .count()
    }

    pub fn failures(&self) -> usize {
        self.ingresses
            .iter()
            .chain(self.deployments.iter())
            .filter(|o| o.is_failure())
            .count()
    }
}
