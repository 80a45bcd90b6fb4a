//! Probes for live activity inside an environment
//!
//! - [`ActivityProbe`] counts user processes inside a CLI pod
//! - [`TrafficProbe`] sums ingress requests for a namespace over a window

mod activity;
mod querier;
mod traffic;

pub use activity::{parse_process_count, ActivityProbe, PROCESS_COUNT_COMMAND};
pub use querier::PrometheusQuerier;
pub use traffic::{traffic_window, TrafficProbe};

use crate::error::Result;
use crate::models::Labels;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One series of an instant-vector query result
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: f64,
}

/// Instant query access to a metrics backend
#[async_trait]
pub trait MetricsQuerier: Send + Sync {
    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>>;
}
