//! Ingress traffic probe

use super::{MetricsQuerier, Sample};
use crate::error::{IdlerError, Result};
use crate::models::EnvironmentType;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Time range used to look for traffic.
///
/// Production environments look back over the idle threshold itself,
/// everything else over the configured check interval.
pub fn traffic_window(
    environment_type: &EnvironmentType,
    idle_minutes: u32,
    check_interval: &str,
) -> String {
    if environment_type.is_production() {
        format!("{}m", idle_minutes)
    } else {
        check_interval.to_string()
    }
}

pub struct TrafficProbe {
    querier: Arc<dyn MetricsQuerier>,
    request_metric: String,
    timeout: Duration,
}

impl TrafficProbe {
    pub fn new(
        querier: Arc<dyn MetricsQuerier>,
        request_metric: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            querier,
            request_metric: request_metric.into(),
            timeout,
        }
    }

    /// Requests per status code, rounded
    pub fn query(&self, namespace: &str, window: &str) -> String {
        format!(
            "round(sum(increase({}{{exported_namespace=\"{}\"}}[{}])) by (status))",
            self.request_metric, namespace, window
        )
    }

    /// Total requests to the namespace's ingresses over the window.
    ///
    /// Bounded by the probe's own timeout regardless of the caller.
    pub async fn hits(&self, namespace: &str, window: &str, now: DateTime<Utc>) -> Result<i64> {
        let query = self.query(namespace, window);
        debug!(namespace = %namespace, query = %query, "Querying request counts");

        let samples = tokio::time::timeout(self.timeout, self.querier.query(&query, now))
            .await
            .map_err(|_| IdlerError::QueryTimeout(self.timeout))??;

        Ok(sum_hits(&samples))
    }
}

/// Sum sample values; non-finite values count as zero
fn sum_hits(samples: &[Sample]) -> i64 {
    samples
        .iter()
        .filter(|s| s.value.is_finite())
        .map(|s| s.value.round() as i64)
        .sum()
}
