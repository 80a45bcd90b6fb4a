//! Prometheus HTTP API client for instant queries

use super::{MetricsQuerier, Sample};
use crate::error::{IdlerError, Result};
use crate::models::Labels;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Queries `/api/v1/query` on a Prometheus-compatible server
pub struct PrometheusQuerier {
    client: Client,
    base_url: Url,
}

impl PrometheusQuerier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdlerError::Config(format!("failed to create HTTP client: {}", e)))?;

        // Keep any path prefix when joining the API path below
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| IdlerError::Config(format!("invalid Prometheus URL: {}", e)))?;

        Ok(Self { client, base_url })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: Labels,
    value: (f64, String),
}

fn parse_response(response: QueryResponse) -> Result<Vec<Sample>> {
    if response.status != "success" {
        return Err(IdlerError::Query(
            response
                .error
                .unwrap_or_else(|| format!("status {}", response.status)),
        ));
    }
    if !response.warnings.is_empty() {
        warn!(warnings = ?response.warnings, "Prometheus returned warnings");
    }

    let Some(data) = response.data else {
        return Ok(Vec::new());
    };
    if data.result_type != "vector" {
        return Ok(Vec::new());
    }

    let samples: Vec<VectorSample> = serde_json::from_value(data.result)
        .map_err(|e| IdlerError::Query(format!("malformed vector result: {}", e)))?;

    Ok(samples
        .into_iter()
        .map(|s| Sample {
            labels: s.metric,
            value: s.value.1.parse().unwrap_or(f64::NAN),
        })
        .collect())
}

#[async_trait]
impl MetricsQuerier for PrometheusQuerier {
    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>> {
        let url = self
            .base_url
            .join("api/v1/query")
            .map_err(|e| IdlerError::Query(e.to_string()))?;
        let time = at.timestamp().to_string();

        let response = self
            .client
            .get(url)
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await
            .map_err(|e| IdlerError::Query(format!("request failed: {}", e)))?;

        let status = response.status();
        let body: QueryResponse = response.json().await.map_err(|e| {
            IdlerError::Query(format!("failed to parse response ({}): {}", status, e))
        })?;

        parse_response(body)
    }
}
