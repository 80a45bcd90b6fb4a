//! Live process probe for CLI pods

use crate::error::Result;
use crate::repository::PodExecutor;
use std::sync::Arc;
use tracing::warn;

/// Counts processes parented by PID 0, skipping the first two lines
/// (the container's init and the probing shell itself)
pub const PROCESS_COUNT_COMMAND: [&str; 3] = [
    "/bin/sh",
    "-c",
    "pgrep -P 0|tail -n +3|wc -l|tr -d ' '",
];

/// Derive the active process count from trimmed probe output.
///
/// Only the last character is read, so `"12"` yields `2`. Returns `None`
/// when that character is missing or not a decimal digit.
pub fn parse_process_count(trimmed: &str) -> Option<u32> {
    trimmed.chars().last()?.to_digit(10)
}

pub struct ActivityProbe {
    executor: Arc<dyn PodExecutor>,
}

impl ActivityProbe {
    pub fn new(executor: Arc<dyn PodExecutor>) -> Self {
        Self { executor }
    }

    /// Raw output of the process count command
    pub async fn raw_output(&self, namespace: &str, pod: &str) -> Result<String> {
        self.executor
            .exec(namespace, pod, &PROCESS_COUNT_COMMAND)
            .await
    }

    /// Active user processes in the pod.
    ///
    /// Unparseable output counts as zero processes, which makes the pod
    /// look idle. The fallback is logged so operators can spot it.
    pub async fn active_processes(&self, namespace: &str, pod: &str) -> Result<u32> {
        let output = self.raw_output(namespace, pod).await?;
        let trimmed = output.trim();

        match parse_process_count(trimmed) {
            Some(count) => Ok(count),
            None => {
                warn!(
                    event = "probe_parse_fallback",
                    namespace = %namespace,
                    pod = %pod,
                    output = %trimmed,
                    "Could not parse process count, assuming no active processes"
                );
                crate::observability::IdlerMetrics::new().inc_probe_parse_fallbacks();
                Ok(0)
            }
        }
    }
}
