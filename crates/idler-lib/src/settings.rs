//! Idler settings shared by the evaluators and actuators

use crate::error::{IdlerError, Result};
use crate::selector::{LabelRequirement, LabelSelector, SelectorOperator};
use serde::{Deserialize, Serialize};

/// What an iteration does with the remaining deployments once it hits a
/// condition that ends processing of the current one.
///
/// The idler has always stopped the whole deployment loop (`Break`) on an
/// already-idled deployment and the whole pod loop on a probe failure.
/// Both defaults keep that behaviour; product owners have not yet decided
/// whether `Continue` should become the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPolicy {
    Continue,
    Break,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        LoopPolicy::Break
    }
}

/// Selectors and switches for CLI workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliSelectors {
    pub builds: LabelSelector,
    pub deployments: LabelSelector,
    pub pods: LabelSelector,
    pub skip_build_check: bool,
    pub skip_cron_check: bool,
    pub skip_process_check: bool,
    /// Applied when a deployment is already at zero replicas
    pub on_already_idled: LoopPolicy,
    /// Applied to the pod loop when a process probe fails
    pub on_probe_error: LoopPolicy,
}

impl Default for CliSelectors {
    fn default() -> Self {
        Self {
            builds: build_selector(),
            deployments: LabelSelector::equals("lagoon.sh/service", "cli"),
            pods: LabelSelector::equals("lagoon.sh/service", "cli"),
            skip_build_check: false,
            skip_cron_check: false,
            skip_process_check: false,
            on_already_idled: LoopPolicy::Break,
            on_probe_error: LoopPolicy::Break,
        }
    }
}

/// Selectors and switches for traffic-serving workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSelectors {
    pub builds: LabelSelector,
    pub deployments: LabelSelector,
    pub ingress: LabelSelector,
    pub skip_build_check: bool,
    pub skip_hit_check: bool,
    pub skip_ingress_patch: bool,
}

impl Default for ServiceSelectors {
    fn default() -> Self {
        Self {
            builds: build_selector(),
            deployments: LabelSelector::new(vec![
                LabelRequirement::new("lagoon.sh/service", SelectorOperator::Exists, &[]),
                LabelRequirement::new(
                    "lagoon.sh/service",
                    SelectorOperator::NotIn,
                    &[
                        "cli",
                        "mariadb",
                        "postgres",
                        "mongo",
                        "redis",
                        "solr",
                        "elasticsearch",
                    ],
                ),
            ]),
            ingress: LabelSelector::default(),
            skip_build_check: false,
            skip_hit_check: false,
            skip_ingress_patch: false,
        }
    }
}

fn build_selector() -> LabelSelector {
    LabelSelector::equals("lagoon.sh/jobType", "build")
}

/// Settings consumed by a single evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdlerSettings {
    /// Log intended mutations instead of applying them
    pub dry_run: bool,
    /// Emit per-pod detail lines
    pub debug: bool,
    /// Pod label whose value names the owning deployment
    pub service_name_label: String,
    /// Minimum pod age before an environment is considered for idling
    pub idle_minutes: u32,
    /// Traffic window for non-production environments, Prometheus duration syntax
    pub prometheus_check_interval: String,
    /// Domain used in the `idling.<domain>/` label and annotation keys
    pub idling_domain: String,
    /// Annotation prefix understood by the ingress controller
    pub ingress_annotation_prefix: String,
    /// Request counter exported by the ingress controller
    pub request_metric: String,
    pub cli: CliSelectors,
    pub service: ServiceSelectors,
}

impl Default for IdlerSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            debug: false,
            service_name_label: "lagoon.sh/service".to_string(),
            idle_minutes: 240,
            prometheus_check_interval: "4h".to_string(),
            idling_domain: "amazee.io".to_string(),
            ingress_annotation_prefix: "nginx.ingress.kubernetes.io".to_string(),
            request_metric: "nginx_ingress_controller_requests".to_string(),
            cli: CliSelectors::default(),
            service: ServiceSelectors::default(),
        }
    }
}

impl IdlerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.idle_minutes == 0 {
            return Err(IdlerError::Config("idle_minutes must be positive".into()));
        }
        if !is_prometheus_duration(&self.prometheus_check_interval) {
            return Err(IdlerError::Config(format!(
                "prometheus_check_interval {:?} is not a Prometheus duration",
                self.prometheus_check_interval
            )));
        }
        if self.service_name_label.is_empty() {
            return Err(IdlerError::Config("service_name_label is empty".into()));
        }

        for selector in [
            &self.cli.builds,
            &self.cli.deployments,
            &self.cli.pods,
            &self.service.builds,
            &self.service.deployments,
            &self.service.ingress,
        ] {
            selector.validate()?;
        }
        Ok(())
    }

    /// Full key for an idling label or annotation, e.g. `idling.amazee.io/watch`
    pub fn idling_key(&self, name: &str) -> String {
        format!("idling.{}/{}", self.idling_domain, name)
    }
}

/// Accepts the single-unit form, e.g. `30m`, `4h`, `1d`
fn is_prometheus_duration(value: &str) -> bool {
    let Some(unit) = value.chars().last() else {
        return false;
    };
    let digits = &value[..value.len() - unit.len_utf8()];
    matches!(unit, 's' | 'm' | 'h' | 'd' | 'w' | 'y')
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
}
