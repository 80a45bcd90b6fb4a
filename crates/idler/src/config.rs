//! Idler process configuration

use anyhow::{bail, Context, Result};
use idler_lib::{
    CycleOptions, IdlerSettings, LabelRequirement, LabelSelector, SelectorOperator,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Everything the process needs; pass-level settings live under `idler`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Port for /healthz, /readyz and /metrics
    pub api_port: u16,

    /// Seconds between idle cycles
    pub poll_interval_secs: u64,

    pub prometheus_url: String,

    /// Upper bound on a single traffic query
    pub prometheus_timeout_secs: u64,

    /// Namespaces that are considered environments
    pub namespace_selector: LabelSelector,

    pub environment_type_label: String,

    pub project_label: String,

    pub cli_enabled: bool,

    pub service_enabled: bool,

    pub max_concurrent_environments: usize,

    pub idler: IdlerSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            poll_interval_secs: 300,
            prometheus_url: "http://prometheus:9090".to_string(),
            prometheus_timeout_secs: 10,
            namespace_selector: LabelSelector::new(vec![LabelRequirement::new(
                "lagoon.sh/environmentType",
                SelectorOperator::Exists,
                &[],
            )]),
            environment_type_label: "lagoon.sh/environmentType".to_string(),
            project_label: "lagoon.sh/project".to_string(),
            cli_enabled: true,
            service_enabled: true,
            max_concurrent_environments: 4,
            idler: IdlerSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from an optional file, then `IDLER_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `IDLER_IDLER__DRY_RUN=true`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("IDLER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be positive");
        }
        if self.prometheus_timeout_secs == 0 {
            bail!("prometheus_timeout_secs must be positive");
        }
        if self.max_concurrent_environments == 0 {
            bail!("max_concurrent_environments must be positive");
        }
        if !self.cli_enabled && !self.service_enabled {
            bail!("at least one of cli_enabled and service_enabled must be set");
        }
        self.namespace_selector
            .validate()
            .context("Invalid namespace_selector")?;
        self.idler.validate().context("Invalid idler settings")?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn prometheus_timeout(&self) -> Duration {
        Duration::from_secs(self.prometheus_timeout_secs)
    }

    pub fn cycle_options(&self) -> CycleOptions {
        CycleOptions {
            cli_enabled: self.cli_enabled,
            service_enabled: self.service_enabled,
            max_concurrent_environments: self.max_concurrent_environments,
        }
    }
}
