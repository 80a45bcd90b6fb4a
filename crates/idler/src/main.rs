//! Workload Idler - scales inactive environments to zero
//!
//! Runs as a single Deployment in the cluster. Every poll interval it
//! lists environment namespaces and idles the CLI and service workloads
//! that are no longer in use.

use anyhow::{Context, Result};
use clap::Parser;
use idler_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    CycleSummary, Idler, KubePodExecutor, KubeRepository, PrometheusQuerier,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const IDLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Workload idler
#[derive(Parser)]
#[command(name = "workload-idler")]
#[command(author, version, about = "Scales inactive environments to zero", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "IDLER_CONFIG")]
    config: Option<PathBuf>,

    /// Log intended changes without patching anything
    #[arg(long)]
    dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Override the health/metrics port
    #[arg(long)]
    api_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let mut config = config::AppConfig::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.idler.dry_run = true;
    }
    if let Some(port) = cli.api_port {
        config.api_port = port;
    }
    info!(
        namespace_selector = %config.namespace_selector.to_query(),
        poll_interval_secs = config.poll_interval_secs,
        dry_run = config.idler.dry_run,
        "Idler configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::KUBE_API).await;
    health_registry.register(components::PROMETHEUS).await;
    health_registry.register(components::POLLER).await;

    let logger = StructuredLogger::new(
        std::env::var("POD_NAME").unwrap_or_else(|_| "workload-idler".to_string()),
    );
    logger.log_startup(IDLER_VERSION, config.idler.dry_run);

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let repository = Arc::new(KubeRepository::new(
        client.clone(),
        config.project_label.clone(),
        config.environment_type_label.clone(),
    ));
    let executor = Arc::new(KubePodExecutor::new(client));
    let querier = Arc::new(
        PrometheusQuerier::new(&config.prometheus_url, config.prometheus_timeout())
            .context("Failed to create Prometheus client")?,
    );

    let idler = Arc::new(
        Idler::new(
            repository,
            executor,
            querier,
            config.idler.clone(),
            config.prometheus_timeout(),
        )
        .with_options(config.cycle_options())
        .with_logger(logger.clone()),
    );

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    if cli.once {
        let outcome = run_cycle(&idler, &config, &health_registry).await;
        logger.log_shutdown("single cycle complete");
        api_handle.abort();
        return outcome.map(|_| ());
    }

    let mut interval = poll_ticker(config.poll_interval());
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_cycle(&idler, &config, &health_registry).await {
                    error!(error = %e, "Idle cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                logger.log_shutdown("SIGINT received");
                break;
            }
        }
    }

    info!("Shutting down");
    api_handle.abort();
    Ok(())
}

/// Interval that waits a full period after a cycle overruns
fn poll_ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run one cycle and reflect its outcome in the health registry
async fn run_cycle(
    idler: &Arc<Idler>,
    config: &config::AppConfig,
    health: &HealthRegistry,
) -> Result<CycleSummary> {
    let result = idler.run_cycle(&config.namespace_selector).await;
    health.record_cycle(&result).await;

    let summary = result.context("Failed to list environments")?;
    if summary.metrics_unavailable > 0 {
        warn!(
            environments = summary.metrics_unavailable,
            "Traffic could not be measured for some environments"
        );
    }
    Ok(summary)
}
