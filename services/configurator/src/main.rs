//! nats-configurator
//!
//! Runs next to each NATS server pod. This binary:
//! - Writes the server config from a template with `server_name` set
//! - Polls the Kubernetes API for sibling pods
//! - Rewrites `cluster.routes` when the peer list changes
//! - Sends SIGHUP to the server so it reloads without a restart

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nats_configurator::build_info::BUILD_INFO;
use nats_configurator::scheduler::{prepare_document, Scheduler, SchedulerConfig};
use nats_configurator::signals::TerminationSignals;
use nats_configurator::{Config, KubePeerDiscovery, ReloadCoordinator, SighupSignaler};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize tracing (prefer RUST_LOG, fallback to --log-level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        version = BUILD_INFO.version,
        git_hash = BUILD_INFO.git_hash,
        build_date = BUILD_INFO.build_date,
        "Starting nats-configurator"
    );
    info!(
        pod_name = %config.pod_name,
        pod_ip = %config.pod_ip,
        namespace = %config.namespace,
        pod_label = %config.pod_label,
        nats_routes_port = config.nats_routes_port,
        template = %config.nats_config_template.display(),
        output = %config.nats_config.display(),
        pid_file = %config.nats_pid_file.display(),
        "Configuration loaded"
    );

    let result = run(config).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "nats-configurator failed");
    }

    info!(build = %BUILD_INFO, "Stopped nats-configurator");
    result
}

async fn run(config: Config) -> Result<()> {
    let shutdown = TerminationSignals::install()
        .context("Failed to install signal handlers")?
        .into_shutdown_channel();

    let document = prepare_document(
        &config.nats_config_template,
        &config.nats_config,
        &config.pod_name,
    )
    .context("Failed to prepare NATS configuration")?;

    let discovery = KubePeerDiscovery::connect(&config.namespace, &config.pod_label)
        .context("Failed to connect to the Kubernetes API")?;

    let coordinator = ReloadCoordinator::new(
        config.nats_config.clone(),
        config.nats_pid_file.clone(),
        Arc::new(SighupSignaler),
    );

    let scheduler = Scheduler::new(
        SchedulerConfig::from(&config),
        document,
        Arc::new(discovery),
        coordinator,
    );

    scheduler
        .run(shutdown)
        .await
        .context("Reconciliation loop failed")
}
