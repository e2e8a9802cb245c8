//! chaoslbd — the chaoslb daemon.
//!
//! Provisions an IPVS virtual-service topology on this host, keeps its
//! gauges current, and rolls back everything it created on SIGINT or
//! SIGTERM.
//!
//! # Usage
//!
//! ```text
//! chaoslbd --config /etc/chaoslb/config.yaml
//! chaoslbd version
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chaoslb_core::Topology;
use chaoslb_host::SystemRunner;
use chaoslbd::{AgentOptions, run_agent};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chaoslbd", about = "Chaos Load Balancer - IPVS manager with Prometheus metrics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Topology document (JSON or YAML).
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Seconds between monitor ticks (at least 1).
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    monitor_interval: u64,

    /// Roll back a partially applied topology when setup fails.
    #[arg(long)]
    rollback_on_failure: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the version number of chaoslbd.
    Version,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = cli.command {
        println!("chaoslbd version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing(cli.log_format);

    let topology = Topology::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    info!(
        path = %cli.config.display(),
        services = topology.services.len(),
        metrics_port = topology.metrics_port,
        "topology loaded"
    );

    let options = AgentOptions {
        monitor_interval: Duration::from_secs(cli.monitor_interval),
        rollback_on_failure: cli.rollback_on_failure,
    };
    let report = run_agent(topology, Arc::new(SystemRunner), options, termination()).await?;
    info!(
        removed = report.removals.len(),
        restored = report.restored.len(),
        failures = report.failures(),
        "teardown complete"
    );
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chaoslbd=debug,chaoslb=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on the first SIGINT or SIGTERM.
async fn termination() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, listening for SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    info!("shutdown signal received");
}
