//! Agent lifecycle.
//!
//! 1. Verify the metrics port is free
//! 2. Reconcile the topology (fatal on failure, optional rollback)
//! 3. Start the monitor loop
//! 4. Wait for the stop signal, tear down once, then cancel everything
//! 5. Serve `/metrics` until cancelled

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chaoslb_core::Topology;
use chaoslb_host::CommandRunner;
use chaoslb_host::net::check_port_available;
use chaoslb_metrics::MetricsRegistry;
use chaoslb_monitor::{DEFAULT_INTERVAL, Monitor};
use chaoslb_reconcile::{Reconciler, TeardownReport};
use chaoslb_state::Ledger;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

/// Runtime knobs that are not part of the topology.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub monitor_interval: Duration,
    /// Tear down whatever a failed setup created before exiting.
    pub rollback_on_failure: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            monitor_interval: DEFAULT_INTERVAL,
            rollback_on_failure: false,
        }
    }
}

/// Run the agent until `stop` resolves.
///
/// Returns the teardown report once the metrics server has shut down.
pub async fn run_agent<F>(
    topology: Topology,
    runner: Arc<dyn CommandRunner>,
    options: AgentOptions,
    stop: F,
) -> anyhow::Result<TeardownReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = topology.metrics_port;
    check_port_available(port).with_context(|| format!("metrics port {port} occupied"))?;

    let topology = Arc::new(topology);
    let metrics = MetricsRegistry::new();
    let reconciler = Reconciler::new(runner.clone(), Ledger::new(), metrics.clone());

    // ── Setup ──────────────────────────────────────────────────

    if let Err(e) = reconciler.setup(&topology).await {
        error!(error = %e, "setup failed");
        if options.rollback_on_failure {
            let report = reconciler.teardown().cleanup().await;
            info!(removed = report.removals.len(), "rolled back partial setup");
        }
        return Err(anyhow::Error::new(e).context("setup failed"));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            reconciler.teardown().cleanup().await;
            return Err(e).with_context(|| format!("failed to bind metrics endpoint {addr}"));
        }
    };

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_shutdown = shutdown_rx.clone();
    let mut server_shutdown = shutdown_rx;
    let (server_done_tx, server_done_rx) = oneshot::channel::<()>();

    // ── Start background tasks ─────────────────────────────────

    let monitor = Monitor::new(
        runner,
        topology.clone(),
        metrics.clone(),
        options.monitor_interval,
    );
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });

    let teardown = reconciler.teardown();
    let teardown_handle = tokio::spawn(async move {
        tokio::select! {
            _ = stop => info!("shutting down"),
            _ = server_done_rx => warn!("metrics server exited, shutting down"),
        }
        let report = teardown.cleanup().await;
        let _ = shutdown_tx.send(true);
        report
    });

    // ── Metrics endpoint ───────────────────────────────────────

    info!(%addr, services = topology.services.len(), "chaoslb started");
    let served = axum::serve(listener, chaoslb_api::build_router(metrics))
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await;
    if let Err(e) = &served {
        error!(error = %e, "metrics server error");
    }
    let _ = server_done_tx.send(());

    let report = teardown_handle.await.context("teardown task failed")?;
    let _ = monitor_handle.await;
    served.context("metrics server failed")?;

    info!("chaoslb stopped");
    Ok(report)
}
