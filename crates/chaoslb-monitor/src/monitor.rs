//! Monitor — the fixed-interval observation loop.

use std::sync::Arc;
use std::time::Duration;

use chaoslb_core::Topology;
use chaoslb_health::{PROBE_TIMEOUT, probe_all};
use chaoslb_host::commands::{ip, ipvsadm};
use chaoslb_host::{CallOutcome, CommandRunner, Invocation, grammar};
use chaoslb_metrics::{Gauge, MetricsRegistry};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::parser::{BackendRow, parse_connections, parse_stats};

/// Default time between ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// What one tick observed.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub stats: CallOutcome,
    pub connections: CallOutcome,
    pub vip_status: CallOutcome,
    /// Service rows published by the statistics pass.
    pub services: usize,
    /// Real-server rows published by the connection pass.
    pub backends: usize,
    /// Backends whose liveness probe succeeded.
    pub healthy: usize,
    /// Configured VIPs found bound.
    pub vips_present: usize,
}

/// Periodically republishes the live forwarding state as gauges.
pub struct Monitor {
    runner: Arc<dyn CommandRunner>,
    topology: Arc<Topology>,
    metrics: MetricsRegistry,
    interval: Duration,
    probe_timeout: Duration,
}

impl Monitor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        topology: Arc<Topology>,
        metrics: MetricsRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            runner,
            topology,
            metrics,
            interval,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Tick until the shutdown channel changes.
    ///
    /// Cancellation is checked between ticks; a tick in progress always
    /// runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let report = self.tick().await;
                    debug!(
                        services = report.services,
                        backends = report.backends,
                        healthy = report.healthy,
                        vips_present = report.vips_present,
                        "monitor tick"
                    );
                }
                _ = shutdown.changed() => {
                    info!("monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Run every pass once, in order.
    pub async fn tick(&self) -> TickReport {
        let (stats, services) = self.stats_pass().await;
        let (connections, rows) = self.connection_pass().await;
        let healthy = self.liveness_pass(&rows).await;
        let (vip_status, vips_present) = self.vip_pass().await;

        TickReport {
            stats,
            connections,
            vip_status,
            services,
            backends: rows.len(),
            healthy,
            vips_present,
        }
    }

    async fn query(&self, cmd: &Invocation) -> Result<String, CallOutcome> {
        self.runner.run_checked(cmd).await.map_err(|e| {
            debug!(error = %e, "monitor query failed, pass skipped");
            CallOutcome::tolerated(e)
        })
    }

    async fn stats_pass(&self) -> (CallOutcome, usize) {
        let output = match self.query(&ipvsadm::stats_listing()).await {
            Ok(output) => output,
            Err(outcome) => return (outcome, 0),
        };

        let stats = parse_stats(&output);
        for svc in &stats {
            let business = self.topology.business_for(&svc.service);
            let labels = [svc.service.as_str(), business];
            let c = &svc.counters;
            self.metrics.set(Gauge::ConnectionsTotal, &labels, c.connections as f64).await;
            self.metrics.set(Gauge::PacketsInTotal, &labels, c.in_packets as f64).await;
            self.metrics.set(Gauge::PacketsOutTotal, &labels, c.out_packets as f64).await;
            self.metrics.set(Gauge::BytesInTotal, &labels, c.in_bytes as f64).await;
            self.metrics.set(Gauge::BytesOutTotal, &labels, c.out_bytes as f64).await;

            for (backend, c) in &svc.backends {
                let labels = [svc.service.as_str(), backend.as_str(), business];
                self.metrics.set(Gauge::BackendConnections, &labels, c.connections as f64).await;
                self.metrics.set(Gauge::BackendInPackets, &labels, c.in_packets as f64).await;
                self.metrics.set(Gauge::BackendOutPackets, &labels, c.out_packets as f64).await;
                self.metrics.set(Gauge::BackendInBytes, &labels, c.in_bytes as f64).await;
                self.metrics.set(Gauge::BackendOutBytes, &labels, c.out_bytes as f64).await;
            }
        }

        (CallOutcome::Succeeded, stats.len())
    }

    async fn connection_pass(&self) -> (CallOutcome, Vec<BackendRow>) {
        let output = match self.query(&ipvsadm::connection_listing()).await {
            Ok(output) => output,
            Err(outcome) => return (outcome, Vec::new()),
        };

        let rows = parse_connections(&output);
        for row in &rows {
            let business = self.topology.business_for(&row.service);
            let labels = [row.service.as_str(), row.backend.as_str(), business];
            self.metrics.set(Gauge::ActiveConnections, &labels, row.active as f64).await;
            self.metrics.set(Gauge::InactiveConnections, &labels, row.inactive as f64).await;
            self.metrics.set(Gauge::BackendWeight, &labels, row.weight as f64).await;
        }

        (CallOutcome::Succeeded, rows)
    }

    /// Overrides the optimistic status set at registration.
    async fn liveness_pass(&self, rows: &[BackendRow]) -> usize {
        let addresses: Vec<String> = rows.iter().map(|r| r.backend.clone()).collect();
        let results = probe_all(&addresses, self.probe_timeout).await;

        let mut healthy = 0;
        for (row, result) in rows.iter().zip(results) {
            let business = self.topology.business_for(&row.service);
            let labels = [row.service.as_str(), row.backend.as_str(), business];
            self.metrics.set(Gauge::BackendStatus, &labels, result.gauge_value()).await;
            if result.is_healthy() {
                healthy += 1;
            }
        }
        healthy
    }

    async fn vip_pass(&self) -> (CallOutcome, usize) {
        let output = match self.query(&ip::addr_show()).await {
            Ok(output) => output,
            Err(outcome) => return (outcome, 0),
        };

        let mut present = 0;
        for svc in &self.topology.services {
            let bound = grammar::has_address(&output, &ip::host_cidr(&svc.vip));
            let labels = [svc.vip.as_str(), svc.interface(), svc.business()];
            self.metrics
                .set(Gauge::VipStatus, &labels, if bound { 1.0 } else { 0.0 })
                .await;
            if bound {
                present += 1;
            }
        }

        (CallOutcome::Succeeded, present)
    }
}
