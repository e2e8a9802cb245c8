//! Reconciler — converges the host toward the topology.
//!
//! Every step queries the host before mutating it, so running setup
//! against an already-reconciled host issues no creation calls for
//! interfaces or service entries.

use std::sync::Arc;

use chaoslb_core::{ServiceConfig, Topology};
use chaoslb_host::commands::{self, ip, iptables, ipvsadm, sysctl};
use chaoslb_host::{CallOutcome, CommandError, CommandRunner, grammar};
use chaoslb_metrics::{Gauge, MetricsRegistry};
use chaoslb_state::{Ledger, LedgerEntry};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult, StepError, StepResult};
use crate::report::{ServiceReport, SetupReport};
use crate::teardown::Teardown;

/// Kernel modules loaded before anything else.
pub const KERNEL_MODULES: [&str; 2] = ["ip_vs", "dummy"];

/// Tunables overridden by setup, in application order.
pub const TUNABLES: [(&str, &str); 2] = [
    ("net.ipv4.ip_forward", "1"),
    ("net.ipv4.vs.conntrack", "1"),
];

/// Applies a topology to the host and records what it created.
#[derive(Clone)]
pub struct Reconciler {
    runner: Arc<dyn CommandRunner>,
    ledger: Ledger,
    metrics: MetricsRegistry,
}

impl Reconciler {
    pub fn new(runner: Arc<dyn CommandRunner>, ledger: Ledger, metrics: MetricsRegistry) -> Self {
        Self {
            runner,
            ledger,
            metrics,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// A teardown over the same host and ledger.
    pub fn teardown(&self) -> Teardown {
        Teardown::new(self.runner.clone(), self.ledger.clone())
    }

    /// Apply the whole topology.
    ///
    /// Stops at the first fatal failure. Whatever was created before that
    /// point is in the ledger and can be rolled back by [`Teardown`].
    pub async fn setup(&self, topology: &Topology) -> ReconcileResult<SetupReport> {
        info!(services = topology.services.len(), "reconciling topology");
        let mut report = SetupReport::default();

        for module in KERNEL_MODULES {
            let outcome = self.load_module(module).await;
            report.modules.push((module.to_string(), outcome));
        }

        for (name, value) in TUNABLES {
            if let Err(source) = self.apply_tunable(name, value).await {
                report
                    .tunables
                    .push((name.to_string(), CallOutcome::fatal(&source)));
                return Err(ReconcileError::Tunable {
                    name: name.to_string(),
                    value: value.to_string(),
                    source,
                    report: Box::new(report),
                });
            }
            report
                .tunables
                .push((name.to_string(), CallOutcome::Succeeded));
        }

        for svc in &topology.services {
            let mut svc_report = ServiceReport::new(svc.service_key());
            let result = self.ensure_service(svc, &mut svc_report).await;
            report.services.push(svc_report);
            if let Err(source) = result {
                return Err(ReconcileError::Service {
                    vip: svc.vip.clone(),
                    port: svc.local_port,
                    source,
                    report: Box::new(report),
                });
            }
        }

        info!(
            services = report.services.len(),
            created = report.services.iter().map(ServiceReport::created).sum::<usize>(),
            "topology reconciled"
        );
        Ok(report)
    }

    /// Apply one virtual service. Safe to repeat.
    pub async fn setup_service(&self, svc: &ServiceConfig) -> StepResult<ServiceReport> {
        let mut report = ServiceReport::new(svc.service_key());
        self.ensure_service(svc, &mut report).await?;
        Ok(report)
    }

    async fn load_module(&self, module: &str) -> CallOutcome {
        match self.runner.run_checked(&commands::modprobe(module)).await {
            Ok(_) => CallOutcome::Succeeded,
            Err(e) => {
                warn!(%module, error = %e, "failed to load kernel module");
                CallOutcome::tolerated(e)
            }
        }
    }

    /// Capture the current value, then override it.
    async fn apply_tunable(&self, name: &str, value: &str) -> Result<(), CommandError> {
        match self.runner.run_checked(&sysctl::get(name)).await {
            Ok(previous) => {
                self.ledger.capture_parameter(name, previous.trim()).await;
            }
            Err(e) => debug!(%name, error = %e, "could not read tunable, nothing to restore"),
        }

        self.runner.run_checked(&sysctl::set(name, value)).await?;
        info!(%name, %value, "set sysctl parameter");
        self.metrics.set(Gauge::SysctlStatus, &[name], 1.0).await;
        Ok(())
    }

    async fn ensure_service(&self, svc: &ServiceConfig, report: &mut ServiceReport) -> StepResult<()> {
        let iface = svc.interface();
        let business = svc.business();
        debug!(service = %report.service, %iface, %business, "setting up service");

        settle(&mut report.interface, self.ensure_interface(iface).await)?;
        settle(&mut report.vip_binding, self.ensure_vip(&svc.vip, iface).await)?;
        settle(&mut report.service_entry, self.ensure_service_entry(svc).await)?;
        report.backends = self.register_backends(svc).await;
        self.metrics
            .set(Gauge::VipStatus, &[svc.vip.as_str(), iface, business], 1.0)
            .await;
        settle(&mut report.nat_rule, self.ensure_nat_rule(svc).await)?;

        info!(service = %report.service, backends = svc.backends.len(), "service set up");
        Ok(())
    }

    async fn ensure_interface(&self, iface: &str) -> StepResult<CallOutcome> {
        if self.runner.probe(&ip::link_show(iface)).await {
            debug!(%iface, "interface already exists, skipping");
            return Ok(CallOutcome::NotAttempted);
        }

        let failed = |source| StepError::Interface {
            interface: iface.to_string(),
            source,
        };
        self.runner
            .run_checked(&ip::link_add_dummy(iface))
            .await
            .map_err(failed)?;
        self.ledger
            .record(LedgerEntry::DummyInterface {
                name: iface.to_string(),
            })
            .await;
        self.runner
            .run_checked(&ip::link_up(iface))
            .await
            .map_err(failed)?;

        info!(%iface, "created dummy interface");
        Ok(CallOutcome::Succeeded)
    }

    /// The binding is recorded whether or not it pre-existed.
    async fn ensure_vip(&self, vip: &str, iface: &str) -> StepResult<CallOutcome> {
        let cidr = ip::host_cidr(vip);
        let bound = match self.runner.run_checked(&ip::addr_show_dev(iface)).await {
            Ok(listing) => grammar::has_address(&listing, &cidr),
            Err(e) => {
                debug!(%iface, error = %e, "could not list interface addresses");
                false
            }
        };

        let outcome = if bound {
            debug!(%vip, %iface, "VIP already exists on interface, skipping");
            CallOutcome::NotAttempted
        } else {
            self.runner
                .run_checked(&ip::addr_add(vip, iface))
                .await
                .map_err(StepError::VipBinding)?;
            info!(%vip, %iface, "bound VIP");
            CallOutcome::Succeeded
        };

        self.ledger
            .record(LedgerEntry::VipBinding {
                address: vip.to_string(),
                interface: iface.to_string(),
            })
            .await;
        Ok(outcome)
    }

    async fn ensure_service_entry(&self, svc: &ServiceConfig) -> StepResult<CallOutcome> {
        let protocol = svc.protocol();
        if self
            .runner
            .probe(&ipvsadm::service_show(protocol, &svc.vip, svc.local_port))
            .await
        {
            debug!(service = %svc.service_key(), %protocol, "virtual service already exists, skipping");
            return Ok(CallOutcome::NotAttempted);
        }

        self.runner
            .run_checked(&ipvsadm::service_add(protocol, &svc.vip, svc.local_port))
            .await
            .map_err(StepError::ServiceEntry)?;
        self.ledger
            .record(LedgerEntry::ServiceEntry {
                address: svc.vip.clone(),
                port: svc.local_port,
                protocol,
            })
            .await;
        info!(service = %svc.service_key(), %protocol, "created virtual service");
        Ok(CallOutcome::Succeeded)
    }

    /// Add each real server, falling back to an edit when it is already
    /// registered. Failures are tolerated.
    async fn register_backends(&self, svc: &ServiceConfig) -> Vec<(String, CallOutcome)> {
        let protocol = svc.protocol();
        let service = svc.service_key();
        let business = svc.business();
        let mut outcomes = Vec::with_capacity(svc.backends.len());

        for backend in &svc.backends {
            let address = backend.address();
            let weight = backend.effective_weight();

            let added = self
                .runner
                .run_checked(&ipvsadm::real_server_add(protocol, &svc.vip, svc.local_port, &address, weight))
                .await;
            let outcome = match added {
                Ok(_) => CallOutcome::Succeeded,
                Err(add_err) => {
                    debug!(%service, backend = %address, error = %add_err, "add failed, editing existing real server");
                    match self
                        .runner
                        .run_checked(&ipvsadm::real_server_edit(protocol, &svc.vip, svc.local_port, &address, weight))
                        .await
                    {
                        Ok(_) => CallOutcome::Succeeded,
                        Err(e) => {
                            warn!(%service, backend = %address, error = %e, "failed to register real server");
                            CallOutcome::tolerated(e)
                        }
                    }
                }
            };

            let labels = [service.as_str(), address.as_str(), business];
            self.metrics.set(Gauge::BackendStatus, &labels, 1.0).await;
            self.metrics
                .set(Gauge::BackendWeight, &labels, f64::from(weight))
                .await;
            outcomes.push((address, outcome));
        }

        outcomes
    }

    /// The rule is recorded whether or not it pre-existed.
    async fn ensure_nat_rule(&self, svc: &ServiceConfig) -> StepResult<CallOutcome> {
        let listing = self
            .runner
            .run_checked(&ip::global_ipv4_addrs())
            .await
            .map_err(StepError::SourceLookup)?;
        let source = grammar::first_global_ipv4(&listing)
            .ok_or(StepError::NoSourceAddress)?
            .to_string();

        let rule = |op| iptables::snat_rule(op, &svc.vip, svc.local_port, &source);
        let outcome = if self.runner.probe(&rule(iptables::RuleOp::Check)).await {
            debug!(service = %svc.service_key(), %source, "SNAT rule already exists, skipping");
            CallOutcome::NotAttempted
        } else {
            self.runner
                .run_checked(&rule(iptables::RuleOp::Append))
                .await
                .map_err(StepError::NatRule)?;
            info!(service = %svc.service_key(), %source, "added SNAT rule");
            CallOutcome::Succeeded
        };

        let count = self
            .ledger
            .record(LedgerEntry::NatRule {
                address: svc.vip.clone(),
                port: svc.local_port,
                source,
            })
            .await;
        self.metrics
            .set(Gauge::SnatRulesCount, &[svc.business()], count as f64)
            .await;
        Ok(outcome)
    }
}

/// Store a step's outcome in its report slot, fatal on error.
fn settle(slot: &mut CallOutcome, result: StepResult<CallOutcome>) -> StepResult<()> {
    *slot = match &result {
        Ok(outcome) => outcome.clone(),
        Err(e) => CallOutcome::fatal(e),
    };
    result.map(|_| ())
}
