//! Teardown — reverses everything the ledger says this process created.

use std::sync::Arc;

use chaoslb_host::commands::{ip, iptables, ipvsadm, sysctl};
use chaoslb_host::{CallOutcome, CommandRunner, Invocation};
use chaoslb_state::{EntryKind, Ledger, LedgerEntry};
use tracing::{debug, info, warn};

use crate::report::TeardownReport;

/// Removal order: dependents before the things they sit on, firewall
/// rules last.
const REMOVAL_ORDER: [EntryKind; 4] = [
    EntryKind::ServiceEntry,
    EntryKind::VipBinding,
    EntryKind::DummyInterface,
    EntryKind::NatRule,
];

/// One-shot rollback handle. [`cleanup`](Teardown::cleanup) consumes it.
pub struct Teardown {
    runner: Arc<dyn CommandRunner>,
    ledger: Ledger,
}

impl Teardown {
    pub fn new(runner: Arc<dyn CommandRunner>, ledger: Ledger) -> Self {
        Self { runner, ledger }
    }

    /// Remove every recorded resource and restore every captured tunable.
    ///
    /// Holds the ledger write lock throughout. Every failure is tolerated
    /// and reported; the ledger is empty afterwards.
    pub async fn cleanup(self) -> TeardownReport {
        let mut guard = self.ledger.lock().await;
        let contents = guard.take();
        info!(
            entries = contents.entries().len(),
            parameters = contents.originals().len(),
            "cleaning up IPVS rules and interfaces"
        );

        let mut report = TeardownReport::default();
        for kind in REMOVAL_ORDER {
            for entry in contents.entries_of(kind) {
                let outcome = self.attempt(&removal(entry)).await;
                report.removals.push((entry.clone(), outcome));
            }
        }

        for param in contents.originals() {
            let outcome = self
                .attempt(&sysctl::set(&param.name, &param.previous_value))
                .await;
            if outcome.is_success() {
                info!(name = %param.name, value = %param.previous_value, "restored sysctl parameter");
            }
            report.restored.push((param.name.clone(), outcome));
        }

        drop(guard);
        info!(failures = report.failures(), "cleanup finished");
        report
    }

    async fn attempt(&self, cmd: &Invocation) -> CallOutcome {
        match self.runner.run_checked(cmd).await {
            Ok(_) => {
                debug!(command = %cmd, "removed");
                CallOutcome::Succeeded
            }
            Err(e) => {
                warn!(error = %e, "cleanup step failed, continuing");
                CallOutcome::tolerated(e)
            }
        }
    }
}

/// The call that undoes a ledger entry.
fn removal(entry: &LedgerEntry) -> Invocation {
    match entry {
        LedgerEntry::ServiceEntry {
            address,
            port,
            protocol,
        } => ipvsadm::service_delete(*protocol, address, *port),
        LedgerEntry::VipBinding { address, interface } => ip::addr_delete(address, interface),
        LedgerEntry::DummyInterface { name } => ip::link_delete(name),
        LedgerEntry::NatRule {
            address,
            port,
            source,
        } => iptables::snat_rule(iptables::RuleOp::Delete, address, *port, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reconciler;
    use chaoslb_core::{BackendConfig, Protocol, ServiceConfig, Topology};
    use chaoslb_host::FakeHost;
    use chaoslb_metrics::MetricsRegistry;

    fn topology() -> Topology {
        let svc = |vip: &str, port: u16, iface: &str| ServiceConfig {
            vip: vip.to_string(),
            local_port: port,
            backends: vec![
                BackendConfig {
                    ip: "10.0.1.2".to_string(),
                    port: 8080,
                    weight: 1,
                },
                BackendConfig {
                    ip: "10.0.1.3".to_string(),
                    port: 8080,
                    weight: 3,
                },
            ],
            protocol: "tcp".to_string(),
            interface: iface.to_string(),
            business: "web".to_string(),
        };
        Topology {
            services: vec![
                svc("10.0.0.1", 80, "ipvs0"),
                svc("10.0.0.1", 443, "ipvs0"),
                svc("10.0.0.9", 80, "ipvs1"),
            ],
            metrics_port: 9100,
        }
    }

    fn reconciler(host: &FakeHost) -> Reconciler {
        Reconciler::new(Arc::new(host.clone()), Ledger::new(), MetricsRegistry::new())
    }

    #[tokio::test]
    async fn one_removal_per_ledger_entry() {
        let host = FakeHost::new();
        let rec = reconciler(&host);
        rec.setup(&topology()).await.unwrap();

        let services = rec.ledger().count(EntryKind::ServiceEntry).await;
        let vips = rec.ledger().count(EntryKind::VipBinding).await;
        let ifaces = rec.ledger().count(EntryKind::DummyInterface).await;
        let rules = rec.ledger().count(EntryKind::NatRule).await;
        assert_eq!((services, vips, ifaces, rules), (3, 3, 2, 3));
        host.clear_log();

        let report = rec.teardown().cleanup().await;

        assert_eq!(host.count(&["ipvsadm", "-D"]), services);
        assert_eq!(host.count(&["ip", "addr", "del"]), vips);
        assert_eq!(host.count(&["ip", "link", "del"]), ifaces);
        assert_eq!(host.count(&["iptables", "-t", "nat", "-D"]), rules);
        assert_eq!(report.removals.len(), services + vips + ifaces + rules);
        assert!(rec.ledger().is_empty().await);
    }

    #[tokio::test]
    async fn removal_follows_dependency_order() {
        let host = FakeHost::new();
        let rec = reconciler(&host);
        rec.setup(&topology()).await.unwrap();

        let report = rec.teardown().cleanup().await;
        let kinds: Vec<EntryKind> = report.removals.iter().map(|(e, _)| e.kind()).collect();
        let mut sorted = kinds.clone();
        sorted.sort_by_key(|k| REMOVAL_ORDER.iter().position(|o| o == k));
        assert_eq!(kinds, sorted);
        assert_eq!(kinds.first(), Some(&EntryKind::ServiceEntry));
        assert_eq!(kinds.last(), Some(&EntryKind::NatRule));
    }

    #[tokio::test]
    async fn round_trip_restores_host() {
        let host = FakeHost::new();
        host.set_sysctl("net.ipv4.ip_forward", "0");
        host.set_sysctl("net.ipv4.vs.conntrack", "0");
        let rec = reconciler(&host);

        rec.setup(&topology()).await.unwrap();
        assert_eq!(host.sysctl("net.ipv4.ip_forward").as_deref(), Some("1"));
        assert_eq!(host.sysctl("net.ipv4.vs.conntrack").as_deref(), Some("1"));

        let report = rec.teardown().cleanup().await;

        assert!(report.restored.iter().all(|(_, o)| o.is_success()));
        assert_eq!(host.sysctl("net.ipv4.ip_forward").as_deref(), Some("0"));
        assert_eq!(host.sysctl("net.ipv4.vs.conntrack").as_deref(), Some("0"));
        assert!(!host.has_interface("ipvs0"));
        assert!(!host.has_interface("ipvs1"));
        assert!(!host.has_service("10.0.0.1:80"));
        assert_eq!(host.nat_rule_count(), 0);
    }

    #[tokio::test]
    async fn failures_are_tolerated() {
        let host = FakeHost::new();
        let rec = reconciler(&host);
        rec.setup(&topology()).await.unwrap();
        host.fail_on(&["ipvsadm", "-D"]);
        host.fail_on(&["sysctl", "-w"]);

        let report = rec.teardown().cleanup().await;

        // 3 service deletes, 2 restores, and the second unbind of the VIP
        // shared by two services.
        assert_eq!(report.failures(), 6);
        assert_eq!(host.count(&["ip", "link", "del"]), 2);
        assert_eq!(host.nat_rule_count(), 0);
        assert!(rec.ledger().is_empty().await);
    }

    #[tokio::test]
    async fn pre_existing_resources_are_left_alone() {
        let host = FakeHost::new();
        host.add_interface("ipvs0");
        let rec = reconciler(&host);
        let topo = Topology {
            services: vec![ServiceConfig {
                vip: "10.0.0.1".to_string(),
                local_port: 80,
                backends: vec![],
                protocol: String::new(),
                interface: String::new(),
                business: String::new(),
            }],
            metrics_port: 9100,
        };

        rec.setup(&topo).await.unwrap();
        rec.teardown().cleanup().await;

        assert!(host.has_interface("ipvs0"));
        assert_eq!(host.count(&["ip", "link", "del"]), 0);
    }

    #[tokio::test]
    async fn cleanup_after_partial_setup() {
        let host = FakeHost::new();
        host.fail_on(&["iptables", "-t", "nat", "-A"]);
        let rec = reconciler(&host);

        assert!(rec.setup(&topology()).await.is_err());
        let report = rec.teardown().cleanup().await;

        assert_eq!(report.failures(), 0);
        assert!(!host.has_interface("ipvs0"));
        assert!(!host.has_service("10.0.0.1:80"));
        assert_eq!(host.sysctl("net.ipv4.ip_forward").as_deref(), Some("0"));
    }

    #[test]
    fn removal_commands() {
        let entry = LedgerEntry::ServiceEntry {
            address: "10.0.0.5".to_string(),
            port: 53,
            protocol: Protocol::Udp,
        };
        assert_eq!(removal(&entry).to_string(), "ipvsadm -D -u 10.0.0.5:53");

        let entry = LedgerEntry::VipBinding {
            address: "10.0.0.5".to_string(),
            interface: "ipvs0".to_string(),
        };
        assert_eq!(removal(&entry).to_string(), "ip addr del 10.0.0.5/32 dev ipvs0");
    }
}
