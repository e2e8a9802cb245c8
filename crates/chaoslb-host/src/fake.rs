//! FakeHost — an in-process stand-in for the host's forwarding and
//! firewall tools.
//!
//! Interprets the same argument vectors the real tools receive, keeps the
//! resulting interface/address/service/rule/tunable state, and answers
//! queries in the real tools' output grammar. Every invocation is logged
//! so tests can count calls, and any call can be made to fail by prefix.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// Interface that carries the host's own address.
const UPLINK: &str = "eth0";

#[derive(Debug, Clone)]
struct RealServer {
    address: String,
    weight: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    /// name → up
    interfaces: BTreeMap<String, bool>,
    /// (cidr, interface)
    addresses: Vec<(String, String)>,
    /// (flag, "vip:port") → real servers
    services: BTreeMap<(String, String), Vec<RealServer>>,
    /// Rule spec following the chain name.
    nat_rules: Vec<Vec<String>>,
    sysctls: BTreeMap<String, String>,
    host_address: Option<String>,
    stats_output: Option<String>,
    connections_output: Option<String>,
    failures: Vec<Vec<String>>,
    log: Vec<Invocation>,
}

/// Shared, cloneable fake host.
#[derive(Clone)]
pub struct FakeHost {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// A host with an uplink at 192.168.1.10, forwarding and IPVS
    /// connection tracking both off.
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.interfaces.insert(UPLINK.to_string(), true);
        state
            .addresses
            .push(("192.168.1.10/24".to_string(), UPLINK.to_string()));
        state.host_address = Some("192.168.1.10".to_string());
        state
            .sysctls
            .insert("net.ipv4.ip_forward".to_string(), "0".to_string());
        state
            .sysctls
            .insert("net.ipv4.vs.conntrack".to_string(), "0".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call whose program+args start with `prefix` exit 1.
    pub fn fail_on(&self, prefix: &[&str]) {
        self.lock()
            .failures
            .push(prefix.iter().map(|s| s.to_string()).collect());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn set_sysctl(&self, name: &str, value: &str) {
        self.lock()
            .sysctls
            .insert(name.to_string(), value.to_string());
    }

    pub fn sysctl(&self, name: &str) -> Option<String> {
        self.lock().sysctls.get(name).cloned()
    }

    /// Remove the host's global address, so source resolution fails.
    pub fn drop_host_address(&self) {
        let mut state = self.lock();
        state.host_address = None;
        state.addresses.retain(|(_, iface)| iface != UPLINK);
    }

    /// Fixed text for `ipvsadm -L -n --stats --exact`.
    pub fn set_stats_output(&self, text: &str) {
        self.lock().stats_output = Some(text.to_string());
    }

    /// Fixed text for `ipvsadm -Ln`.
    pub fn set_connections_output(&self, text: &str) {
        self.lock().connections_output = Some(text.to_string());
    }

    /// Pre-create an interface, as if another tool had made it.
    pub fn add_interface(&self, name: &str) {
        self.lock().interfaces.insert(name.to_string(), true);
    }

    /// Pre-bind an address.
    pub fn add_address(&self, cidr: &str, iface: &str) {
        self.lock()
            .addresses
            .push((cidr.to_string(), iface.to_string()));
    }

    pub fn has_interface(&self, name: &str) -> bool {
        self.lock().interfaces.contains_key(name)
    }

    pub fn has_address(&self, cidr: &str, iface: &str) -> bool {
        self.lock()
            .addresses
            .iter()
            .any(|(c, i)| c == cidr && i == iface)
    }

    /// `key` is `vip:port`.
    pub fn has_service(&self, key: &str) -> bool {
        self.lock().services.keys().any(|(_, k)| k == key)
    }

    /// Weight of a real server, if present.
    pub fn real_server_weight(&self, service: &str, backend: &str) -> Option<u32> {
        let state = self.lock();
        state
            .services
            .iter()
            .find(|((_, k), _)| k == service)
            .and_then(|(_, servers)| servers.iter().find(|rs| rs.address == backend))
            .map(|rs| rs.weight)
    }

    pub fn nat_rule_count(&self) -> usize {
        self.lock().nat_rules.len()
    }

    /// Every invocation so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().log.clone()
    }

    /// Number of invocations starting with `prefix`.
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .count()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, cmd: &Invocation) -> io::Result<CommandOutput> {
        let mut state = self.lock();
        state.log.push(cmd.clone());

        let injected = state.failures.iter().any(|prefix| {
            let prefix: Vec<&str> = prefix.iter().map(String::as_str).collect();
            cmd.starts_with(&prefix)
        });
        if injected {
            return Ok(CommandOutput::failed(1, "injected failure"));
        }

        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        match cmd.program.as_str() {
            "ip" => Ok(state.ip(&args)),
            "ipvsadm" => Ok(state.ipvsadm(&args)),
            "iptables" => Ok(state.iptables(&args)),
            "sysctl" => Ok(state.sysctl(&args)),
            "modprobe" => Ok(CommandOutput::ok("")),
            other => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{other}: command not found"),
            )),
        }
    }
}

fn usage() -> CommandOutput {
    CommandOutput::failed(2, "unrecognised arguments")
}

impl FakeState {
    fn ip(&mut self, args: &[&str]) -> CommandOutput {
        match args {
            ["link", "show", iface] => match self.interfaces.get(*iface) {
                Some(up) => CommandOutput::ok(self.render_link(iface, *up)),
                None => CommandOutput::failed(1, format!("Device \"{iface}\" does not exist.")),
            },
            ["link", "add", iface, "type", "dummy"] => {
                if self.interfaces.contains_key(*iface) {
                    return CommandOutput::failed(2, "RTNETLINK answers: File exists");
                }
                self.interfaces.insert(iface.to_string(), false);
                CommandOutput::ok("")
            }
            ["link", "set", "dev", iface, "up"] => match self.interfaces.get_mut(*iface) {
                Some(up) => {
                    *up = true;
                    CommandOutput::ok("")
                }
                None => CommandOutput::failed(1, "Cannot find device"),
            },
            ["link", "del", iface] => {
                if self.interfaces.remove(*iface).is_none() {
                    return CommandOutput::failed(1, "Cannot find device");
                }
                self.addresses.retain(|(_, i)| i != iface);
                CommandOutput::ok("")
            }
            ["addr", "show", "dev", iface] => {
                if !self.interfaces.contains_key(*iface) {
                    return CommandOutput::failed(1, format!("Device \"{iface}\" does not exist."));
                }
                CommandOutput::ok(self.render_addrs(Some(*iface)))
            }
            ["addr", "show"] => CommandOutput::ok(self.render_addrs(None)),
            ["-o", "-4", "addr", "show", "scope", "global"] => {
                let out = match &self.host_address {
                    Some(addr) => format!(
                        "2: {UPLINK}    inet {addr}/24 brd 192.168.1.255 scope global {UPLINK}\\       valid_lft forever preferred_lft forever\n"
                    ),
                    None => String::new(),
                };
                CommandOutput::ok(out)
            }
            ["addr", "add", cidr, "dev", iface] => {
                if !self.interfaces.contains_key(*iface) {
                    return CommandOutput::failed(1, "Cannot find device");
                }
                if self.addresses.iter().any(|(c, i)| c == cidr && i == iface) {
                    return CommandOutput::failed(2, "RTNETLINK answers: File exists");
                }
                self.addresses.push((cidr.to_string(), iface.to_string()));
                CommandOutput::ok("")
            }
            ["addr", "del", cidr, "dev", iface] => {
                let before = self.addresses.len();
                self.addresses.retain(|(c, i)| !(c == cidr && i == iface));
                if self.addresses.len() == before {
                    return CommandOutput::failed(2, "RTNETLINK answers: Cannot assign requested address");
                }
                CommandOutput::ok("")
            }
            _ => usage(),
        }
    }

    fn ipvsadm(&mut self, args: &[&str]) -> CommandOutput {
        match args {
            ["-L", "-n", "--stats", "--exact"] => {
                CommandOutput::ok(self.stats_output.clone().unwrap_or_else(|| self.render_stats()))
            }
            ["-Ln"] => CommandOutput::ok(
                self.connections_output
                    .clone()
                    .unwrap_or_else(|| self.render_connections()),
            ),
            ["-L", "-n", flag, key] => {
                if self.services.contains_key(&service_key(flag, key)) {
                    CommandOutput::ok(self.render_connections())
                } else {
                    CommandOutput::failed(1, "Memory allocation problem")
                }
            }
            ["-A", flag, key, "-s", "rr"] => {
                let key = service_key(flag, key);
                if self.services.contains_key(&key) {
                    return CommandOutput::failed(1, "Service already exists");
                }
                self.services.insert(key, Vec::new());
                CommandOutput::ok("")
            }
            ["-D", flag, key] => {
                if self.services.remove(&service_key(flag, key)).is_none() {
                    return CommandOutput::failed(1, "No such service");
                }
                CommandOutput::ok("")
            }
            [op @ ("-a" | "-e"), flag, key, "-r", backend, "-m", "-w", weight] => {
                let Ok(weight) = weight.parse::<u32>() else {
                    return usage();
                };
                let Some(servers) = self.services.get_mut(&service_key(flag, key)) else {
                    return CommandOutput::failed(1, "Service not defined");
                };
                let existing = servers.iter_mut().find(|rs| rs.address == *backend);
                match (*op, existing) {
                    ("-a", Some(_)) => CommandOutput::failed(1, "Destination already exists"),
                    ("-a", None) => {
                        servers.push(RealServer {
                            address: backend.to_string(),
                            weight,
                        });
                        CommandOutput::ok("")
                    }
                    (_, Some(rs)) => {
                        rs.weight = weight;
                        CommandOutput::ok("")
                    }
                    (_, None) => CommandOutput::failed(1, "No such destination"),
                }
            }
            _ => usage(),
        }
    }

    fn iptables(&mut self, args: &[&str]) -> CommandOutput {
        let ["-t", "nat", op, "POSTROUTING", rule @ ..] = args else {
            return usage();
        };
        let rule: Vec<String> = rule.iter().map(|s| s.to_string()).collect();
        let position = self.nat_rules.iter().position(|r| *r == rule);
        match (*op, position) {
            ("-C", Some(_)) => CommandOutput::ok(""),
            ("-C", None) => CommandOutput::failed(
                1,
                "iptables: Bad rule (does a matching rule exist in that chain?).",
            ),
            ("-A", _) => {
                self.nat_rules.push(rule);
                CommandOutput::ok("")
            }
            ("-D", Some(idx)) => {
                self.nat_rules.remove(idx);
                CommandOutput::ok("")
            }
            ("-D", None) => CommandOutput::failed(
                1,
                "iptables: Bad rule (does a matching rule exist in that chain?).",
            ),
            _ => usage(),
        }
    }

    fn sysctl(&mut self, args: &[&str]) -> CommandOutput {
        match args {
            ["-n", name] => match self.sysctls.get(*name) {
                Some(value) => CommandOutput::ok(format!("{value}\n")),
                None => CommandOutput::failed(
                    255,
                    format!("sysctl: cannot stat /proc/sys/{}: No such file or directory", name.replace('.', "/")),
                ),
            },
            ["-w", assignment] => {
                let Some((name, value)) = assignment.split_once('=') else {
                    return usage();
                };
                self.sysctls.insert(name.to_string(), value.to_string());
                CommandOutput::ok(format!("{name} = {value}\n"))
            }
            _ => usage(),
        }
    }

    fn render_link(&self, iface: &str, up: bool) -> String {
        let flags = if up {
            "BROADCAST,NOARP,UP,LOWER_UP"
        } else {
            "BROADCAST,NOARP"
        };
        format!(
            "7: {iface}: <{flags}> mtu 1500 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\n    link/ether 9a:4e:22:10:aa:01 brd ff:ff:ff:ff:ff:ff\n"
        )
    }

    fn render_addrs(&self, only: Option<&str>) -> String {
        let mut out = String::new();
        if only.is_none() {
            out.push_str("1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN group default qlen 1000\n");
            out.push_str("    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00\n");
            out.push_str("    inet 127.0.0.1/8 scope host lo\n");
            out.push_str("       valid_lft forever preferred_lft forever\n");
        }
        for (idx, (iface, up)) in self.interfaces.iter().enumerate() {
            if only.is_some_and(|o| o != iface) {
                continue;
            }
            let state = if *up { "UNKNOWN" } else { "DOWN" };
            out.push_str(&format!(
                "{}: {iface}: <BROADCAST,NOARP> mtu 1500 qdisc noqueue state {state} group default qlen 1000\n",
                idx + 2
            ));
            out.push_str("    link/ether 9a:4e:22:10:aa:01 brd ff:ff:ff:ff:ff:ff\n");
            for (cidr, _) in self.addresses.iter().filter(|(_, i)| i == iface) {
                out.push_str(&format!("    inet {cidr} scope global {iface}\n"));
                out.push_str("       valid_lft forever preferred_lft forever\n");
            }
        }
        out
    }

    fn render_connections(&self) -> String {
        let mut out = String::from(
            "IP Virtual Server version 1.2.1 (size=4096)\n\
             Prot LocalAddress:Port Scheduler Flags\n  \
             -> RemoteAddress:Port           Forward Weight ActiveConn InActConn\n",
        );
        for ((flag, key), servers) in &self.services {
            out.push_str(&format!("{}  {key} rr\n", protocol_label(flag)));
            for rs in servers {
                out.push_str(&format!(
                    "  -> {:<28} Masq    {:<6} 0          0\n",
                    rs.address, rs.weight
                ));
            }
        }
        out
    }

    fn render_stats(&self) -> String {
        let mut out = String::from(
            "IP Virtual Server version 1.2.1 (size=4096)\n\
             Prot LocalAddress:Port               Conns   InPkts  OutPkts  InBytes OutBytes\n  \
             -> RemoteAddress:Port\n",
        );
        for ((flag, key), servers) in &self.services {
            out.push_str(&format!("{}  {key} 0 0 0 0 0\n", protocol_label(flag)));
            for rs in servers {
                out.push_str(&format!("  -> {} 0 0 0 0 0\n", rs.address));
            }
        }
        out
    }
}

fn service_key(flag: &str, key: &str) -> (String, String) {
    (flag.to_string(), key.to_string())
}

fn protocol_label(flag: &str) -> &'static str {
    if flag == "-u" { "UDP" } else { "TCP" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ip, ipvsadm, iptables, sysctl};
    use crate::grammar;
    use chaoslb_core::Protocol;

    #[tokio::test]
    async fn interface_lifecycle() {
        let host = FakeHost::new();
        assert!(!host.probe(&ip::link_show("ipvs0")).await);

        host.run_checked(&ip::link_add_dummy("ipvs0")).await.unwrap();
        host.run_checked(&ip::link_up("ipvs0")).await.unwrap();
        assert!(host.probe(&ip::link_show("ipvs0")).await);
        assert!(host.run_checked(&ip::link_add_dummy("ipvs0")).await.is_err());

        host.run_checked(&ip::addr_add("10.0.0.1", "ipvs0")).await.unwrap();
        let out = host.run_checked(&ip::addr_show_dev("ipvs0")).await.unwrap();
        assert!(grammar::has_address(&out, "10.0.0.1/32"));

        host.run_checked(&ip::link_delete("ipvs0")).await.unwrap();
        assert!(!host.has_address("10.0.0.1/32", "ipvs0"));
    }

    #[tokio::test]
    async fn services_and_real_servers() {
        let host = FakeHost::new();
        host.run_checked(&ipvsadm::service_add(Protocol::Tcp, "10.0.0.1", 80))
            .await
            .unwrap();
        assert!(host.probe(&ipvsadm::service_show(Protocol::Tcp, "10.0.0.1", 80)).await);
        assert!(!host.probe(&ipvsadm::service_show(Protocol::Udp, "10.0.0.1", 80)).await);

        host.run_checked(&ipvsadm::real_server_add(Protocol::Tcp, "10.0.0.1", 80, "10.0.0.2:8080", 3))
            .await
            .unwrap();
        assert!(host
            .run_checked(&ipvsadm::real_server_add(Protocol::Tcp, "10.0.0.1", 80, "10.0.0.2:8080", 4))
            .await
            .is_err());
        host.run_checked(&ipvsadm::real_server_edit(Protocol::Tcp, "10.0.0.1", 80, "10.0.0.2:8080", 4))
            .await
            .unwrap();
        assert_eq!(host.real_server_weight("10.0.0.1:80", "10.0.0.2:8080"), Some(4));

        let listing = host.run_checked(&ipvsadm::connection_listing()).await.unwrap();
        assert!(listing.contains("TCP  10.0.0.1:80 rr"));
        assert!(listing.contains("-> 10.0.0.2:8080"));
    }

    #[tokio::test]
    async fn nat_rules_check_append_delete() {
        let host = FakeHost::new();
        let check = iptables::snat_rule(iptables::RuleOp::Check, "10.0.0.1", 80, "192.168.1.10");
        let append = iptables::snat_rule(iptables::RuleOp::Append, "10.0.0.1", 80, "192.168.1.10");
        let delete = iptables::snat_rule(iptables::RuleOp::Delete, "10.0.0.1", 80, "192.168.1.10");

        assert!(!host.probe(&check).await);
        host.run_checked(&append).await.unwrap();
        assert!(host.probe(&check).await);
        host.run_checked(&delete).await.unwrap();
        assert_eq!(host.nat_rule_count(), 0);
        assert!(host.run_checked(&delete).await.is_err());
    }

    #[tokio::test]
    async fn sysctl_get_and_set() {
        let host = FakeHost::new();
        let value = host.run_checked(&sysctl::get("net.ipv4.ip_forward")).await.unwrap();
        assert_eq!(value.trim(), "0");
        host.run_checked(&sysctl::set("net.ipv4.ip_forward", "1")).await.unwrap();
        assert_eq!(host.sysctl("net.ipv4.ip_forward").as_deref(), Some("1"));
        assert!(host.run_checked(&sysctl::get("net.no.such")).await.is_err());
    }

    #[tokio::test]
    async fn injected_failures_and_invocation_counts() {
        let host = FakeHost::new();
        host.fail_on(&["ip", "link", "add"]);
        assert!(host.run_checked(&ip::link_add_dummy("ipvs0")).await.is_err());
        assert!(!host.has_interface("ipvs0"));
        assert_eq!(host.count(&["ip", "link", "add"]), 1);
        assert_eq!(host.count(&["ip"]), 1);

        host.clear_failures();
        host.run_checked(&ip::link_add_dummy("ipvs0")).await.unwrap();
        assert!(host.has_interface("ipvs0"));
    }

    #[tokio::test]
    async fn global_address_resolves_from_uplink() {
        let host = FakeHost::new();
        let out = host.run_checked(&ip::global_ipv4_addrs()).await.unwrap();
        assert_eq!(
            grammar::first_global_ipv4(&out).map(|a| a.to_string()).as_deref(),
            Some("192.168.1.10")
        );

        host.drop_host_address();
        let out = host.run_checked(&ip::global_ipv4_addrs()).await.unwrap();
        assert!(grammar::first_global_ipv4(&out).is_none());
    }

    #[tokio::test]
    async fn unknown_program_is_spawn_error() {
        let host = FakeHost::new();
        let err = host
            .run(&Invocation::new("nft", ["list", "ruleset"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
