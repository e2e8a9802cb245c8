//! Argument vectors for the host tools.
//!
//! Flag spelling and order follow each tool's CLI grammar exactly; the
//! output grammar of the query commands is parsed elsewhere.

use chaoslb_core::Protocol;

use crate::runner::Invocation;

/// `modprobe <module>`.
pub fn modprobe(module: &str) -> Invocation {
    Invocation::new("modprobe", [module])
}

/// `ip` — links and addresses.
pub mod ip {
    use super::*;

    pub fn link_show(iface: &str) -> Invocation {
        Invocation::new("ip", ["link", "show", iface])
    }

    pub fn link_add_dummy(iface: &str) -> Invocation {
        Invocation::new("ip", ["link", "add", iface, "type", "dummy"])
    }

    pub fn link_up(iface: &str) -> Invocation {
        Invocation::new("ip", ["link", "set", "dev", iface, "up"])
    }

    pub fn link_delete(iface: &str) -> Invocation {
        Invocation::new("ip", ["link", "del", iface])
    }

    /// Addresses bound to one interface.
    pub fn addr_show_dev(iface: &str) -> Invocation {
        Invocation::new("ip", ["addr", "show", "dev", iface])
    }

    /// Addresses bound on the whole host.
    pub fn addr_show() -> Invocation {
        Invocation::new("ip", ["addr", "show"])
    }

    /// One-line-per-address listing of global-scope IPv4 addresses.
    pub fn global_ipv4_addrs() -> Invocation {
        Invocation::new("ip", ["-o", "-4", "addr", "show", "scope", "global"])
    }

    pub fn addr_add(vip: &str, iface: &str) -> Invocation {
        Invocation::new("ip", ["addr", "add", host_cidr(vip).as_str(), "dev", iface])
    }

    pub fn addr_delete(vip: &str, iface: &str) -> Invocation {
        Invocation::new("ip", ["addr", "del", host_cidr(vip).as_str(), "dev", iface])
    }

    /// VIPs are always bound as host routes.
    pub fn host_cidr(vip: &str) -> String {
        format!("{vip}/32")
    }
}

/// `ipvsadm` — virtual services and real servers.
pub mod ipvsadm {
    use super::*;

    /// `-t` for TCP services, `-u` for UDP.
    pub fn service_flag(protocol: Protocol) -> &'static str {
        match protocol {
            Protocol::Tcp => "-t",
            Protocol::Udp => "-u",
        }
    }

    fn service_addr(vip: &str, port: u16) -> String {
        format!("{vip}:{port}")
    }

    /// Exits non-zero when the service does not exist.
    pub fn service_show(protocol: Protocol, vip: &str, port: u16) -> Invocation {
        Invocation::new(
            "ipvsadm",
            ["-L", "-n", service_flag(protocol), service_addr(vip, port).as_str()],
        )
    }

    /// Add a round-robin scheduled virtual service.
    pub fn service_add(protocol: Protocol, vip: &str, port: u16) -> Invocation {
        Invocation::new(
            "ipvsadm",
            ["-A", service_flag(protocol), service_addr(vip, port).as_str(), "-s", "rr"],
        )
    }

    pub fn service_delete(protocol: Protocol, vip: &str, port: u16) -> Invocation {
        Invocation::new(
            "ipvsadm",
            ["-D", service_flag(protocol), service_addr(vip, port).as_str()],
        )
    }

    fn real_server(
        op: &str,
        protocol: Protocol,
        vip: &str,
        port: u16,
        backend: &str,
        weight: u32,
    ) -> Invocation {
        Invocation::new(
            "ipvsadm",
            [
                op,
                service_flag(protocol),
                service_addr(vip, port).as_str(),
                "-r",
                backend,
                "-m",
                "-w",
                weight.to_string().as_str(),
            ],
        )
    }

    /// Add a masquerading real server with a weight.
    pub fn real_server_add(
        protocol: Protocol,
        vip: &str,
        port: u16,
        backend: &str,
        weight: u32,
    ) -> Invocation {
        real_server("-a", protocol, vip, port, backend, weight)
    }

    /// Update an existing real server's forwarding method and weight.
    pub fn real_server_edit(
        protocol: Protocol,
        vip: &str,
        port: u16,
        backend: &str,
        weight: u32,
    ) -> Invocation {
        real_server("-e", protocol, vip, port, backend, weight)
    }

    /// Per-service and per-real-server counters, unscaled.
    pub fn stats_listing() -> Invocation {
        Invocation::new("ipvsadm", ["-L", "-n", "--stats", "--exact"])
    }

    /// Services, real servers, weights and connection counts.
    pub fn connection_listing() -> Invocation {
        Invocation::new("ipvsadm", ["-Ln"])
    }
}

/// `iptables` — source NAT for masqueraded services.
pub mod iptables {
    use super::*;

    /// Rule operation on the `nat` table's POSTROUTING chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RuleOp {
        Check,
        Append,
        Delete,
    }

    impl RuleOp {
        fn flag(self) -> &'static str {
            match self {
                RuleOp::Check => "-C",
                RuleOp::Append => "-A",
                RuleOp::Delete => "-D",
            }
        }
    }

    /// SNAT traffic forwarded for `vip:port` to `source`.
    pub fn snat_rule(op: RuleOp, vip: &str, port: u16, source: &str) -> Invocation {
        Invocation::new(
            "iptables",
            [
                "-t",
                "nat",
                op.flag(),
                "POSTROUTING",
                "-m",
                "ipvs",
                "--vaddr",
                vip,
                "--vport",
                port.to_string().as_str(),
                "-j",
                "SNAT",
                "--to-source",
                source,
            ],
        )
    }
}

/// `sysctl` — kernel tunables.
pub mod sysctl {
    use super::*;

    pub fn get(name: &str) -> Invocation {
        Invocation::new("sysctl", ["-n", name])
    }

    pub fn set(name: &str, value: &str) -> Invocation {
        Invocation::new("sysctl", ["-w", format!("{name}={value}").as_str()])
    }
}
