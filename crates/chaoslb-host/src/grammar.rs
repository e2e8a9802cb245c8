//! Output grammar of `ip addr show`.
//!
//! Parsing is permissive: lines that do not match a known shape are
//! skipped without error.

use std::net::Ipv4Addr;

/// An IPv4 address bound to an interface, as printed (`a.b.c.d/len`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAddress {
    pub cidr: String,
    pub interface: String,
}

/// Collect every `inet` address from a multi-line `ip addr show` listing.
///
/// The owning interface comes from the most recent `N: name: <...>`
/// header line.
pub fn bound_addresses(output: &str) -> Vec<BoundAddress> {
    let mut current_iface = String::new();
    let mut addrs = Vec::new();

    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };

        if !line.starts_with(char::is_whitespace) && is_index_field(first) {
            if let Some(name) = fields.next() {
                current_iface = interface_name(name).to_string();
            }
            continue;
        }

        if first == "inet" {
            if let Some(cidr) = fields.next() {
                addrs.push(BoundAddress {
                    cidr: cidr.to_string(),
                    interface: current_iface.clone(),
                });
            }
        }
    }

    addrs
}

/// Whether `cidr` (e.g. `10.0.0.1/32`) appears as a bound address.
///
/// Compares whole tokens, so `10.0.0.1/32` does not match `110.0.0.1/32`.
pub fn has_address(output: &str, cidr: &str) -> bool {
    bound_addresses(output).iter().any(|a| a.cidr == cidr)
}

/// First non-loopback IPv4 address from `ip -o -4 addr show` output.
pub fn first_global_ipv4(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        fields.find(|f| *f == "inet")?;
        let cidr = fields.next()?;
        let addr: Ipv4Addr = cidr.split('/').next()?.parse().ok()?;
        (!addr.is_loopback() && !addr.is_unspecified()).then_some(addr)
    })
}

fn is_index_field(field: &str) -> bool {
    field
        .strip_suffix(':')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// `eth0:` → `eth0`, `veth1@if5:` → `veth1`.
fn interface_name(field: &str) -> &str {
    let name = field.strip_suffix(':').unwrap_or(field);
    name.split('@').next().unwrap_or(name)
}
