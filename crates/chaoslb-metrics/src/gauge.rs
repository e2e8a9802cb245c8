//! Gauge families.

/// Labels of per-backend gauges.
const BACKEND_LABELS: &[&str] = &["vip", "backend", "business"];

/// Labels of per-virtual-service gauges.
const SERVICE_LABELS: &[&str] = &["service", "business"];

/// Every gauge family chaoslb exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gauge {
    ActiveConnections,
    InactiveConnections,
    BackendWeight,
    BackendStatus,
    VipStatus,
    SnatRulesCount,
    SysctlStatus,
    BackendConnections,
    BackendInPackets,
    BackendOutPackets,
    BackendInBytes,
    BackendOutBytes,
    ConnectionsTotal,
    PacketsInTotal,
    PacketsOutTotal,
    BytesInTotal,
    BytesOutTotal,
}

impl Gauge {
    /// All families, in exposition order.
    pub const ALL: [Gauge; 17] = [
        Gauge::ActiveConnections,
        Gauge::InactiveConnections,
        Gauge::BackendWeight,
        Gauge::BackendStatus,
        Gauge::VipStatus,
        Gauge::SnatRulesCount,
        Gauge::SysctlStatus,
        Gauge::BackendConnections,
        Gauge::BackendInPackets,
        Gauge::BackendOutPackets,
        Gauge::BackendInBytes,
        Gauge::BackendOutBytes,
        Gauge::ConnectionsTotal,
        Gauge::PacketsInTotal,
        Gauge::PacketsOutTotal,
        Gauge::BytesInTotal,
        Gauge::BytesOutTotal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Gauge::ActiveConnections => "ipvs_active_connections",
            Gauge::InactiveConnections => "ipvs_inactive_connections",
            Gauge::BackendWeight => "ipvs_backend_weight",
            Gauge::BackendStatus => "ipvs_backend_status",
            Gauge::VipStatus => "ipvs_vip_status",
            Gauge::SnatRulesCount => "ipvs_snat_rules_count",
            Gauge::SysctlStatus => "ipvs_sysctl_status",
            Gauge::BackendConnections => "ipvs_backend_connections_total",
            Gauge::BackendInPackets => "ipvs_backend_in_packets_total",
            Gauge::BackendOutPackets => "ipvs_backend_out_packets_total",
            Gauge::BackendInBytes => "ipvs_backend_in_bytes_total",
            Gauge::BackendOutBytes => "ipvs_backend_out_bytes_total",
            Gauge::ConnectionsTotal => "ipvs_connections_total",
            Gauge::PacketsInTotal => "ipvs_packets_in_total",
            Gauge::PacketsOutTotal => "ipvs_packets_out_total",
            Gauge::BytesInTotal => "ipvs_bytes_in_total",
            Gauge::BytesOutTotal => "ipvs_bytes_out_total",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Gauge::ActiveConnections => "Active IPVS connections",
            Gauge::InactiveConnections => "Inactive IPVS connections",
            Gauge::BackendWeight => "Backend weight in IPVS",
            Gauge::BackendStatus => "Backend status (1=up, 0=down)",
            Gauge::VipStatus => "VIP status (1=active, 0=inactive)",
            Gauge::SnatRulesCount => "Number of SNAT rules created",
            Gauge::SysctlStatus => "Sysctl configuration status",
            Gauge::BackendConnections => "Total connections to backend",
            Gauge::BackendInPackets => "Total incoming packets to backend",
            Gauge::BackendOutPackets => "Total outgoing packets from backend",
            Gauge::BackendInBytes => "Total incoming bytes to backend",
            Gauge::BackendOutBytes => "Total outgoing bytes from backend",
            Gauge::ConnectionsTotal => "Total connections to virtual service",
            Gauge::PacketsInTotal => "Total incoming packets to virtual service",
            Gauge::PacketsOutTotal => "Total outgoing packets from virtual service",
            Gauge::BytesInTotal => "Total incoming bytes to virtual service",
            Gauge::BytesOutTotal => "Total outgoing bytes from virtual service",
        }
    }

    /// Label names, in the order values are passed to `set`.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Gauge::VipStatus => &["vip", "interface", "business"],
            Gauge::SnatRulesCount => &["business"],
            Gauge::SysctlStatus => &["parameter"],
            Gauge::ConnectionsTotal
            | Gauge::PacketsInTotal
            | Gauge::PacketsOutTotal
            | Gauge::BytesInTotal
            | Gauge::BytesOutTotal => SERVICE_LABELS,
            _ => BACKEND_LABELS,
        }
    }
}
