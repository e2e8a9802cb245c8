//! Topology document parser.
//!
//! The document is accepted in either JSON or YAML. JSON is attempted
//! first; YAML is only tried when the JSON parse fails.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::*;

/// Desired virtual-service topology for this host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// A virtual service: one published (vip, port, protocol) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub vip: String,
    pub local_port: u16,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    /// "tcp" or "udp"; empty means tcp.
    #[serde(default)]
    pub protocol: String,
    /// Dummy interface carrying the VIP; empty means `ipvs0`.
    #[serde(default)]
    pub interface: String,
    /// Operator tag used to group metrics; empty means "default".
    #[serde(default)]
    pub business: String,
}

/// One real server behind a virtual service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub weight: u32,
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl Topology {
    /// Read, parse and validate a topology document.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let topology = Self::parse(&content)?;
        topology.validate()?;
        Ok(topology)
    }

    /// Parse a document, JSON first then YAML. Does not validate.
    ///
    /// A metrics port of 0 is read as "unset" and becomes the default.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let mut topology = match serde_json::from_str::<Topology>(content) {
            Ok(topology) => topology,
            Err(json_err) => serde_yaml::from_str::<Topology>(content).map_err(|yaml_err| {
                ConfigError::Parse {
                    json: json_err.to_string(),
                    yaml: yaml_err.to_string(),
                }
            })?,
        };
        if topology.metrics_port == 0 {
            topology.metrics_port = DEFAULT_METRICS_PORT;
        }
        Ok(topology)
    }

    /// Check addresses, ports, protocols and interface names.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.metrics_port == 0 {
            return Err(ConfigError::InvalidMetricsPort(self.metrics_port));
        }
        for svc in &self.services {
            svc.validate()?;
        }
        Ok(())
    }

    /// Resolve the business label for an observed `address:port` string.
    ///
    /// Exact match against each configured service key. A configured
    /// service without a label yields "default"; no match yields "unknown".
    pub fn business_for(&self, service_key: &str) -> &str {
        self.services
            .iter()
            .find(|svc| svc.service_key() == service_key)
            .map(|svc| svc.business())
            .unwrap_or(UNKNOWN_BUSINESS)
    }
}

impl ServiceConfig {
    /// `vip:port`, the form the forwarding tables print.
    pub fn service_key(&self) -> String {
        format!("{}:{}", self.vip, self.local_port)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol.parse().unwrap_or_default()
    }

    pub fn interface(&self) -> &str {
        if self.interface.is_empty() {
            DEFAULT_INTERFACE
        } else {
            &self.interface
        }
    }

    pub fn business(&self) -> &str {
        if self.business.is_empty() {
            DEFAULT_BUSINESS
        } else {
            &self.business
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::InvalidService {
            service: self.service_key(),
            reason,
        };

        self.vip
            .parse::<Ipv4Addr>()
            .map_err(|e| invalid(format!("vip {:?}: {e}", self.vip)))?;
        if self.local_port == 0 {
            return Err(invalid("local_port must be non-zero".to_string()));
        }
        self.protocol.parse::<Protocol>().map_err(invalid)?;

        let iface = self.interface();
        if iface.len() > 15 || iface.contains('/') || iface.chars().any(char::is_whitespace) {
            return Err(invalid(format!("interface name {iface:?} is not usable")));
        }

        for backend in &self.backends {
            backend
                .ip
                .parse::<Ipv4Addr>()
                .map_err(|e| invalid(format!("backend ip {:?}: {e}", backend.ip)))?;
            if backend.port == 0 {
                return Err(invalid(format!("backend {} has port 0", backend.ip)));
            }
        }
        Ok(())
    }
}

impl BackendConfig {
    /// Configured weight, with zero treated as 1.
    pub fn effective_weight(&self) -> u32 {
        if self.weight == 0 { 1 } else { self.weight }
    }

    /// `ip:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
