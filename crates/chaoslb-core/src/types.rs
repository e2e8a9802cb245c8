//! Shared types used across chaoslb crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default publishing interface for virtual IPs.
pub const DEFAULT_INTERFACE: &str = "ipvs0";

/// Business label for services that do not set one.
pub const DEFAULT_BUSINESS: &str = "default";

/// Business label for observed services with no configured counterpart.
pub const UNKNOWN_BUSINESS: &str = "unknown";

/// Default metrics endpoint port.
pub const DEFAULT_METRICS_PORT: u16 = 9100;

/// Transport protocol of a virtual service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unsupported protocol {other:?}")),
        }
    }
}
