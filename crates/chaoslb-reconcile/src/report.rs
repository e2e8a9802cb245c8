//! Per-call outcome reports for setup and teardown.

use chaoslb_host::CallOutcome;
use chaoslb_state::LedgerEntry;

/// What setup did.
#[derive(Debug, Clone, Default)]
pub struct SetupReport {
    /// (module, outcome) per `modprobe`.
    pub modules: Vec<(String, CallOutcome)>,
    /// (parameter, outcome) per `sysctl -w`.
    pub tunables: Vec<(String, CallOutcome)>,
    pub services: Vec<ServiceReport>,
}

/// What setup did for one virtual service.
#[derive(Debug, Clone)]
pub struct ServiceReport {
    /// `vip:port`.
    pub service: String,
    pub interface: CallOutcome,
    pub vip_binding: CallOutcome,
    pub service_entry: CallOutcome,
    /// (backend `ip:port`, outcome) per real server.
    pub backends: Vec<(String, CallOutcome)>,
    pub nat_rule: CallOutcome,
}

impl ServiceReport {
    pub(crate) fn new(service: String) -> Self {
        Self {
            service,
            interface: CallOutcome::NotAttempted,
            vip_binding: CallOutcome::NotAttempted,
            service_entry: CallOutcome::NotAttempted,
            backends: Vec::new(),
            nat_rule: CallOutcome::NotAttempted,
        }
    }

    /// Creation calls that succeeded.
    pub fn created(&self) -> usize {
        [
            &self.interface,
            &self.vip_binding,
            &self.service_entry,
            &self.nat_rule,
        ]
        .into_iter()
        .chain(self.backends.iter().map(|(_, o)| o))
        .filter(|o| o.is_success())
        .count()
    }
}

/// What teardown did.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// One removal per ledger entry, in the order they were attempted.
    pub removals: Vec<(LedgerEntry, CallOutcome)>,
    /// (parameter, outcome) per restored tunable.
    pub restored: Vec<(String, CallOutcome)>,
}

impl TeardownReport {
    /// Removal and restore calls that failed and were tolerated.
    pub fn failures(&self) -> usize {
        self.removals
            .iter()
            .map(|(_, o)| o)
            .chain(self.restored.iter().map(|(_, o)| o))
            .filter(|o| o.is_failure())
            .count()
    }
}
