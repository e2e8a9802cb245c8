//! Reconciler error types.

use chaoslb_host::CommandError;
use thiserror::Error;

use crate::report::SetupReport;

/// Why one per-service step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("dummy interface {interface}: {source}")]
    Interface {
        interface: String,
        #[source]
        source: CommandError,
    },

    #[error("add VIP to interface: {0}")]
    VipBinding(#[source] CommandError),

    #[error("add virtual service: {0}")]
    ServiceEntry(#[source] CommandError),

    #[error("resolve SNAT source address: {0}")]
    SourceLookup(#[source] CommandError),

    #[error("no valid local IP found")]
    NoSourceAddress,

    #[error("add SNAT rule: {0}")]
    NatRule(#[source] CommandError),
}

pub type StepResult<T> = Result<T, StepError>;

/// A fatal setup failure.
///
/// Carries the report up to and including the failing call, so the
/// caller can see how far setup got before deciding whether to roll back.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to set {name}={value}: {source}")]
    Tunable {
        name: String,
        value: String,
        #[source]
        source: CommandError,
        report: Box<SetupReport>,
    },

    #[error("service {vip}:{port}: {source}")]
    Service {
        vip: String,
        port: u16,
        #[source]
        source: StepError,
        report: Box<SetupReport>,
    },
}

impl ReconcileError {
    /// Partial report at the point of failure.
    pub fn report(&self) -> &SetupReport {
        match self {
            ReconcileError::Tunable { report, .. } | ReconcileError::Service { report, .. } => {
                report
            }
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
