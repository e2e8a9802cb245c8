//! Per-call outcome recorded in setup, monitor and teardown reports.

use std::fmt;

/// What happened to one external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call was skipped because the host already had the resource.
    NotAttempted,
    Succeeded,
    /// The call failed and the caller carried on.
    Tolerated(String),
    /// The call failed and aborted the operation.
    Fatal(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CallOutcome::Tolerated(_) | CallOutcome::Fatal(_))
    }

    /// Tolerated outcome from any displayable error.
    pub fn tolerated(err: impl fmt::Display) -> Self {
        CallOutcome::Tolerated(err.to_string())
    }

    pub fn fatal(err: impl fmt::Display) -> Self {
        CallOutcome::Fatal(err.to_string())
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::NotAttempted => f.write_str("not attempted"),
            CallOutcome::Succeeded => f.write_str("succeeded"),
            CallOutcome::Tolerated(reason) => write!(f, "failed (tolerated): {reason}"),
            CallOutcome::Fatal(reason) => write!(f, "failed (fatal): {reason}"),
        }
    }
}
