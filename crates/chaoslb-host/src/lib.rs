//! chaoslb-host — everything chaoslb knows about the host's forwarding
//! and firewall tooling.
//!
//! The host subsystem is opaque: it is reached only by spawning its
//! command-line tools and reading their text output. This crate owns
//! both directions of that protocol.
//!
//! # Architecture
//!
//! ```text
//! CommandRunner (trait)
//!   ├── SystemRunner   → tokio::process, the real tools
//!   └── FakeHost       → in-process simulation (feature "fake")
//!
//! commands::{ip, ipvsadm, iptables, sysctl}  → exact argument vectors
//! grammar                                    → `ip addr` output parsing
//! CallOutcome                                → per-call result for reports
//! ```

pub mod commands;
pub mod grammar;
pub mod net;
pub mod outcome;
pub mod runner;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use outcome::CallOutcome;
pub use runner::{CommandError, CommandOutput, CommandRunner, Invocation, SystemRunner};

#[cfg(any(test, feature = "fake"))]
pub use fake::FakeHost;
