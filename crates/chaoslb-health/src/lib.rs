//! chaoslb-health — backend reachability.
//!
//! A backend is alive when a TCP connect to it completes within the
//! probe timeout. No payload is exchanged.
//!
//! # Architecture
//!
//! ```text
//! tcp_probe()  → ProbeResult for one address
//! probe_all()  → concurrent probes in a JoinSet, results in input order
//! ```

pub mod checker;

pub use checker::{PROBE_TIMEOUT, ProbeResult, probe_all, tcp_probe};
