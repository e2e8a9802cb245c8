//! chaoslbd — the chaoslb agent process.
//!
//! Assembles the chaoslb subsystems into one lifecycle:
//! - Topology (validated config document)
//! - Reconciler + ledger (synchronous setup before anything else starts)
//! - Monitor (background tick loop)
//! - Teardown (exactly once, on the termination signal)
//! - Metrics endpoint (foreground, graceful shutdown)

pub mod agent;

pub use agent::{AgentOptions, run_agent};
