//! chaoslb-reconcile — drives the host toward the desired topology and
//! reverses exactly what this process created.
//!
//! # Architecture
//!
//! ```text
//! Reconciler::setup(topology)
//!   ├── modprobe ip_vs, dummy          (tolerated)
//!   ├── sysctl capture + override      (fatal on write failure)
//!   └── per service, in order:
//!       interface → VIP → service entry → real servers → SNAT rule
//!         each creation recorded in the Ledger after it succeeds
//!
//! Teardown::cleanup(self)
//!   └── under the ledger write lock:
//!       service entries → VIPs → interfaces → SNAT rules → sysctls
//! ```
//!
//! Setup returns a [`SetupReport`] and teardown a [`TeardownReport`],
//! each holding the [`CallOutcome`](chaoslb_host::CallOutcome) of every
//! creation or removal call.

pub mod error;
pub mod reconciler;
pub mod report;
pub mod teardown;

pub use error::{ReconcileError, ReconcileResult, StepError, StepResult};
pub use reconciler::{KERNEL_MODULES, Reconciler, TUNABLES};
pub use report::{ServiceReport, SetupReport, TeardownReport};
pub use teardown::Teardown;
