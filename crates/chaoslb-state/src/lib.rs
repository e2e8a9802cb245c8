//! chaoslb-state — the resource ledger.
//!
//! Records every interface, VIP binding, virtual-service entry and NAT
//! rule this process instance created, plus the original value of every
//! kernel tunable it overrode. Teardown consults the ledger and nothing
//! else.
//!
//! # Architecture
//!
//! ```text
//! Ledger (Clone, Arc<RwLock<LedgerContents>>)
//!   ├── entries: Vec<LedgerEntry>       ← Reconciler appends
//!   ├── originals: Vec<OriginalParameter> ← first observed value wins
//!   └── lock() → write guard held by Teardown for its whole run
//! ```

pub mod ledger;
pub mod types;

pub use ledger::{Ledger, LedgerContents};
pub use types::*;
