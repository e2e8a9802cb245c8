//! chaoslb-monitor — periodic observation of the live forwarding table.
//!
//! The monitor never touches the ledger. It reads the host's listings,
//! labels what it finds from the immutable topology, and overwrites the
//! gauges it owns on every tick.
//!
//! # Architecture
//!
//! ```text
//! Monitor::run(shutdown)
//!   └── every interval: tick()
//!       ├── statistics pass   ipvsadm -L -n --stats --exact → parse_stats()
//!       ├── connection pass   ipvsadm -Ln → ConnectionScanner
//!       ├── liveness pass     chaoslb_health::probe_all() per backend row
//!       └── VIP pass          ip addr show → <vip>/32 present?
//! ```
//!
//! A failed query empties its own pass only; the other passes still run.

pub mod monitor;
pub mod parser;

pub use monitor::{DEFAULT_INTERVAL, Monitor, TickReport};
pub use parser::{BackendRow, ConnectionScanner, Counters, ServiceStats, parse_connections, parse_stats};
