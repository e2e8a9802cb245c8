//! chaoslb-metrics — the gauges chaoslb publishes about the load balancer.
//!
//! Every observation is a gauge: each write replaces the previous value
//! for the same label set, so a monitor tick fully overwrites what it
//! owns and nothing accumulates between ticks.
//!
//! # Architecture
//!
//! ```text
//! Gauge (declarative families: name, help, label names)
//!
//! MetricsRegistry
//!   ├── set() ← reconciler and monitor
//!   ├── get() ← tests, reports
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod gauge;
pub mod prometheus;
pub mod registry;

pub use gauge::Gauge;
pub use prometheus::{Sample, render_prometheus};
pub use registry::MetricsRegistry;
