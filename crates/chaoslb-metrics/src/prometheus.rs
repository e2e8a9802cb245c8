//! Prometheus text exposition format.
//!
//! Renders gauge samples into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::gauge::Gauge;

/// One labelled gauge value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub gauge: Gauge,
    /// Label values, positionally matching `gauge.labels()`.
    pub labels: Vec<String>,
    pub value: f64,
}

/// Render samples into Prometheus text format.
///
/// Every family gets its HELP and TYPE lines, even with no samples.
pub fn render_prometheus(samples: &[Sample]) -> String {
    let mut out = String::new();

    for gauge in Gauge::ALL {
        let name = gauge.name();
        let _ = writeln!(out, "# HELP {name} {}", gauge.help());
        let _ = writeln!(out, "# TYPE {name} gauge");

        for s in samples.iter().filter(|s| s.gauge == gauge) {
            let labels = gauge
                .labels()
                .iter()
                .zip(&s.labels)
                .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(out, "{name}{{{labels}}} {}", s.value);
        }
    }

    out
}

/// Escape a label value: backslash, double quote, newline.
fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
