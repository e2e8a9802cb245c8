//! Metrics registry — current value of every labelled gauge.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::gauge::Gauge;
use crate::prometheus::{Sample, render_prometheus};

type Series = BTreeMap<Vec<String>, f64>;

/// Shared gauge store. Clones see the same values.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    /// gauge → label values → value.
    gauges: Arc<RwLock<BTreeMap<Gauge, Series>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a gauge for one label set, replacing any previous value.
    ///
    /// A label count that does not match the family is dropped with a
    /// warning.
    pub async fn set(&self, gauge: Gauge, labels: &[&str], value: f64) {
        if labels.len() != gauge.labels().len() {
            warn!(
                gauge = gauge.name(),
                expected = gauge.labels().len(),
                got = labels.len(),
                "label count mismatch, sample dropped"
            );
            return;
        }
        let key = labels.iter().map(|s| s.to_string()).collect();
        self.gauges
            .write()
            .await
            .entry(gauge)
            .or_default()
            .insert(key, value);
    }

    /// Current value for one label set.
    pub async fn get(&self, gauge: Gauge, labels: &[&str]) -> Option<f64> {
        let gauges = self.gauges.read().await;
        let series = gauges.get(&gauge)?;
        series
            .iter()
            .find(|(key, _)| key.iter().map(String::as_str).eq(labels.iter().copied()))
            .map(|(_, value)| *value)
    }

    /// Number of label sets recorded for a family.
    pub async fn series_count(&self, gauge: Gauge) -> usize {
        self.gauges
            .read()
            .await
            .get(&gauge)
            .map_or(0, BTreeMap::len)
    }

    /// Every sample, ordered by family then label values.
    pub async fn samples(&self) -> Vec<Sample> {
        let gauges = self.gauges.read().await;
        gauges
            .iter()
            .flat_map(|(gauge, series)| {
                series.iter().map(|(labels, value)| Sample {
                    gauge: *gauge,
                    labels: labels.clone(),
                    value: *value,
                })
            })
            .collect()
    }

    pub async fn render_prometheus(&self) -> String {
        render_prometheus(&self.samples().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_is_last_write_wins() {
        let registry = MetricsRegistry::new();
        let labels = ["10.0.0.1:80", "10.0.0.2:8080", "default"];
        registry.set(Gauge::BackendStatus, &labels, 1.0).await;
        registry.set(Gauge::BackendStatus, &labels, 0.0).await;

        assert_eq!(registry.get(Gauge::BackendStatus, &labels).await, Some(0.0));
        assert_eq!(registry.series_count(Gauge::BackendStatus).await, 1);
    }

    #[tokio::test]
    async fn label_sets_are_independent() {
        let registry = MetricsRegistry::new();
        registry.set(Gauge::SnatRulesCount, &["web"], 2.0).await;
        registry.set(Gauge::SnatRulesCount, &["db"], 1.0).await;

        assert_eq!(registry.get(Gauge::SnatRulesCount, &["web"]).await, Some(2.0));
        assert_eq!(registry.get(Gauge::SnatRulesCount, &["db"]).await, Some(1.0));
        assert_eq!(registry.get(Gauge::SnatRulesCount, &["api"]).await, None);
    }

    #[tokio::test]
    async fn wrong_label_count_is_dropped() {
        let registry = MetricsRegistry::new();
        registry
            .set(Gauge::ActiveConnections, &["10.0.0.1:80", "10.0.0.2:8080", "default", "TCP"], 3.0)
            .await;
        assert_eq!(registry.series_count(Gauge::ActiveConnections).await, 0);
    }

    #[tokio::test]
    async fn clones_share_values_and_render() {
        let registry = MetricsRegistry::new();
        let other = registry.clone();
        other.set(Gauge::SysctlStatus, &["net.ipv4.ip_forward"], 1.0).await;

        let text = registry.render_prometheus().await;
        assert!(text.contains("ipvs_sysctl_status{parameter=\"net.ipv4.ip_forward\"} 1"));
    }
}
