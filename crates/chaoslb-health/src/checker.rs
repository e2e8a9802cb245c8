//! TCP connect probes.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

/// Default bound on a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a single liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The connection was accepted.
    Healthy,
    /// The connection was refused or the address was unreachable.
    Failed,
    /// No answer within the timeout.
    TimedOut,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }

    /// Value published on the backend status gauge.
    pub fn gauge_value(self) -> f64 {
        if self.is_healthy() { 1.0 } else { 0.0 }
    }
}

/// Attempt a TCP connection to `address` (`ip:port`).
///
/// The connection is closed as soon as it is established.
pub async fn tcp_probe(address: &str, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => ProbeResult::Healthy,
        Ok(Err(e)) => {
            debug!(error = %e, %address, "liveness probe connection failed");
            ProbeResult::Failed
        }
        Err(_) => {
            debug!(%address, "liveness probe timed out");
            ProbeResult::TimedOut
        }
    }
}

/// Probe every address concurrently.
///
/// Results come back in the order of `addresses`. A probe task that
/// panics counts as `Failed`.
pub async fn probe_all(addresses: &[String], timeout: Duration) -> Vec<ProbeResult> {
    let mut set = JoinSet::new();
    for (idx, address) in addresses.iter().enumerate() {
        let address = address.clone();
        set.spawn(async move { (idx, tcp_probe(&address, timeout).await) });
    }

    let mut results = vec![ProbeResult::Failed; addresses.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, result)) => results[idx] = result,
            Err(e) => debug!(error = %e, "liveness probe task failed"),
        }
    }
    results
}
