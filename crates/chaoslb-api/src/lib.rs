//! chaoslb-api — the metrics endpoint.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of every `ipvs_*` gauge |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use chaoslb_metrics::MetricsRegistry;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub metrics: MetricsRegistry,
}

/// Build the router.
pub fn build_router(metrics: MetricsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(ApiState { metrics })
}
