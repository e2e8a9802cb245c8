//! Route handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::trace;

use crate::ApiState;

/// Content type of the Prometheus text format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state.metrics.render_prometheus().await;
    trace!(bytes = body.len(), "serving metrics");
    (
        StatusCode::OK,
        [("content-type", PROMETHEUS_CONTENT_TYPE)],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chaoslb_metrics::{Gauge, MetricsRegistry};
    use tower::ServiceExt;

    use crate::build_router;

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = ApiState {
            metrics: MetricsRegistry::new(),
        };
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert_eq!(content_type, PROMETHEUS_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn router_serves_current_gauges() {
        let metrics = MetricsRegistry::new();
        metrics
            .set(Gauge::VipStatus, &["10.0.0.1", "ipvs0", "default"], 1.0)
            .await;
        let router = build_router(metrics);

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# TYPE ipvs_vip_status gauge"));
        assert!(text.contains("ipvs_vip_status{vip=\"10.0.0.1\",interface=\"ipvs0\",business=\"default\"} 1"));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let router = build_router(MetricsRegistry::new());
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
