use crate::server::SharedState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, TextEncoder};

pub async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let metric_families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use crate::{
        config::LimitsConfig,
        pipeline::tests::{pipeline, StubClassifier},
        server::{build_router, SharedState},
        telemetry::Metrics,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_endpoint_exports_text_format() {
        let limits = LimitsConfig::default();
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_request("ok");
        let state = SharedState::new(
            Arc::new(pipeline(vec![], Arc::new(StubClassifier::new(vec![vec![0.0; 4]])))),
            metrics,
            &limits,
        );

        let response = build_router(state, &limits)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("diagnose_requests_total"));
    }
}
