use crate::{
    config::LimitsConfig, pipeline::DiagnosisPipeline, routes::api_routes, telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    sync::{broadcast::Receiver, Semaphore},
    task::JoinHandle,
};

#[derive(Clone)]
pub struct SharedState {
    pub pipeline: Arc<DiagnosisPipeline>,
    pub metrics: Arc<Metrics>,
    /// Bounds the number of images processed at once.
    pub permits: Arc<Semaphore>,
    pub request_timeout: Duration,
}

impl SharedState {
    pub fn new(pipeline: Arc<DiagnosisPipeline>, metrics: Arc<Metrics>, limits: &LimitsConfig) -> Self {
        Self {
            pipeline,
            metrics,
            permits: Arc::new(Semaphore::new(limits.max_in_flight)),
            request_timeout: limits.get_request_timeout(),
        }
    }
}

pub fn build_router(state: SharedState, limits: &LimitsConfig) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(limits.max_upload_bytes))
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(address: &str, state: SharedState, limits: &LimitsConfig) -> anyhow::Result<Self> {
        let router = build_router(state, limits);
        let listener = TcpListener::bind(address).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
