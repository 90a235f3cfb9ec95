use crate::annotate::Annotator;
use crate::config::Config;
use crate::pipeline::DiagnosisPipeline;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;

use anyhow::Context;
use leaf_inference::{init_runtime, OrtClassifier, OrtDetector};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    init_runtime().context("Failed to initialize ONNX runtime")?;

    let models = &config.models;
    let detector = match OrtDetector::new(&models.detector_model_path, &models.detector) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            tracing::error!("Failed to load detector model: {:?}", e);
            return Err(e.into());
        }
    };

    let classifier = match OrtClassifier::new(&models.classifier_model_path, &models.classifier) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::error!("Failed to load classifier model: {:?}", e);
            return Err(e.into());
        }
    };

    let annotator = Annotator::new(&config.annotation).context("Failed to load annotation font")?;
    let pipeline = Arc::new(DiagnosisPipeline::new(detector, classifier, annotator));
    let metrics = Arc::new(Metrics::new()?);

    let state = SharedState::new(pipeline, metrics, &config.limits);
    let server = HttpServer::new(&config.server.get_address(), state, &config.limits).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
