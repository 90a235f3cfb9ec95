mod diagnose;
mod health;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use diagnose::diagnose;
use health::healthcheck;
use metrics::metrics_handler;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/diagnose", post(diagnose))
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler))
}
