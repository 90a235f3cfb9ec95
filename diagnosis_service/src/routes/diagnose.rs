use crate::{pipeline::PipelineError, server::SharedState};
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::instrument;

const IMAGE_FIELD: &str = "image";
pub const DIAGNOSIS_LABELS_HEADER: HeaderName = HeaderName::from_static("x-diagnosis-labels");

#[derive(Error, Debug)]
pub enum DiagnoseError {
    #[error("No image provided")]
    NoImage,
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Diagnosis worker failed: {0}")]
    Worker(#[from] JoinError),
    #[error("Request timed out")]
    Timeout,
    #[error("Service unavailable")]
    Unavailable,
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl DiagnoseError {
    fn status(&self) -> StatusCode {
        match self {
            DiagnoseError::NoImage => StatusCode::BAD_REQUEST,
            DiagnoseError::Multipart(err) => err.status(),
            DiagnoseError::Pipeline(PipelineError::Decode(_)) => StatusCode::BAD_REQUEST,
            DiagnoseError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DiagnoseError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DiagnoseError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            DiagnoseError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            DiagnoseError::HttpBuilder(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Server-side failures stay generic.
    fn public_message(&self) -> String {
        match self {
            DiagnoseError::Pipeline(PipelineError::Model(_)) => "Inference failed".into(),
            DiagnoseError::Pipeline(PipelineError::Encode(_))
            | DiagnoseError::Worker(_)
            | DiagnoseError::HttpBuilder(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            DiagnoseError::NoImage => "no_image",
            DiagnoseError::Multipart(_) => "bad_multipart",
            DiagnoseError::Pipeline(PipelineError::Decode(_)) => "bad_image",
            DiagnoseError::Pipeline(PipelineError::Model(_)) => "model_error",
            DiagnoseError::Timeout => "timeout",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for DiagnoseError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Diagnosis failed: {}", self);
        } else {
            tracing::warn!("Rejected diagnosis request: {}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn diagnose(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, DiagnoseError> {
    let started = Instant::now();
    let result = run_diagnosis(&state, multipart).await;

    match &result {
        Ok(_) => {
            state.metrics.record_request("ok");
            state
                .metrics
                .record_diagnosis_duration(started.elapsed().as_millis() as u64);
        }
        Err(err) => state.metrics.record_request(err.outcome()),
    }

    result
}

async fn run_diagnosis(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, DiagnoseError> {
    let image_data = read_image_field(multipart).await?;
    tracing::debug!("Received image of {} bytes", image_data.len());

    let permits = state.permits.clone();
    let pipeline = state.pipeline.clone();
    let job = async move {
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|_| DiagnoseError::Unavailable)?;

        // The permit is held until the blocking work finishes, even if the
        // request itself has already timed out.
        let report = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.run(&image_data)
        })
        .await??;

        Ok::<_, DiagnoseError>(report)
    };

    let report = tokio::time::timeout(state.request_timeout, job)
        .await
        .map_err(|_| DiagnoseError::Timeout)??;

    let labels = report
        .diagnoses
        .iter()
        .map(|diagnosis| diagnosis.label.as_str())
        .collect::<Vec<_>>();
    state.metrics.record_labels(labels.iter().copied());

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(DIAGNOSIS_LABELS_HEADER, labels.join(","))
        .body(Body::from(report.jpeg))
        .map_err(|e| DiagnoseError::HttpBuilder(e.to_string()))?;

    Ok(response)
}

/// Returns the bytes of the first `image` field.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, DiagnoseError> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("Request is not multipart: {}", rejection);
        DiagnoseError::NoImage
    })?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return Ok(field.bytes().await?);
        }
    }

    Err(DiagnoseError::NoImage)
}
