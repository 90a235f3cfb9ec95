use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to load model {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Invalid tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
    #[error("Session mutex poisoned")]
    PoisonedSession,
}
