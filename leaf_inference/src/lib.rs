mod bounding_box;
mod diagnosis;
mod error;
mod model_service;
mod ort_service;
mod preprocessing;

pub mod config;

pub use bounding_box::{non_max_suppression, BoundingBox, PixelRegion};
pub use diagnosis::{ClassConfidence, DiagnosisLabel, CONFIDENCE_THRESHOLD};
pub use error::ModelError;
pub use model_service::{Classifier, Detector};
pub use ort_service::{decode_detections, init_runtime, OrtClassifier, OrtDetector};
pub use preprocessing::{detector_input, Crop, CropSpec};
