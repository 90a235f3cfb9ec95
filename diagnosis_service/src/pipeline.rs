use crate::annotate::Annotator;
use image::{codecs::jpeg::JpegEncoder, ImageError, RgbImage};
use leaf_inference::{
    BoundingBox, Classifier, Crop, Detector, DiagnosisLabel, ModelError, PixelRegion,
};
use std::{sync::Arc, time::Instant};
use thiserror::Error;

const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] ImageError),
    #[error("Model failure: {0}")]
    Model(#[from] ModelError),
    #[error("Failed to encode image: {0}")]
    Encode(#[source] ImageError),
}

/// Outcome for one detector box.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub bbox: BoundingBox,
    pub region: PixelRegion,
    pub label: DiagnosisLabel,
    /// Highest raw classifier score, absent when the classifier was skipped.
    pub top_score: Option<f32>,
}

#[derive(Debug)]
pub struct DiagnosisReport {
    pub jpeg: Vec<u8>,
    pub diagnoses: Vec<Diagnosis>,
}

/// Detector -> per-box classifier -> annotation, for one image at a time.
pub struct DiagnosisPipeline {
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    annotator: Annotator,
}

impl DiagnosisPipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        annotator: Annotator,
    ) -> Self {
        Self {
            detector,
            classifier,
            annotator,
        }
    }

    /// Decodes `bytes`, annotates the image and encodes it back to JPEG.
    pub fn run(&self, bytes: &[u8]) -> Result<DiagnosisReport, PipelineError> {
        let started = Instant::now();
        let mut image = decode_image(bytes)?;
        let diagnoses = self.diagnose(&mut image)?;
        let jpeg = encode_jpeg(&image).map_err(PipelineError::Encode)?;

        tracing::info!(
            "Diagnosed {} regions on {}x{} image in {} ms",
            diagnoses.len(),
            image.width(),
            image.height(),
            started.elapsed().as_millis()
        );

        Ok(DiagnosisReport { jpeg, diagnoses })
    }

    /// Runs detection and one label attempt per box, drawing every box onto
    /// `image`. The returned diagnoses follow detector order.
    pub fn diagnose(&self, image: &mut RgbImage) -> Result<Vec<Diagnosis>, ModelError> {
        let boxes = self.detector.detect(image)?;
        tracing::debug!("Detector returned {} boxes", boxes.len());

        let crop_spec = self.classifier.crop_spec();
        let mut diagnoses = Vec::with_capacity(boxes.len());

        // Crops come from the shared buffer, so overlapping boxes see the
        // outlines drawn for earlier ones.
        for (i, bbox) in boxes.into_iter().enumerate() {
            let region = bbox.clip_to(image.width(), image.height());

            let (label, top_score) = match Crop::extract(image, &region, crop_spec) {
                Some(crop) => {
                    let confidence = self.classifier.classify(&crop)?;
                    let top_score = confidence.max().map(|(_, score)| score);
                    (confidence.select_label()?, top_score)
                }
                None => {
                    tracing::warn!("Box {} is empty after clipping: {:?}", i, bbox);
                    (DiagnosisLabel::Undetermined, None)
                }
            };

            tracing::debug!(
                "Detection {}: confidence={:.3}, region=({}, {}, {}, {}), label={}, top_score={:?}",
                i,
                bbox.confidence,
                region.x_min,
                region.y_min,
                region.x_max,
                region.y_max,
                label,
                top_score
            );

            self.annotator.draw(image, &region, label);
            diagnoses.push(Diagnosis {
                bbox,
                region,
                label,
                top_score,
            });
        }

        Ok(diagnoses)
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    let image = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(ImageError::IoError(e)))?
        .decode()
        .map_err(PipelineError::Decode)?;

    Ok(image.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(image)?;
    Ok(buffer)
}
