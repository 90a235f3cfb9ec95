use crate::{
    bounding_box::BoundingBox,
    diagnosis::ClassConfidence,
    error::ModelError,
    preprocessing::{Crop, CropSpec},
};
use image::RgbImage;

/// Localizes candidate diseased regions on a full image.
///
/// Implementations are invoked from blocking worker threads and must be safe
/// to share between them.
pub trait Detector: Send + Sync + 'static {
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, ModelError>;
}

/// Scores one cropped region against the known disease classes.
pub trait Classifier: Send + Sync + 'static {
    fn crop_spec(&self) -> CropSpec {
        CropSpec::default()
    }

    fn classify(&self, crop: &Crop) -> Result<ClassConfidence, ModelError>;
}
