use crate::{
    bounding_box::{non_max_suppression, BoundingBox},
    config::{ClassifierConfig, DetectorConfig},
    diagnosis::ClassConfidence,
    error::ModelError,
    model_service::{Classifier, Detector},
    preprocessing::{detector_input, Crop, CropSpec},
};
use image::RgbImage;
use ndarray::{ArrayD, ArrayView4, ArrayViewD, Axis};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Initializes the process-wide ONNX runtime environment. Call once before
/// loading any model.
pub fn init_runtime() -> Result<(), ModelError> {
    ort::init().with_name("leaf_diagnosis").commit()?;
    Ok(())
}

/// Round-robin pool of sessions for one model file. Each session sits behind
/// its own mutex so a session never runs two inferences at once.
#[derive(Clone)]
struct SessionPool {
    name: &'static str,
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
}

impl SessionPool {
    fn load(name: &'static str, path: &Path, num_instances: usize) -> Result<Self, ModelError> {
        let sessions = (0..num_instances.max(1))
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|source| ModelError::Load {
                path: PathBuf::from(path),
                source,
            })?;

        tracing::info!("Created {} ONNX sessions for {} from {:?}", sessions.len(), name, path);

        Ok(Self {
            name,
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|_| ModelError::PoisonedSession)?;

        tracing::debug!("Running {} with session {}", self.name, index);

        let tensor_ref = TensorRef::from_array_view(input)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;
        let output = outputs[0].try_extract_array::<f32>()?.to_owned();

        Ok(output)
    }
}

#[derive(Clone)]
pub struct OrtDetector {
    pool: SessionPool,
    config: DetectorConfig,
}

impl OrtDetector {
    pub fn new(model_path: &Path, config: &DetectorConfig) -> Result<Self, ModelError> {
        Ok(Self {
            pool: SessionPool::load("detector", model_path, config.num_instances)?,
            config: config.clone(),
        })
    }
}

impl Detector for OrtDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, ModelError> {
        let size = self.config.input_size;
        let input = detector_input(image, size, self.config.channel_order);
        let output = self.pool.run(input.view())?;

        let scale = (
            image.width() as f32 / size as f32,
            image.height() as f32 / size as f32,
        );

        decode_detections(
            output.view(),
            scale,
            self.config.min_probability,
            self.config.iou_threshold,
        )
    }
}

/// Decodes a YOLO-style `[1, 4 + classes, anchors]` output, where each anchor
/// column holds `cx, cy, w, h` at detector resolution followed by the class
/// scores. Boxes are rescaled by `scale`, filtered and suppressed.
pub fn decode_detections(
    output: ArrayViewD<'_, f32>,
    scale: (f32, f32),
    min_probability: f32,
    iou_threshold: f32,
) -> Result<Vec<BoundingBox>, ModelError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(ModelError::UnexpectedOutput(format!(
            "detector output shape {:?}, expected [1, 4 + classes, anchors]",
            shape
        )));
    }

    let (scale_x, scale_y) = scale;
    let predictions = output.index_axis(Axis(0), 0);
    let mut boxes = Vec::new();

    for anchor in predictions.axis_iter(Axis(1)) {
        let Some((class_id, prob)) = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
        else {
            continue;
        };

        if prob < min_probability {
            continue;
        }

        let xc = anchor[0] * scale_x;
        let yc = anchor[1] * scale_y;
        let w = anchor[2] * scale_x;
        let h = anchor[3] * scale_y;

        boxes.push(BoundingBox {
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
            confidence: prob,
            class_id,
        });
    }

    Ok(non_max_suppression(boxes, iou_threshold))
}

#[derive(Clone)]
pub struct OrtClassifier {
    pool: SessionPool,
    config: ClassifierConfig,
}

impl OrtClassifier {
    pub fn new(model_path: &Path, config: &ClassifierConfig) -> Result<Self, ModelError> {
        Ok(Self {
            pool: SessionPool::load("classifier", model_path, config.num_instances)?,
            config: config.clone(),
        })
    }
}

impl Classifier for OrtClassifier {
    fn crop_spec(&self) -> CropSpec {
        CropSpec {
            side: self.config.input_size,
            order: self.config.channel_order,
        }
    }

    fn classify(&self, crop: &Crop) -> Result<ClassConfidence, ModelError> {
        let input = crop.to_tensor(self.config.layout);
        let output = self.pool.run(input.view())?;
        scores_from_output(output.view())
    }
}

/// Accepts `[classes]` or `[1, classes]`.
fn scores_from_output(output: ArrayViewD<'_, f32>) -> Result<ClassConfidence, ModelError> {
    match output.shape() {
        [_] | [1, _] => Ok(ClassConfidence::new(output.iter().copied().collect())),
        shape => Err(ModelError::UnexpectedOutput(format!(
            "classifier output shape {:?}, expected [1, classes]",
            shape
        ))),
    }
}
