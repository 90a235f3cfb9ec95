use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

/// Order in which the three color channels are laid out in a model input.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Source RGB channel index for each output channel.
    pub fn source_channels(&self) -> [usize; 3] {
        match self {
            ChannelOrder::Rgb => [0, 1, 2],
            ChannelOrder::Bgr => [2, 1, 0],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nchw,
    #[default]
    Nhwc,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    pub detector_model_path: PathBuf,
    pub classifier_model_path: PathBuf,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_input_size")]
    pub input_size: u32,
    #[serde(default = "default_min_probability")]
    pub min_probability: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default)]
    pub channel_order: ChannelOrder,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: default_detector_input_size(),
            min_probability: default_min_probability(),
            iou_threshold: default_iou_threshold(),
            channel_order: ChannelOrder::Rgb,
            num_instances: default_model_instances(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_input_size")]
    pub input_size: u32,
    #[serde(default = "default_classifier_channel_order")]
    pub channel_order: ChannelOrder,
    #[serde(default)]
    pub layout: TensorLayout,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_size: default_classifier_input_size(),
            channel_order: default_classifier_channel_order(),
            layout: TensorLayout::Nhwc,
            num_instances: default_model_instances(),
        }
    }
}

fn default_detector_input_size() -> u32 {
    640
}

fn default_classifier_input_size() -> u32 {
    224
}

fn default_min_probability() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_classifier_channel_order() -> ChannelOrder {
    ChannelOrder::Bgr
}

fn default_model_instances() -> usize {
    1
}

impl Validatable for ModelsConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.detector_model_path.exists() {
            return Err(format!(
                "Detector model file not found: {:?}",
                self.detector_model_path
            ));
        }
        if !self.classifier_model_path.exists() {
            return Err(format!(
                "Classifier model file not found: {:?}",
                self.classifier_model_path
            ));
        }
        self.detector.validate()?;
        self.classifier.validate()
    }
}

impl Validatable for DetectorConfig {
    fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 {
            return Err("detector input_size must be greater than zero".into());
        }
        if self.num_instances == 0 {
            return Err("detector num_instances must be greater than zero".into());
        }
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(format!(
                "detector min_probability must be within [0, 1], got {}",
                self.min_probability
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "detector iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        Ok(())
    }
}

impl Validatable for ClassifierConfig {
    fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 {
            return Err("classifier input_size must be greater than zero".into());
        }
        if self.num_instances == 0 {
            return Err("classifier num_instances must be greater than zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order_mapping() {
        assert_eq!(ChannelOrder::Rgb.source_channels(), [0, 1, 2]);
        assert_eq!(ChannelOrder::Bgr.source_channels(), [2, 1, 0]);
    }

    #[test]
    fn test_missing_model_file_fails_validation() {
        let config = ModelsConfig {
            detector_model_path: PathBuf::from("./does/not/exist/detector.onnx"),
            classifier_model_path: PathBuf::from("./does/not/exist/classifier.onnx"),
            detector: DetectorConfig::default(),
            classifier: ClassifierConfig::default(),
        };

        let err = config.validate().unwrap_err();
        assert!(err.contains("Detector model file not found"));
    }

    #[test]
    fn test_zero_instances_rejected() {
        let detector = DetectorConfig {
            num_instances: 0,
            ..DetectorConfig::default()
        };
        assert!(detector.validate().is_err());

        let classifier = ClassifierConfig {
            input_size: 0,
            ..ClassifierConfig::default()
        };
        assert!(classifier.validate().is_err());
    }

    #[test]
    fn test_defaults_match_reference_models() {
        let classifier = ClassifierConfig::default();
        assert_eq!(classifier.input_size, 224);
        assert_eq!(classifier.channel_order, ChannelOrder::Bgr);
        assert_eq!(classifier.layout, TensorLayout::Nhwc);

        let detector = DetectorConfig::default();
        assert_eq!(detector.input_size, 640);
        assert_eq!(detector.channel_order, ChannelOrder::Rgb);
    }
}
