use crate::error::ModelError;
use std::fmt;

/// A class is active when its confidence is strictly above this value.
pub const CONFIDENCE_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosisLabel {
    Rust,
    Miner,
    Phoma,
    Cercospora,
    Undetermined,
}

impl DiagnosisLabel {
    /// Classifier output indices in priority order.
    pub const PRIORITY: [DiagnosisLabel; 4] = [
        DiagnosisLabel::Rust,
        DiagnosisLabel::Miner,
        DiagnosisLabel::Phoma,
        DiagnosisLabel::Cercospora,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisLabel::Rust => "Rust",
            DiagnosisLabel::Miner => "Miner",
            DiagnosisLabel::Phoma => "Phoma",
            DiagnosisLabel::Cercospora => "Cercospora",
            DiagnosisLabel::Undetermined => "undetermined",
        }
    }

    /// Text drawn above the box, if any.
    pub fn caption(&self) -> Option<&'static str> {
        match self {
            DiagnosisLabel::Undetermined => None,
            other => Some(other.as_str()),
        }
    }

    /// Display color as RGB.
    pub fn color(&self) -> [u8; 3] {
        match self {
            DiagnosisLabel::Rust => [255, 0, 0],
            DiagnosisLabel::Miner => [0, 255, 0],
            DiagnosisLabel::Phoma => [0, 0, 255],
            DiagnosisLabel::Cercospora => [255, 255, 0],
            DiagnosisLabel::Undetermined => [255, 255, 255],
        }
    }
}

impl fmt::Display for DiagnosisLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class scores produced by the classifier for one crop.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassConfidence {
    scores: Vec<f32>,
}

impl ClassConfidence {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Highest score and its class index.
    pub fn max(&self) -> Option<(usize, f32)> {
        self.scores
            .iter()
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
    }

    /// Picks the first active class in priority order.
    ///
    /// This is a tie-break over the thresholded mask, not an argmax: when
    /// both Rust and Phoma pass the threshold, Rust wins regardless of which
    /// score is higher. Scores beyond the known classes are ignored.
    pub fn select_label(&self) -> Result<DiagnosisLabel, ModelError> {
        if self.scores.len() < DiagnosisLabel::PRIORITY.len() {
            return Err(ModelError::UnexpectedOutput(format!(
                "classifier returned {} scores, expected at least {}",
                self.scores.len(),
                DiagnosisLabel::PRIORITY.len()
            )));
        }

        let label = DiagnosisLabel::PRIORITY
            .iter()
            .zip(&self.scores)
            .find(|(_, score)| **score > CONFIDENCE_THRESHOLD)
            .map(|(label, _)| *label)
            .unwrap_or(DiagnosisLabel::Undetermined);

        Ok(label)
    }
}
