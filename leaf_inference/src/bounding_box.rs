/// Detector output in original image pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence: 1.0,
            class_id: 0,
        }
    }

    fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    fn intersection(&self, other: &BoundingBox) -> f32 {
        let width = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let height = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        width * height
    }

    fn union(&self, other: &BoundingBox) -> f32 {
        self.area() + other.area() - self.intersection(other)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let union = self.union(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection(other) / union
    }

    /// Clips the box to an image of the given size.
    ///
    /// Coordinates are truncated toward zero, inverted corners are swapped and
    /// every coordinate is clamped to `[0, width]` / `[0, height]`. The result
    /// may be empty when the box lies outside the image.
    pub fn clip_to(&self, width: u32, height: u32) -> PixelRegion {
        let clamp = |v: f32, max: u32| -> u32 { (v as i64).clamp(0, max as i64) as u32 };

        let (x1, x2) = (clamp(self.x1, width), clamp(self.x2, width));
        let (y1, y2) = (clamp(self.y1, height), clamp(self.y2, height));

        PixelRegion {
            x_min: x1.min(x2),
            y_min: y1.min(y2),
            x_max: x1.max(x2),
            y_max: y1.max(y2),
        }
    }
}

/// Half-open integer rectangle `[x_min, x_max) x [y_min, y_max)` inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PixelRegion {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first. Boxes
/// of different classes never suppress each other.
pub fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut result = Vec::new();
    while let Some((best, rest)) = boxes.split_first() {
        let best = *best;
        result.push(best);
        boxes = rest
            .iter()
            .filter(|candidate| {
                candidate.class_id != best.class_id || best.iou(candidate) < iou_threshold
            })
            .copied()
            .collect();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> BoundingBox {
        BoundingBox {
            confidence,
            ..BoundingBox::new(x1, y1, x2, y2)
        }
    }

    #[test]
    fn test_clip_inside_image_truncates() {
        let region = BoundingBox::new(100.7, 100.2, 200.9, 200.5).clip_to(640, 480);
        assert_eq!(
            region,
            PixelRegion {
                x_min: 100,
                y_min: 100,
                x_max: 200,
                y_max: 200
            }
        );
        assert_eq!(region.width(), 100);
        assert_eq!(region.height(), 100);
    }

    #[test]
    fn test_clip_out_of_bounds_and_inverted() {
        let region = BoundingBox::new(700.0, 500.0, -20.0, 10.0).clip_to(640, 480);
        assert_eq!(
            region,
            PixelRegion {
                x_min: 0,
                y_min: 10,
                x_max: 640,
                y_max: 480
            }
        );
    }

    #[test]
    fn test_clip_fully_outside_is_empty() {
        let region = BoundingBox::new(800.0, 10.0, 900.0, 50.0).clip_to(640, 480);
        assert!(region.is_empty());
        assert_eq!(region.x_min, 640);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        let disjoint = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&disjoint), 0.0);
    }

    #[test]
    fn test_non_max_suppression_keeps_best_of_overlapping() {
        let boxes = vec![
            scored(0.0, 0.0, 10.0, 10.0, 0.6),
            scored(1.0, 1.0, 10.0, 10.0, 0.9),
            scored(50.0, 50.0, 60.0, 60.0, 0.7),
        ];

        let kept = non_max_suppression(boxes, 0.7);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn test_non_max_suppression_keeps_overlapping_boxes_of_other_classes() {
        let boxes = vec![
            scored(0.0, 0.0, 10.0, 10.0, 0.9),
            BoundingBox {
                class_id: 1,
                ..scored(1.0, 1.0, 10.0, 10.0, 0.8)
            },
            scored(1.0, 0.0, 10.0, 10.0, 0.5),
        ];

        let kept = non_max_suppression(boxes, 0.7);

        assert_eq!(kept.len(), 2);
        assert_eq!((kept[0].class_id, kept[0].confidence), (0, 0.9));
        assert_eq!((kept[1].class_id, kept[1].confidence), (1, 0.8));
    }
}
