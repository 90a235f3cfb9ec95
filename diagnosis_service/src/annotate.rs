use crate::config::AnnotationConfig;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use leaf_inference::{DiagnosisLabel, PixelRegion};
use std::path::PathBuf;
use thiserror::Error;

/// Gap in pixels between the top edge of a box and the bottom of its label.
const LABEL_OFFSET: i32 = 10;

static DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Failed to read font {path:?}: {source}")]
    ReadFont {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid font {0}")]
    InvalidFont(String),
}

/// Draws diagnosis boxes and captions onto the request image in place.
#[derive(Clone)]
pub struct Annotator {
    font: FontArc,
    scale: PxScale,
    thickness: u32,
}

impl Annotator {
    /// Uses the embedded DejaVu Sans unless `font_path` points at another font.
    pub fn new(config: &AnnotationConfig) -> Result<Self, AnnotateError> {
        let font = match &config.font_path {
            Some(path) => {
                let data = std::fs::read(path).map_err(|source| AnnotateError::ReadFont {
                    path: path.clone(),
                    source,
                })?;
                tracing::info!("Loaded annotation font from {:?}", path);
                FontArc::try_from_vec(data)
                    .map_err(|_| AnnotateError::InvalidFont(path.display().to_string()))?
            }
            None => FontArc::try_from_slice(DEFAULT_FONT)
                .map_err(|_| AnnotateError::InvalidFont("embedded DejaVu Sans".into()))?,
        };

        Ok(Self {
            font,
            scale: PxScale::from(config.font_size),
            thickness: config.thickness,
        })
    }

    /// Draws the rectangle for `region` and, when the label has a caption,
    /// the caption above it. The outline includes the `x_max`/`y_max` edge
    /// pixels when they are inside the image. Degenerate regions still get a
    /// one pixel wide outline on the nearest image edge.
    pub fn draw(&self, image: &mut RgbImage, region: &PixelRegion, label: DiagnosisLabel) {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let color = Rgb(label.color());

        let x_min = region.x_min.min(width - 1);
        let y_min = region.y_min.min(height - 1);
        let x_end = region.x_max.min(width - 1).max(x_min);
        let y_end = region.y_max.min(height - 1).max(y_min);

        for inset in 0..self.thickness {
            let rect_width = (x_end - x_min + 1).saturating_sub(2 * inset);
            let rect_height = (y_end - y_min + 1).saturating_sub(2 * inset);
            if rect_width == 0 || rect_height == 0 {
                break;
            }

            let rect = Rect::at((x_min + inset) as i32, (y_min + inset) as i32)
                .of_size(rect_width, rect_height);
            draw_hollow_rect_mut(image, rect, color);
        }

        if let Some(caption) = label.caption() {
            let (_, text_height) = text_size(self.scale, &self.font, caption);
            let text_y = y_min as i32 - LABEL_OFFSET - text_height as i32;
            draw_text_mut(
                image,
                color,
                x_min as i32,
                text_y.max(0),
                self.scale,
                &self.font,
                caption,
            );
        }
    }
}
