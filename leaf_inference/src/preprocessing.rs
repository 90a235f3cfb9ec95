use crate::{
    bounding_box::PixelRegion,
    config::{ChannelOrder, TensorLayout},
};
use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{Array, Array3, Array4, ArrayView3, Axis, Ix4};

/// Resizes the whole image to the detector resolution and builds a
/// `[1, 3, size, size]` tensor scaled to `[0, 1]`.
pub fn detector_input(image: &RgbImage, size: u32, order: ChannelOrder) -> Array<f32, Ix4> {
    let resized = imageops::resize(image, size, size, FilterType::CatmullRom);
    let channels = order.source_channels();

    let mut input = Array::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, source) in channels.iter().enumerate() {
            input[[0, c, y, x]] = (pixel.0[*source] as f32) / 255.;
        }
    }

    input
}

/// Classifier input for one region: square, `[0, 1]` scaled, HWC with the
/// channels already in the classifier's order.
#[derive(Debug, Clone)]
pub struct Crop {
    pixels: Array3<f32>,
}

/// Shape and channel order a classifier expects its crops in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSpec {
    pub side: u32,
    pub order: ChannelOrder,
}

impl Default for CropSpec {
    fn default() -> Self {
        Self {
            side: 224,
            order: ChannelOrder::Bgr,
        }
    }
}

impl Crop {
    /// Returns `None` for an empty region.
    pub fn extract(image: &RgbImage, region: &PixelRegion, spec: CropSpec) -> Option<Self> {
        if region.is_empty() {
            return None;
        }

        let cropped = imageops::crop_imm(
            image,
            region.x_min,
            region.y_min,
            region.width(),
            region.height(),
        )
        .to_image();
        let resized = imageops::resize(&cropped, spec.side, spec.side, FilterType::Triangle);

        Some(Self::from_image(&resized, spec.order))
    }

    fn from_image(image: &RgbImage, order: ChannelOrder) -> Self {
        let channels = order.source_channels();
        let mut pixels = Array3::zeros((image.height() as usize, image.width() as usize, 3));
        for (x, y, pixel) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for (c, source) in channels.iter().enumerate() {
                pixels[[y, x, c]] = (pixel.0[*source] as f32) / 255.;
            }
        }

        Self { pixels }
    }

    pub fn pixels(&self) -> ArrayView3<'_, f32> {
        self.pixels.view()
    }

    /// Batch of one in the requested layout, always in standard memory order.
    pub fn to_tensor(&self, layout: TensorLayout) -> Array4<f32> {
        let batched = self.pixels.view().insert_axis(Axis(0));
        match layout {
            TensorLayout::Nhwc => batched.to_owned(),
            TensorLayout::Nchw => batched
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_detector_input_shape_and_order() {
        let img = RgbImage::from_pixel(100, 50, Rgb([255, 0, 0]));

        let rgb = detector_input(&img, 64, ChannelOrder::Rgb);
        assert_eq!(rgb.shape(), &[1, 3, 64, 64]);
        assert!((rgb[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert!(rgb[[0, 2, 10, 10]].abs() < 1e-6);

        let bgr = detector_input(&img, 64, ChannelOrder::Bgr);
        assert!(bgr[[0, 0, 10, 10]].abs() < 1e-6);
        assert!((bgr[[0, 2, 10, 10]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_crop_is_scaled_and_reordered() {
        let mut img = RgbImage::from_pixel(640, 480, Rgb([0, 0, 0]));
        for x in 100..200 {
            for y in 100..200 {
                img.put_pixel(x, y, Rgb([255, 128, 0]));
            }
        }
        let region = PixelRegion {
            x_min: 100,
            y_min: 100,
            x_max: 200,
            y_max: 200,
        };

        let crop = Crop::extract(&img, &region, CropSpec::default()).unwrap();
        let pixels = crop.pixels();

        assert_eq!(pixels.shape(), &[224, 224, 3]);
        assert!(pixels.iter().all(|v| (0.0..=1.0).contains(v)));
        // BGR: blue first
        assert!(pixels[[112, 112, 0]].abs() < 1e-6);
        assert!((pixels[[112, 112, 1]] - 128.0 / 255.0).abs() < 5e-3);
        assert!((pixels[[112, 112, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_region_yields_no_crop() {
        let img = RgbImage::new(10, 10);
        let region = PixelRegion {
            x_min: 10,
            y_min: 0,
            x_max: 10,
            y_max: 5,
        };
        assert!(Crop::extract(&img, &region, CropSpec::default()).is_none());
    }

    #[test]
    fn test_crop_tensor_layouts() {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(1, 2, Rgb([255, 0, 0]));
        let spec = CropSpec {
            side: 4,
            order: ChannelOrder::Rgb,
        };
        let region = PixelRegion {
            x_min: 0,
            y_min: 0,
            x_max: 4,
            y_max: 4,
        };
        let crop = Crop::extract(&img, &region, spec).unwrap();

        let nhwc = crop.to_tensor(TensorLayout::Nhwc);
        assert_eq!(nhwc.shape(), &[1, 4, 4, 3]);
        assert!(nhwc.is_standard_layout());

        let nchw = crop.to_tensor(TensorLayout::Nchw);
        assert_eq!(nchw.shape(), &[1, 3, 4, 4]);
        assert!(nchw.is_standard_layout());
        assert_eq!(nchw[[0, 0, 2, 1]], nhwc[[0, 2, 1, 0]]);
    }
}
