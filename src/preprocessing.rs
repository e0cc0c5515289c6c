// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Letterbox preprocessing for pose inference.
//!
//! Images are resized to fit the model input while keeping their aspect
//! ratio, centered on a gray canvas, and converted to a normalized NCHW
//! tensor. [`Letterbox`] records the transform so keypoints can be mapped
//! back to original image coordinates.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

/// Default letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Geometry of a letterbox transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Original image size (height, width).
    pub orig_shape: (u32, u32),
    /// Resized content size before padding (width, height).
    pub new_size: (u32, u32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
}

impl Letterbox {
    /// Compute letterbox parameters for an image of `orig_width` x
    /// `orig_height` fitted into `target_size` (height, width).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn new(orig_width: u32, orig_height: u32, target_size: (usize, usize)) -> Self {
        let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
        let (orig_h, orig_w) = (orig_height.max(1) as f32, orig_width.max(1) as f32);

        let scale = (target_h / orig_h).min(target_w / orig_w);
        let new_w = ((orig_w * scale).round() as u32).max(1);
        let new_h = ((orig_h * scale).round() as u32).max(1);

        // Center alignment: divide padding equally on both sides
        let pad_left = (target_size.1 as u32).saturating_sub(new_w) / 2;
        let pad_top = (target_size.0 as u32).saturating_sub(new_h) / 2;

        Self {
            orig_shape: (orig_height, orig_width),
            new_size: (new_w, new_h),
            padding: (pad_top as f32, pad_left as f32),
            scale: (new_h as f32 / orig_h, new_w as f32 / orig_w),
        }
    }

    /// Map a point from model input space back to the original image.
    #[must_use]
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        let (scale_y, scale_x) = self.scale;
        let (pad_top, pad_left) = self.padding;
        ((x - pad_left) / scale_x, (y - pad_top) / scale_y)
    }

    /// Map a box `[x1, y1, x2, y2]` from model input space back to the
    /// original image and clip it to the image bounds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn unmap_box(&self, coords: &[f32; 4]) -> [f32; 4] {
        let (x1, y1) = self.unmap(coords[0], coords[1]);
        let (x2, y2) = self.unmap(coords[2], coords[3]);
        let (h, w) = (self.orig_shape.0 as f32, self.orig_shape.1 as f32);
        [
            x1.clamp(0.0, w),
            y1.clamp(0.0, h),
            x2.clamp(0.0, w),
            y2.clamp(0.0, h),
        ]
    }
}

/// Result of preprocessing an image.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Image tensor in NCHW format, normalized to [0, 1].
    pub tensor: Array4<f32>,
    /// Transform applied to the image.
    pub letterbox: Letterbox,
}

/// Letterbox `image` into `target_size` (height, width) and build the input tensor.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn preprocess_image(image: &DynamicImage, target_size: (usize, usize)) -> PreprocessResult {
    let letterbox = Letterbox::new(image.width(), image.height(), target_size);
    let (new_w, new_h) = letterbox.new_size;
    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

    let mut canvas = RgbImage::from_pixel(
        target_size.1 as u32,
        target_size.0 as u32,
        Rgb(LETTERBOX_COLOR),
    );
    let (pad_top, pad_left) = letterbox.padding;
    imageops::overlay(&mut canvas, &resized, i64::from(pad_left as u32), i64::from(pad_top as u32));

    PreprocessResult {
        tensor: image_to_tensor(&canvas),
        letterbox,
    }
}

/// Convert an RGB image to a normalized NCHW tensor.
#[must_use]
pub fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_square() {
        let lb = Letterbox::new(640, 640, (640, 640));
        assert_eq!(lb.new_size, (640, 640));
        assert_eq!(lb.padding, (0.0, 0.0));
    }

    #[test]
    fn test_letterbox_wide_pads_height() {
        let lb = Letterbox::new(1280, 720, (640, 640));
        assert_eq!(lb.new_size, (640, 360));
        assert_eq!(lb.padding, (140.0, 0.0));
        let (x, y) = lb.unmap(320.0, 320.0);
        assert!((x - 640.0).abs() < 1e-3);
        assert!((y - 360.0).abs() < 1e-3);
    }

    #[test]
    fn test_unmap_box_clips() {
        let lb = Letterbox::new(640, 480, (640, 640));
        let mapped = lb.unmap_box(&[-10.0, 0.0, 700.0, 640.0]);
        assert!((mapped[0] - 0.0).abs() < 1e-6);
        assert!((mapped[1] - 0.0).abs() < 1e-6);
        assert!((mapped[2] - 640.0).abs() < 1e-6);
        assert!((mapped[3] - 480.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 0, 0])));
        let result = preprocess_image(&image, (64, 64));
        assert_eq!(result.tensor.shape(), &[1, 3, 64, 64]);
        // Top rows are padding, middle rows are image content
        assert!((result.tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
        assert!((result.tensor[[0, 0, 32, 32]] - 1.0).abs() < 1e-6);
        assert!(result.tensor[[0, 1, 32, 32]].abs() < 1e-6);
    }
}
