// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Synthesized reference points for metrics measured against a fixed axis.
//!
//! Offsets are pixel magnitudes at a canonical image size. Only the direction
//! of the imaginary point matters for the angle itself; the magnitude decides
//! where the reference marker is drawn.

use crate::pose::{Point, Side};

/// Default offset magnitude in pixels.
pub const DEFAULT_IMAGINARY_OFFSET: f32 = 100.0;

/// Preprocessing target size the default offset was calibrated for.
pub const CANONICAL_IMAGE_SIZE: u32 = 256;

/// Direction of a synthesized reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImaginaryKind {
    /// Straight up from the base point (vertical reference axis).
    Vertical,
    /// Toward posterior/anterior depending on side (horizontal reference axis).
    Horizontal,
}

/// A synthesized point together with the detected point it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImaginaryPoint {
    /// Kind of reference axis.
    pub kind: ImaginaryKind,
    /// Detected point the offset starts from.
    pub base: Point,
    /// Synthesized location.
    pub point: Point,
}

/// Offset magnitude policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImaginaryOffset {
    /// Offset in pixels at `canonical_size`.
    pub pixels: f32,
    /// Image size `pixels` refers to.
    pub canonical_size: u32,
    /// Scale `pixels` by the actual image size relative to `canonical_size`.
    pub scale_to_image: bool,
}

impl Default for ImaginaryOffset {
    fn default() -> Self {
        Self {
            pixels: DEFAULT_IMAGINARY_OFFSET,
            canonical_size: CANONICAL_IMAGE_SIZE,
            scale_to_image: false,
        }
    }
}

impl ImaginaryOffset {
    /// Effective offset for an image of `(width, height)` pixels.
    #[must_use]
    pub fn resolve(&self, image_dims: (u32, u32)) -> f32 {
        if !self.scale_to_image || self.canonical_size == 0 {
            return self.pixels;
        }
        let longest = image_dims.0.max(image_dims.1);
        if longest == 0 {
            return self.pixels;
        }
        #[allow(clippy::cast_precision_loss)]
        let factor = longest as f32 / self.canonical_size as f32;
        self.pixels * factor
    }
}

/// Synthesize a reference point `offset` pixels away from `base`.
///
/// Vertical points sit directly above `base` (image y grows downwards).
/// Horizontal points sit at `x - offset` for the right side and `x + offset`
/// for the left side.
#[must_use]
pub fn synthesize(kind: ImaginaryKind, base: Point, side: Side, offset: f32) -> Point {
    match kind {
        ImaginaryKind::Vertical => Point::new(base.x, base.y - offset),
        ImaginaryKind::Horizontal => Point::new(base.x - side.horizontal_sign() * offset, base.y),
    }
}

/// Build an [`ImaginaryPoint`] from `base`.
#[must_use]
pub fn imaginary_point(kind: ImaginaryKind, base: Point, side: Side, offset: f32) -> ImaginaryPoint {
    ImaginaryPoint {
        kind,
        base,
        point: synthesize(kind, base, side, offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_is_above() {
        let point = synthesize(
            ImaginaryKind::Vertical,
            Point::new(40.0, 300.0),
            Side::Right,
            100.0,
        );
        assert_eq!(point, Point::new(40.0, 200.0));
    }

    #[test]
    fn test_vertical_ignores_side() {
        let base = Point::new(40.0, 300.0);
        assert_eq!(
            synthesize(ImaginaryKind::Vertical, base, Side::Left, 100.0),
            synthesize(ImaginaryKind::Vertical, base, Side::Right, 100.0)
        );
    }

    #[test]
    fn test_horizontal_mirrors_by_side() {
        let base = Point::new(200.0, 150.0);
        let right = synthesize(ImaginaryKind::Horizontal, base, Side::Right, 100.0);
        let left = synthesize(ImaginaryKind::Horizontal, base, Side::Left, 100.0);
        assert_eq!(right, Point::new(100.0, 150.0));
        assert_eq!(left, Point::new(300.0, 150.0));
    }

    #[test]
    fn test_offset_resolution() {
        let fixed = ImaginaryOffset::default();
        assert!((fixed.resolve((1024, 768)) - 100.0).abs() < f32::EPSILON);

        let scaled = ImaginaryOffset {
            scale_to_image: true,
            ..ImaginaryOffset::default()
        };
        assert!((scaled.resolve((512, 300)) - 200.0).abs() < 1e-4);
        assert!((scaled.resolve((0, 0)) - 100.0).abs() < f32::EPSILON);
    }
}
