// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Analysis and model configuration.
//!
//! [`AnalysisConfig`] controls the per-metric pipeline: confidence gating,
//! provider options, the imaginary-point offset, image size limits and the
//! overall request deadline. [`ModelConfig`] holds ONNX Runtime options for
//! the bundled [`PoseModel`](crate::model::PoseModel).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::confidence::DEFAULT_MIN_CONFIDENCE;
use crate::error::{GoniometryError, Result};
use crate::imaginary::{CANONICAL_IMAGE_SIZE, DEFAULT_IMAGINARY_OFFSET, ImaginaryOffset};
use crate::pose::Side;

/// Default overall request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default cap on the longest image side before detection.
pub const DEFAULT_MAX_IMAGE_DIM: u32 = 800;

/// When the provider should mirror the image horizontally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlipPolicy {
    /// Never flip.
    #[default]
    Never,
    /// Always flip.
    Always,
    /// Flip only when measuring the left side.
    LeftSide,
}

impl FlipPolicy {
    /// Whether the provider should flip for a request on `side`.
    #[must_use]
    pub const fn should_flip(&self, side: Side) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::LeftSide => matches!(side, Side::Left),
        }
    }
}

impl fmt::Display for FlipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::LeftSide => "left",
        };
        write!(f, "{name}")
    }
}

impl FromStr for FlipPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "never" | "false" | "no" => Ok(Self::Never),
            "always" | "true" | "yes" => Ok(Self::Always),
            "left" | "left-side" | "leftside" => Ok(Self::LeftSide),
            _ => Err(format!(
                "Unknown flip policy: {s} (expected 'never', 'always' or 'left')"
            )),
        }
    }
}

/// Configuration for the joint-angle pipeline.
///
/// # Example
///
/// ```rust
/// use pose_goniometry::{AnalysisConfig, FlipPolicy};
///
/// let config = AnalysisConfig::new()
///     .with_min_keypoint_confidence(0.6)
///     .with_flip(FlipPolicy::LeftSide)
///     .with_max_image_dim(Some(1024));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Minimum score for a detected keypoint to be used in an angle.
    pub min_keypoint_confidence: f32,
    /// Minimum overall pose score passed to the provider.
    pub pose_score_threshold: f32,
    /// Maximum poses requested from the provider. Only the first is measured.
    pub max_poses: usize,
    /// Horizontal flip policy passed to the provider.
    pub flip: FlipPolicy,
    /// Imaginary point offset in pixels at `canonical_size`.
    pub imaginary_offset: f32,
    /// Preprocessing size the offset refers to.
    pub canonical_size: u32,
    /// Scale the offset by the actual image size.
    pub scale_offset_to_image: bool,
    /// Downscale images whose longest side exceeds this before detection.
    pub max_image_dim: Option<u32>,
    /// Produce annotated images.
    pub annotate: bool,
    /// TrueType font used for labels. `None` uses the cached default font,
    /// downloading it on first use.
    pub font_path: Option<PathBuf>,
    /// Overall deadline for a concurrent request.
    pub request_timeout: Duration,
    /// Keypoints scoring above this get a marker and a name label.
    pub label_marker_threshold: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_keypoint_confidence: DEFAULT_MIN_CONFIDENCE,
            pose_score_threshold: 0.5,
            max_poses: 1,
            flip: FlipPolicy::Never,
            imaginary_offset: DEFAULT_IMAGINARY_OFFSET,
            canonical_size: CANONICAL_IMAGE_SIZE,
            scale_offset_to_image: false,
            max_image_dim: Some(DEFAULT_MAX_IMAGE_DIM),
            annotate: true,
            font_path: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            label_marker_threshold: 0.5,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum keypoint confidence used for gating.
    #[must_use]
    pub const fn with_min_keypoint_confidence(mut self, threshold: f32) -> Self {
        self.min_keypoint_confidence = threshold;
        self
    }

    /// Set the pose score threshold passed to the provider.
    #[must_use]
    pub const fn with_pose_score_threshold(mut self, threshold: f32) -> Self {
        self.pose_score_threshold = threshold;
        self
    }

    /// Set the maximum number of poses requested from the provider.
    #[must_use]
    pub const fn with_max_poses(mut self, max: usize) -> Self {
        self.max_poses = max;
        self
    }

    /// Set the horizontal flip policy.
    #[must_use]
    pub const fn with_flip(mut self, flip: FlipPolicy) -> Self {
        self.flip = flip;
        self
    }

    /// Set the imaginary point offset in pixels.
    #[must_use]
    pub const fn with_imaginary_offset(mut self, pixels: f32) -> Self {
        self.imaginary_offset = pixels;
        self
    }

    /// Set the canonical image size the offset refers to.
    #[must_use]
    pub const fn with_canonical_size(mut self, size: u32) -> Self {
        self.canonical_size = size;
        self
    }

    /// Scale the imaginary offset with the image size.
    #[must_use]
    pub const fn with_scale_offset_to_image(mut self, scale: bool) -> Self {
        self.scale_offset_to_image = scale;
        self
    }

    /// Set the maximum image dimension. `None` disables downscaling.
    #[must_use]
    pub const fn with_max_image_dim(mut self, max_dim: Option<u32>) -> Self {
        self.max_image_dim = max_dim;
        self
    }

    /// Enable or disable annotated image output.
    #[must_use]
    pub const fn with_annotate(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Set the font used for text labels.
    #[must_use]
    pub fn with_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    /// Set the overall request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the marker visibility threshold.
    #[must_use]
    pub const fn with_label_marker_threshold(mut self, threshold: f32) -> Self {
        self.label_marker_threshold = threshold;
        self
    }

    /// Offset policy for the imaginary point synthesizer.
    #[must_use]
    pub const fn offset(&self) -> ImaginaryOffset {
        ImaginaryOffset {
            pixels: self.imaginary_offset,
            canonical_size: self.canonical_size,
            scale_to_image: self.scale_offset_to_image,
        }
    }

    /// Check the configuration for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`GoniometryError::ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        check_unit("min_keypoint_confidence", self.min_keypoint_confidence)?;
        check_unit("pose_score_threshold", self.pose_score_threshold)?;
        check_unit("label_marker_threshold", self.label_marker_threshold)?;
        if self.max_poses == 0 {
            return Err(GoniometryError::ConfigError(
                "max_poses must be at least 1".to_string(),
            ));
        }
        if !(self.imaginary_offset.is_finite() && self.imaginary_offset > 0.0) {
            return Err(GoniometryError::ConfigError(format!(
                "imaginary_offset must be positive, got {}",
                self.imaginary_offset
            )));
        }
        if self.canonical_size == 0 {
            return Err(GoniometryError::ConfigError(
                "canonical_size must be positive".to_string(),
            ));
        }
        if self.max_image_dim == Some(0) {
            return Err(GoniometryError::ConfigError(
                "max_image_dim must be positive".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(GoniometryError::ConfigError(
                "request_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unit(field: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(GoniometryError::ConfigError(format!(
            "{field} must be within [0, 1], got {value}"
        )))
    }
}

/// ONNX Runtime options for [`PoseModel`](crate::model::PoseModel).
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// IoU threshold for Non-Maximum Suppression between person candidates.
    pub iou_threshold: f32,
    /// Explicit input size (height, width). `None` uses model metadata.
    pub imgsz: Option<(usize, usize)>,
    /// Intra-op threads. `0` lets ONNX Runtime decide.
    pub num_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.45,
            imgsz: None,
            num_threads: 0,
        }
    }
}

impl ModelConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the IoU threshold for NMS.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Set the input image size.
    #[must_use]
    pub const fn with_imgsz(mut self, height: usize, width: usize) -> Self {
        self.imgsz = Some((height, width));
        self
    }

    /// Set the number of intra-op threads.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = AnalysisConfig::default();
        assert!((config.min_keypoint_confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.max_poses, 1);
        assert_eq!(config.flip, FlipPolicy::Never);
        assert!((config.imaginary_offset - 100.0).abs() < f32::EPSILON);
        assert_eq!(config.canonical_size, 256);
        assert_eq!(config.max_image_dim, Some(800));
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = AnalysisConfig::new()
            .with_min_keypoint_confidence(0.8)
            .with_flip(FlipPolicy::Always)
            .with_imaginary_offset(50.0)
            .with_annotate(false)
            .with_font_path("/tmp/font.ttf")
            .with_request_timeout(Duration::from_secs(5));

        assert!((config.min_keypoint_confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.flip, FlipPolicy::Always);
        assert!(!config.annotate);
        assert_eq!(config.font_path, Some(PathBuf::from("/tmp/font.ttf")));
        assert!((config.offset().pixels - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(
            AnalysisConfig::new()
                .with_min_keypoint_confidence(1.5)
                .validate()
                .is_err()
        );
        assert!(AnalysisConfig::new().with_max_poses(0).validate().is_err());
        assert!(
            AnalysisConfig::new()
                .with_imaginary_offset(0.0)
                .validate()
                .is_err()
        );
        assert!(
            AnalysisConfig::new()
                .with_max_image_dim(Some(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_flip_policy() {
        assert!(!FlipPolicy::Never.should_flip(Side::Left));
        assert!(FlipPolicy::Always.should_flip(Side::Right));
        assert!(FlipPolicy::LeftSide.should_flip(Side::Left));
        assert!(!FlipPolicy::LeftSide.should_flip(Side::Right));
        assert_eq!("left".parse::<FlipPolicy>().unwrap(), FlipPolicy::LeftSide);
        assert!("sideways".parse::<FlipPolicy>().is_err());
    }

    #[test]
    fn test_model_config_builder() {
        let config = ModelConfig::new().with_iou(0.6).with_imgsz(640, 640).with_threads(4);
        assert!((config.iou_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.imgsz, Some((640, 640)));
        assert_eq!(config.num_threads, 4);
    }
}
