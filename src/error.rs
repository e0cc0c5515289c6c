// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the goniometry library.
//!
//! Two layers exist: [`GoniometryError`] for failures that abort a whole call
//! (model loading, provider not ready, deadline exceeded), and [`MetricError`]
//! for failures captured inside a single metric's result entry.

use std::fmt;
use std::time::Duration;

/// Result type alias for goniometry operations.
pub type Result<T> = std::result::Result<T, GoniometryError>;

/// Main error type for the goniometry library.
#[derive(Debug)]
pub enum GoniometryError {
    /// Error loading the ONNX pose model.
    ModelLoadError(String),
    /// Error while running pose inference.
    InferenceError(String),
    /// Error decoding, encoding or drawing images.
    ImageError(String),
    /// Invalid configuration provided.
    ConfigError(String),
    /// IO error (file not found, permission denied, etc.).
    IoError(String),
    /// Wrapped `std::io::Error`
    Io(std::io::Error),
    /// The pose provider is not ready; the whole batch is rejected.
    ServiceUnavailable(String),
    /// The request deadline elapsed before every metric finished.
    Timeout(Duration),
    /// HTTP server setup or runtime failure.
    Server(String),
}

impl fmt::Display for GoniometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::ImageError(msg) => write!(f, "Image error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::ServiceUnavailable(msg) => write!(f, "Service unavailable: {msg}"),
            Self::Timeout(limit) => {
                write!(f, "Request timed out after {:.1}s", limit.as_secs_f64())
            }
            Self::Server(msg) => write!(f, "Server error: {msg}"),
        }
    }
}

impl std::error::Error for GoniometryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GoniometryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for GoniometryError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}

/// Failure of a single metric pipeline.
///
/// These never abort sibling metrics; they are stored in the metric's
/// [`AngleResult`](crate::results::AngleResult) and reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// No image was supplied for this metric.
    NoImageProvided,
    /// The provider returned zero poses for the image.
    NoPoseDetected,
    /// A required keypoint is absent or below the confidence threshold.
    InsufficientKeypoints {
        /// Landmark names that failed validation, e.g. `right_knee`.
        missing: Vec<String>,
    },
    /// Two of the three angle points coincide.
    DegenerateGeometry,
    /// Unexpected failure while decoding, detecting or annotating.
    ProcessingError(String),
}

impl MetricError {
    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoImageProvided => "no_image_provided",
            Self::NoPoseDetected => "no_pose_detected",
            Self::InsufficientKeypoints { .. } => "insufficient_keypoints",
            Self::DegenerateGeometry => "degenerate_geometry",
            Self::ProcessingError(_) => "processing_error",
        }
    }
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoImageProvided => write!(f, "No image provided"),
            Self::NoPoseDetected => write!(f, "No pose detected"),
            Self::InsufficientKeypoints { missing } if missing.is_empty() => {
                write!(f, "Insufficient keypoints")
            }
            Self::InsufficientKeypoints { missing } => {
                write!(f, "Insufficient keypoints: {}", missing.join(", "))
            }
            Self::DegenerateGeometry => write!(f, "Degenerate geometry: coincident points"),
            Self::ProcessingError(msg) => write!(f, "Processing error: {msg}"),
        }
    }
}

impl std::error::Error for MetricError {}

impl From<GoniometryError> for MetricError {
    fn from(err: GoniometryError) -> Self {
        Self::ProcessingError(err.to_string())
    }
}
