// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Pose Goniometry
//!
//! Clinical joint-angle measurement from pose-estimation keypoints.
//!
//! Each clinical metric takes one photograph of the patient. A pose provider
//! (by default an Ultralytics YOLO pose model running on ONNX Runtime) finds
//! the body keypoints, the metric resolves the landmarks it needs for the
//! requested side, synthesizes a fixed-offset reference point where the
//! metric measures against the vertical or horizontal, and computes the
//! included angle at the vertex. An annotated copy of the image is returned
//! alongside the angle.
//!
//! ## Metrics
//!
//! | Key | Metric | Angle | Normal range |
//! |-----|--------|-------|--------------|
//! | `ankle` | Ankle dorsiflexion | knee, **ankle**, foot index | 10-20° |
//! | `knee` | Knee flexion-extension | hip, **knee**, ankle | 0-135° |
//! | `hipFlexion` | Hip flexion | knee, **hip**, horizontal reference | 0-120° |
//! | `R1` | Hamstring R1 | ankle, **knee**, vertical reference | 30-60° |
//! | `popliteal` | Popliteal angle | ankle, **knee**, vertical reference | 5-15° |
//! | `R2` | Hamstring R2 | ankle, **knee**, hip | 5-18° |
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use pose_goniometry::{AnalysisConfig, Analyzer, MetricId, PoseModel, Side};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = PoseModel::load("yolo11n-pose.onnx")?;
//!     let analyzer = Analyzer::new(Arc::new(model), AnalysisConfig::default())?;
//!
//!     let mut images = HashMap::new();
//!     images.insert(MetricId::KneeFlexionExtension, std::fs::read("knee.jpg")?);
//!     images.insert(MetricId::HipFlexion, std::fs::read("hip.jpg")?);
//!
//!     let results = analyzer.process_request_sequential(&images, Side::Left)?;
//!     for result in &results {
//!         println!("{}", result.verbose());
//!     }
//!     println!("{}", results.to_json());
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Measure two metrics on the right side
//! pose-goniometry analyze --knee knee.jpg --ankle ankle.jpg
//!
//! # Left side, save annotated images and the JSON response
//! pose-goniometry analyze --side left --hip-flexion hip.jpg --save --json results.json
//!
//! # Run the HTTP server (MODEL_PATH, PORT and CORS_ORIGINS are read from the environment)
//! pose-goniometry serve
//! ```
//!
//! ## Custom Pose Providers
//!
//! Anything that implements [`PoseProvider`] can feed the pipeline, e.g. a
//! remote pose service or a fixture in tests:
//!
//! ```rust
//! use pose_goniometry::{DetectOptions, Keypoint, Pose, PoseProvider, Readiness, Result};
//!
//! struct Fixed(Pose);
//!
//! impl PoseProvider for Fixed {
//!     fn readiness(&self) -> Readiness {
//!         Readiness::Ready
//!     }
//!
//!     fn detect(&self, _image: &image::DynamicImage, _options: &DetectOptions) -> Result<Vec<Pose>> {
//!         Ok(vec![self.0.clone()])
//!     }
//! }
//!
//! let provider = Fixed(Pose::new(vec![Keypoint::new("right_knee", 10.0, 20.0, 0.9)], 0.9));
//! assert!(provider.readiness().is_ready());
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | [`Analyzer`] running the per-metric pipelines |
//! | [`metric`] | [`MetricId`] registry and angle computation |
//! | [`pose`] | Keypoints, poses, sides and landmark naming |
//! | [`geometry`] | Included angle at a vertex |
//! | [`imaginary`] | Fixed-offset reference points |
//! | [`confidence`] | Keypoint confidence gating |
//! | [`annotate`] | Draw-command planning for overlays |
//! | [`results`] | [`AngleResult`], [`MetricResults`] and the JSON wire form |
//! | [`provider`] | [`PoseProvider`] trait and [`ProviderSlot`] |
//! | [`model`] | ONNX [`PoseModel`] |
//! | [`error`] | Error types ([`GoniometryError`], [`MetricError`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `annotate` | Raster overlay rendering with `imageproc` (default) |
//! | `server` | axum HTTP server with Swagger UI (default) |

// Modules
pub mod annotate;
pub mod cli;
pub mod codec;
pub mod config;
pub mod confidence;
pub mod error;
pub mod geometry;
pub mod imaginary;
pub mod logging;
pub mod metadata;
pub mod metric;
pub mod model;
pub mod pipeline;
pub mod pose;
pub mod postprocessing;
pub mod preprocessing;
pub mod provider;
#[cfg(feature = "annotate")]
pub mod render;
pub mod results;
#[cfg(feature = "server")]
pub mod server;
pub mod utils;

// Re-export main types for convenience
pub use config::{AnalysisConfig, FlipPolicy, ModelConfig};
pub use error::{GoniometryError, MetricError, Result};
pub use metric::{Measurement, MetricDefinition, MetricId, NormalRange};
pub use model::PoseModel;
pub use pipeline::{Analyzer, MetricImages};
pub use pose::{Keypoint, KeypointSchema, Point, Pose, Side};
pub use provider::{DetectOptions, PoseProvider, ProviderSlot, Readiness};
pub use results::{AngleResult, MetricResponse, MetricResults, Speed};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pose-goniometry");
    }
}
