// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX pose model loading and inference.
//!
//! [`PoseModel`] wraps an ONNX Runtime session for an Ultralytics YOLO pose
//! export and implements [`PoseProvider`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use crate::config::ModelConfig;
use crate::error::{GoniometryError, Result};
use crate::metadata::{METADATA_KEYS, PoseModelMetadata};
use crate::pose::{KeypointSchema, Pose};
use crate::postprocessing::{PoseDecodeConfig, decode_poses};
use crate::preprocessing::preprocess_image;
use crate::provider::{DetectOptions, PoseProvider, Readiness};

/// Default ONNX pose model.
pub const DEFAULT_MODEL: &str = "yolo11n-pose.onnx";

/// YOLO pose model.
///
/// # Example
///
/// ```no_run
/// use pose_goniometry::{DetectOptions, PoseModel, PoseProvider};
///
/// let model = PoseModel::load("yolo11n-pose.onnx")?;
/// let image = image::open("knee.jpg")?;
/// let poses = model.detect(&image, &DetectOptions::default())?;
/// println!("Found {} poses", poses.len());
/// # Ok::<(), pose_goniometry::GoniometryError>(())
/// ```
pub struct PoseModel {
    /// ONNX Runtime session. `run` needs exclusive access.
    session: Mutex<Session>,
    /// Model metadata.
    metadata: PoseModelMetadata,
    /// Landmark naming.
    schema: KeypointSchema,
    /// Input tensor name.
    input_name: String,
    /// First output tensor name.
    output_name: String,
    /// Model configuration.
    config: ModelConfig,
    /// Path the model was loaded from.
    path: PathBuf,
}

impl PoseModel {
    /// Load a pose model from an ONNX file with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the model file doesn't exist or can't be loaded.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_config(path, ModelConfig::default())
    }

    /// Load a pose model with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the model file doesn't exist, can't be loaded, or
    /// is not a pose model with a supported keypoint layout.
    pub fn load_with_config<P: AsRef<Path>>(path: P, config: ModelConfig) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(GoniometryError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| {
                GoniometryError::ModelLoadError(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                GoniometryError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(config.num_threads)
            .map_err(|e| {
                GoniometryError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
            })?
            .commit_from_file(path)
            .map_err(|e| GoniometryError::ModelLoadError(format!("Failed to load model: {e}")))?;

        let metadata = Self::extract_metadata(&session)?;
        let schema = metadata.schema()?;

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| GoniometryError::ModelLoadError("Model has no outputs".to_string()))?;

        if !schema.has_foot_landmarks() {
            crate::warn!(
                "Pose model {} has no foot landmarks; {} will report insufficient keypoints",
                path.display(),
                crate::metric::MetricId::AnkleDorsiflexion.display_name()
            );
        }

        crate::verbose!(
            "Loaded pose model {} ({} keypoints, imgsz {:?})",
            path.display(),
            schema.len(),
            config.imgsz.unwrap_or(metadata.imgsz)
        );

        Ok(Self {
            session: Mutex::new(session),
            metadata,
            schema,
            input_name,
            output_name,
            config,
            path: path.to_path_buf(),
        })
    }

    /// Read Ultralytics metadata from the session. Missing metadata falls
    /// back to a COCO-17 pose layout.
    fn extract_metadata(session: &Session) -> Result<PoseModelMetadata> {
        let model_metadata = session.metadata().map_err(|e| {
            GoniometryError::ModelLoadError(format!("Failed to get model metadata: {e}"))
        })?;

        let entries: HashMap<String, String> = METADATA_KEYS
            .iter()
            .filter_map(|key| match model_metadata.custom(key) {
                Ok(Some(value)) => Some(((*key).to_string(), value)),
                _ => None,
            })
            .collect();

        if entries.is_empty() {
            crate::warn!("No Ultralytics metadata found in model, assuming COCO pose layout");
            return Ok(PoseModelMetadata::default());
        }
        PoseModelMetadata::from_entries(&entries)
    }

    /// Run the ONNX session on a preprocessed tensor.
    fn run_inference(&self, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            GoniometryError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| GoniometryError::InferenceError("Session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| GoniometryError::InferenceError(format!("Inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            GoniometryError::InferenceError(format!("Output '{}' not found", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| GoniometryError::InferenceError(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let shape_vec: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((data.to_vec(), shape_vec))
    }

    /// Input size (height, width) used for inference.
    #[must_use]
    pub fn imgsz(&self) -> (usize, usize) {
        self.config.imgsz.unwrap_or(self.metadata.imgsz)
    }

    /// Landmark naming for this model.
    #[must_use]
    pub const fn schema(&self) -> KeypointSchema {
        self.schema
    }

    /// Model metadata.
    #[must_use]
    pub const fn metadata(&self) -> &PoseModelMetadata {
        &self.metadata
    }

    /// Path the model was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PoseProvider for PoseModel {
    fn readiness(&self) -> Readiness {
        Readiness::Ready
    }

    #[allow(clippy::cast_precision_loss)]
    fn detect(&self, image: &DynamicImage, options: &DetectOptions) -> Result<Vec<Pose>> {
        let start = Instant::now();
        let flipped;
        let input = if options.flip_horizontal {
            flipped = image.fliph();
            &flipped
        } else {
            image
        };

        let preprocess = preprocess_image(input, self.imgsz());
        let (output, shape) = self.run_inference(&preprocess.tensor)?;

        let decode = PoseDecodeConfig {
            kpt_shape: self.metadata.kpt_shape,
            num_classes: self.metadata.num_classes(),
            score_threshold: options.score_threshold,
            iou_threshold: self.config.iou_threshold,
            max_poses: options.max_poses,
        };
        let width = image.width() as f32;
        let poses: Vec<Pose> = decode_poses(&output, &shape, &preprocess.letterbox, &decode)
            .into_iter()
            .map(|candidate| {
                let candidate = if options.flip_horizontal {
                    candidate.mirrored(width, self.schema)
                } else {
                    candidate
                };
                candidate.into_pose(self.schema)
            })
            .collect();

        crate::verbose!(
            "Detected {} pose(s) in {:.1}ms",
            poses.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(poses)
    }

    fn name(&self) -> String {
        format!("{} ({} keypoints)", self.path.display(), self.schema.len())
    }

    fn keypoint_schema(&self) -> Option<KeypointSchema> {
        Some(self.schema)
    }
}

impl std::fmt::Debug for PoseModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseModel")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("imgsz", &self.imgsz())
            .field("kpt_shape", &self.metadata.kpt_shape)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = PoseModel::load("nonexistent-pose.onnx");
        assert!(matches!(result, Err(GoniometryError::ModelLoadError(_))));
    }
}
