// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose model metadata parsing.
//!
//! Ultralytics pose exports store their configuration as YAML-like
//! `key: value` pairs in the ONNX custom metadata. The fields that matter
//! here are the task, the input size and `kpt_shape`, which tells how many
//! keypoints the model emits and whether each carries a visibility score.

use std::collections::HashMap;

use crate::error::{GoniometryError, Result};
use crate::pose::KeypointSchema;

/// Metadata keys read from the ONNX model.
pub const METADATA_KEYS: [&str; 8] = [
    "description",
    "version",
    "task",
    "stride",
    "imgsz",
    "kpt_shape",
    "names",
    "batch",
];

/// Metadata extracted from an Ultralytics pose ONNX model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseModelMetadata {
    /// Model description.
    pub description: String,
    /// Ultralytics version used for export.
    pub version: String,
    /// Task name; pose models report `pose`.
    pub task: String,
    /// Model stride.
    pub stride: u32,
    /// Input image size as (height, width).
    pub imgsz: (usize, usize),
    /// Keypoints per person and values per keypoint (2 = xy, 3 = xy + score).
    pub kpt_shape: (usize, usize),
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl Default for PoseModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            version: String::new(),
            task: "pose".to_string(),
            stride: 32,
            imgsz: (640, 640),
            kpt_shape: (17, 3),
            names: HashMap::from([(0, "person".to_string())]),
        }
    }
}

impl PoseModelMetadata {
    /// Build metadata from individual custom-metadata entries.
    ///
    /// # Errors
    ///
    /// Returns an error if a present value is malformed.
    pub fn from_entries(entries: &HashMap<String, String>) -> Result<Self> {
        let yaml: Vec<String> = METADATA_KEYS
            .iter()
            .filter_map(|key| entries.get(*key).map(|value| format!("{key}: {value}")))
            .collect();
        Self::from_yaml_str(&yaml.join("\n"))
    }

    /// Parse metadata from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric field cannot be parsed or the model is
    /// not a pose model.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let mut metadata = Self::default();
        let lines: Vec<&str> = yaml_str.lines().collect();

        for (i, raw) in lines.iter().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || raw.starts_with([' ', '\t', '-']) {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().trim_matches('\'').trim_matches('"');

            match key.trim() {
                "description" => metadata.description = value.to_string(),
                "version" => metadata.version = value.to_string(),
                "task" => metadata.task = value.to_string(),
                "stride" => {
                    metadata.stride = value.parse().map_err(|_| {
                        GoniometryError::ModelLoadError(format!("Invalid stride value: {value}"))
                    })?;
                }
                "imgsz" => {
                    let sizes = parse_list(value, &lines[i + 1..]);
                    match sizes.as_slice() {
                        [h, w, ..] => metadata.imgsz = (*h, *w),
                        [size] => metadata.imgsz = (*size, *size),
                        [] => {}
                    }
                }
                "kpt_shape" => {
                    let shape = parse_list(value, &lines[i + 1..]);
                    let [count, dims, ..] = shape.as_slice() else {
                        return Err(GoniometryError::ModelLoadError(format!(
                            "Invalid kpt_shape value: {value}"
                        )));
                    };
                    metadata.kpt_shape = (*count, *dims);
                }
                "names" => {
                    let names = parse_names(value, &lines[i + 1..]);
                    if !names.is_empty() {
                        metadata.names = names;
                    }
                }
                _ => {}
            }
        }

        if metadata.task != "pose" {
            return Err(GoniometryError::ModelLoadError(format!(
                "Expected a pose model, got task '{}'",
                metadata.task
            )));
        }
        Ok(metadata)
    }

    /// Number of keypoints per person.
    #[must_use]
    pub const fn num_keypoints(&self) -> usize {
        self.kpt_shape.0
    }

    /// Whether each keypoint carries a visibility score.
    #[must_use]
    pub const fn has_keypoint_scores(&self) -> bool {
        self.kpt_shape.1 >= 3
    }

    /// Number of classes in this model.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len().max(1)
    }

    /// Landmark naming for this model's keypoints.
    ///
    /// # Errors
    ///
    /// Returns an error for keypoint counts without a known layout.
    pub fn schema(&self) -> Result<KeypointSchema> {
        KeypointSchema::for_count(self.num_keypoints()).ok_or_else(|| {
            GoniometryError::ModelLoadError(format!(
                "Unsupported keypoint count {} (expected 17 or 33)",
                self.num_keypoints()
            ))
        })
    }
}

/// Parse an inline `[a, b]` list or a following block of `- a` items.
fn parse_list(value: &str, following: &[&str]) -> Vec<usize> {
    if !value.is_empty() {
        return value
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
    }
    following
        .iter()
        .map(|l| l.trim())
        .take_while(|l| l.starts_with('-'))
        .filter_map(|l| l.trim_start_matches('-').trim().parse().ok())
        .collect()
}

/// Parse `{0: 'person'}` inline dicts or indented `0: person` blocks.
fn parse_names(value: &str, following: &[&str]) -> HashMap<usize, String> {
    let entries: Vec<&str> = if value.starts_with('{') {
        value
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split(',')
            .collect()
    } else {
        following
            .iter()
            .take_while(|l| l.starts_with([' ', '\t']))
            .copied()
            .collect()
    };
    entries
        .iter()
        .filter_map(|entry| {
            let (key, name) = entry.split_once(':')?;
            let id = key.trim().parse().ok()?;
            Some((id, name.trim().trim_matches('\'').trim_matches('"').to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_METADATA: &str = r"
description: Ultralytics YOLO11n-pose model trained on coco-pose.yaml
version: 8.3.236
stride: 32
task: pose
batch: 1
imgsz:
- 640
- 640
names:
  0: person
kpt_shape:
- 17
- 3
";

    #[test]
    fn test_parse_metadata() {
        let metadata = PoseModelMetadata::from_yaml_str(SAMPLE_METADATA).unwrap();
        assert_eq!(metadata.task, "pose");
        assert_eq!(metadata.stride, 32);
        assert_eq!(metadata.imgsz, (640, 640));
        assert_eq!(metadata.kpt_shape, (17, 3));
        assert_eq!(metadata.names.get(&0).map(String::as_str), Some("person"));
        assert_eq!(metadata.schema().unwrap(), KeypointSchema::Coco17);
        assert!(metadata.has_keypoint_scores());
    }

    #[test]
    fn test_parse_inline_entries() {
        let entries = HashMap::from([
            ("task".to_string(), "pose".to_string()),
            ("imgsz".to_string(), "[384, 640]".to_string()),
            ("kpt_shape".to_string(), "[33, 3]".to_string()),
            ("names".to_string(), "{0: 'person'}".to_string()),
        ]);
        let metadata = PoseModelMetadata::from_entries(&entries).unwrap();
        assert_eq!(metadata.imgsz, (384, 640));
        assert_eq!(metadata.schema().unwrap(), KeypointSchema::BlazePose33);
    }

    #[test]
    fn test_rejects_non_pose_task() {
        let err = PoseModelMetadata::from_yaml_str("task: detect\nimgsz: [640, 640]").unwrap_err();
        assert!(matches!(err, GoniometryError::ModelLoadError(_)));
    }

    #[test]
    fn test_unknown_keypoint_count() {
        let metadata = PoseModelMetadata::from_yaml_str("task: pose\nkpt_shape: [21, 3]").unwrap();
        assert!(metadata.schema().is_err());
    }
}
