// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing for YOLO pose model outputs.
//!
//! The raw output holds one row per candidate person:
//! `[cx, cy, w, h, class scores..., k0x, k0y, k0s, k1x, ...]`, either as
//! `[1, features, preds]` or transposed as `[1, preds, features]`.
//! Candidates are filtered by score, de-duplicated with NMS and mapped back
//! to original image coordinates.

use ndarray::{Array2, s};

use crate::pose::{Keypoint, KeypointSchema, Pose};
use crate::preprocessing::Letterbox;
use crate::utils::nms;

/// Decoding parameters for a pose model output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseDecodeConfig {
    /// Keypoints per person and values per keypoint.
    pub kpt_shape: (usize, usize),
    /// Number of class score columns.
    pub num_classes: usize,
    /// Minimum person score.
    pub score_threshold: f32,
    /// NMS `IoU` threshold.
    pub iou_threshold: f32,
    /// Maximum number of poses to keep.
    pub max_poses: usize,
}

/// One decoded person, in original image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCandidate {
    /// Bounding box `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
    /// Person score.
    pub score: f32,
    /// Keypoints as `[x, y, score]`.
    pub keypoints: Vec<[f32; 3]>,
}

impl PoseCandidate {
    /// Map a detection made on a horizontally mirrored image back to the
    /// original frame.
    ///
    /// x coordinates are reflected across `width` and left/right landmark
    /// slots are exchanged per `schema`, so `left_*` names the subject's
    /// actual left side again.
    #[must_use]
    pub fn mirrored(mut self, width: f32, schema: KeypointSchema) -> Self {
        let [x1, y1, x2, y2] = self.bbox;
        self.bbox = [width - x2, y1, width - x1, y2];
        self.keypoints = (0..self.keypoints.len())
            .map(|i| {
                let source = self.keypoints.get(schema.mirror_index(i)).unwrap_or(&self.keypoints[i]);
                [width - source[0], source[1], source[2]]
            })
            .collect();
        self
    }

    /// Name the keypoints with `schema` and build a [`Pose`].
    #[must_use]
    pub fn into_pose(self, schema: KeypointSchema) -> Pose {
        let keypoints = self
            .keypoints
            .iter()
            .enumerate()
            .filter_map(|(i, [x, y, score])| {
                schema.name(i).map(|name| Keypoint::new(name, *x, *y, *score))
            })
            .collect();
        Pose::new(keypoints, self.score)
    }
}

/// Work out `(num_preds, transposed)` from the output shape.
#[must_use]
pub fn parse_pose_shape(shape: &[usize], expected_features: usize) -> (usize, bool) {
    let (a, b) = match shape {
        [_, a, b] | [a, b] => (*a, *b),
        _ => return (0, false),
    };
    if a == expected_features {
        (b, false)
    } else if b == expected_features {
        (a, true)
    } else if a < b {
        (b, false)
    } else {
        (a, true)
    }
}

/// Decode a raw pose output into at most `config.max_poses` candidates, best first.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn decode_poses(
    output: &[f32],
    shape: &[usize],
    letterbox: &Letterbox,
    config: &PoseDecodeConfig,
) -> Vec<PoseCandidate> {
    let (num_kpts, kpt_dim) = config.kpt_shape;
    let kpt_features = num_kpts * kpt_dim;
    let expected_features = 4 + config.num_classes + kpt_features;
    let (num_preds, transposed) = parse_pose_shape(shape, expected_features);

    if output.is_empty() || num_preds == 0 || kpt_dim < 2 {
        return Vec::new();
    }
    let features = output.len() / num_preds;
    if features < 4 + kpt_features + 1 {
        crate::warn!(
            "Pose model has insufficient features ({features}), expected at least {}",
            4 + kpt_features + 1
        );
        return Vec::new();
    }

    let rows = if transposed {
        Array2::from_shape_vec((num_preds, features), output.to_vec()).ok()
    } else {
        Array2::from_shape_vec((features, num_preds), output.to_vec())
            .ok()
            .map(|arr| arr.t().to_owned())
    };
    let Some(rows) = rows else {
        return Vec::new();
    };

    let num_classes = features - 4 - kpt_features;
    let (orig_h, orig_w) = (letterbox.orig_shape.0 as f32, letterbox.orig_shape.1 as f32);
    let mut candidates = Vec::new();

    for row in rows.outer_iter() {
        let score = row
            .slice(s![4..4 + num_classes])
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(0.0_f32, f32::max);
        if score < config.score_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let bbox = letterbox.unmap_box(&[cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);

        let kpt_start = 4 + num_classes;
        let keypoints = (0..num_kpts)
            .map(|k| {
                let offset = kpt_start + k * kpt_dim;
                let (x, y) = letterbox.unmap(row[offset], row[offset + 1]);
                let kpt_score = if kpt_dim >= 3 { row[offset + 2] } else { score };
                [x.clamp(0.0, orig_w), y.clamp(0.0, orig_h), kpt_score]
            })
            .collect();

        candidates.push(PoseCandidate {
            bbox,
            score,
            keypoints,
        });
    }

    let boxes: Vec<([f32; 4], f32)> = candidates.iter().map(|c| (c.bbox, c.score)).collect();
    let keep = nms(&boxes, config.iou_threshold);
    keep.into_iter()
        .take(config.max_poses)
        .filter_map(|i| candidates.get(i).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoseDecodeConfig {
        PoseDecodeConfig {
            kpt_shape: (17, 3),
            num_classes: 1,
            score_threshold: 0.5,
            iou_threshold: 0.45,
            max_poses: 1,
        }
    }

    /// Output in `[1, 56, preds]` layout with one person per `(index, score, x)`.
    fn mock_output(num_preds: usize, people: &[(usize, f32, f32)]) -> Vec<f32> {
        let num_features = 56;
        let mut output = vec![0.0; num_preds * num_features];
        for &(idx, score, x) in people {
            output[idx] = x;
            output[idx + num_preds] = 100.0;
            output[idx + num_preds * 2] = 50.0;
            output[idx + num_preds * 3] = 50.0;
            output[idx + num_preds * 4] = score;
            for k in 0..17 {
                let offset = 5 + k * 3;
                output[idx + num_preds * offset] = x;
                output[idx + num_preds * (offset + 1)] = 100.0 + k as f32;
                output[idx + num_preds * (offset + 2)] = 0.8;
            }
        }
        output
    }

    #[test]
    fn test_parse_pose_shape() {
        assert_eq!(parse_pose_shape(&[1, 56, 8400], 56), (8400, false));
        assert_eq!(parse_pose_shape(&[1, 8400, 56], 56), (8400, true));
        assert_eq!(parse_pose_shape(&[1, 2, 3, 4], 56), (0, false));
    }

    #[test]
    fn test_decode_single_pose() {
        let output = mock_output(100, &[(0, 0.9, 100.0)]);
        let letterbox = Letterbox::new(640, 640, (640, 640));
        let poses = decode_poses(&output, &[1, 56, 100], &letterbox, &config());
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].keypoints.len(), 17);
        assert!((poses[0].keypoints[0][0] - 100.0).abs() < 1e-4);
        assert!((poses[0].keypoints[3][1] - 103.0).abs() < 1e-4);
        assert!((poses[0].keypoints[0][2] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_decode_keeps_best_and_filters_low_scores() {
        let output = mock_output(100, &[(0, 0.6, 100.0), (1, 0.95, 400.0), (2, 0.3, 250.0)]);
        let letterbox = Letterbox::new(640, 640, (640, 640));
        let mut cfg = config();
        cfg.max_poses = 5;
        let poses = decode_poses(&output, &[1, 56, 100], &letterbox, &cfg);
        assert_eq!(poses.len(), 2);
        assert!((poses[0].score - 0.95).abs() < 1e-6);

        cfg.max_poses = 1;
        let poses = decode_poses(&output, &[1, 56, 100], &letterbox, &cfg);
        assert_eq!(poses.len(), 1);
        assert!((poses[0].keypoints[0][0] - 400.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_output() {
        let letterbox = Letterbox::new(640, 640, (640, 640));
        assert!(decode_poses(&[], &[1, 56, 0], &letterbox, &config()).is_empty());
    }

    #[test]
    fn test_into_pose_and_mirror() {
        // Slot k sits at x = 10 + k, so each landmark is identifiable after mirroring.
        let keypoints = (0..17).map(|k| [10.0 + k as f32, 5.0, 0.5 + k as f32 / 100.0]).collect();
        let candidate = PoseCandidate {
            bbox: [10.0, 0.0, 30.0, 20.0],
            score: 0.9,
            keypoints,
        };
        let mirrored = candidate.mirrored(100.0, KeypointSchema::Coco17);
        assert_eq!(mirrored.bbox, [70.0, 0.0, 90.0, 20.0]);
        let pose = mirrored.into_pose(KeypointSchema::Coco17);
        assert_eq!(pose.len(), 17);

        // The flipped image's left_ankle (slot 15) is the subject's right ankle.
        let right_ankle = pose.get("right_ankle").unwrap();
        assert!((right_ankle.x - 75.0).abs() < 1e-6);
        assert!((right_ankle.score - 0.65).abs() < 1e-6);
        let left_ankle = pose.get("left_ankle").unwrap();
        assert!((left_ankle.x - 74.0).abs() < 1e-6);
        let nose = pose.get("nose").unwrap();
        assert!((nose.x - 90.0).abs() < 1e-6);
    }
}
