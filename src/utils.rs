// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Utility functions shared by the pose model and the CLI.

use std::path::{Path, PathBuf};

/// Calculate `IoU` (Intersection over Union) between two bounding boxes
///
/// # Arguments
///
/// * `box1` - First bounding box [x1, y1, x2, y2]
/// * `box2` - Second bounding box [x1, y1, x2, y2]
///
/// # Returns
///
/// `IoU` value between 0.0 and 1.0
#[must_use]
pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = ((x2 - x1).max(0.0)) * ((y2 - y1).max(0.0));

    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Non-Maximum Suppression (NMS) for filtering overlapping person candidates
///
/// # Arguments
///
/// * `boxes` - Bounding boxes with scores [(bbox, score)]
/// * `iou_threshold` - `IoU` threshold for suppression
///
/// # Returns
///
/// Indices of boxes to keep, highest score first
#[must_use]
pub fn nms(boxes: &[([f32; 4], f32)], iou_threshold: f32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..boxes.len()).collect();
    indices.sort_by(|&a, &b| boxes[b].1.total_cmp(&boxes[a].1));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for &i in &indices {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &indices {
            if !suppressed[j] && i != j && calculate_iou(&boxes[i].0, &boxes[j].0) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Find the next available run directory (`analyze`, `analyze2`, `analyze3`, ...)
#[must_use]
pub fn find_next_run_dir(base: impl AsRef<Path>, prefix: &str) -> PathBuf {
    let base_path = base.as_ref();

    let first = base_path.join(prefix);
    if !first.exists() {
        return first;
    }

    (2..)
        .map(|i| base_path.join(format!("{prefix}{i}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_iou() {
        let box1 = [0.0, 0.0, 10.0, 10.0];
        let box2 = [5.0, 5.0, 15.0, 15.0];
        let iou = calculate_iou(&box1, &box2);
        assert!((iou - 0.142_857).abs() < 0.001); // 25 / (100 + 100 - 25)
    }

    #[test]
    fn test_nms() {
        let boxes = vec![
            ([0.0, 0.0, 10.0, 10.0], 0.9),
            ([1.0, 1.0, 11.0, 11.0], 0.8),
            ([100.0, 100.0, 110.0, 110.0], 0.95),
        ];
        let keep = nms(&boxes, 0.5);
        assert_eq!(keep, vec![2, 0]);
    }

    #[test]
    fn test_nms_nan_score_does_not_panic() {
        let boxes = vec![([0.0, 0.0, 10.0, 10.0], f32::NAN), ([50.0, 50.0, 60.0, 60.0], 0.5)];
        assert_eq!(nms(&boxes, 0.5).len(), 2);
    }

    #[test]
    fn test_find_next_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let first = find_next_run_dir(dir.path(), "analyze");
        assert_eq!(first, dir.path().join("analyze"));

        std::fs::create_dir_all(&first).unwrap();
        let second = find_next_run_dir(dir.path(), "analyze");
        assert_eq!(second, dir.path().join("analyze2"));

        std::fs::create_dir_all(&second).unwrap();
        assert_eq!(
            find_next_run_dir(dir.path(), "analyze"),
            dir.path().join("analyze3")
        );
    }
}
