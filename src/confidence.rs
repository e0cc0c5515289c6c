// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Confidence gating for the points a metric needs.

use crate::pose::{Keypoint, Point};

/// Default minimum keypoint score.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// A point a metric requires, before validation.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    /// A landmark looked up in the detected pose; `None` when absent.
    Detected {
        /// Landmark name that was looked up.
        name: &'a str,
        /// Resolved keypoint, if present.
        keypoint: Option<&'a Keypoint>,
    },
    /// A synthesized reference point. It has no score and always passes.
    Synthesized(Point),
}

impl Candidate<'_> {
    /// Whether this candidate passes `threshold`.
    #[must_use]
    pub fn is_valid(&self, threshold: f32) -> bool {
        match self {
            Self::Detected { keypoint, .. } => {
                keypoint.is_some_and(|kp| kp.is_confident(threshold))
            }
            Self::Synthesized(_) => true,
        }
    }
}

/// `true` when every candidate is present and scores at least `threshold`.
#[must_use]
pub fn validate(points: &[Candidate<'_>], threshold: f32) -> bool {
    points.iter().all(|candidate| candidate.is_valid(threshold))
}

/// Names of the detected candidates that fail `threshold`, in input order.
#[must_use]
pub fn insufficient(points: &[Candidate<'_>], threshold: f32) -> Vec<String> {
    points
        .iter()
        .filter(|candidate| !candidate.is_valid(threshold))
        .filter_map(|candidate| match candidate {
            Candidate::Detected { name, .. } => Some((*name).to_string()),
            Candidate::Synthesized(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_confident_passes() {
        let knee = Keypoint::new("right_knee", 1.0, 2.0, 0.9);
        let ankle = Keypoint::new("right_ankle", 1.0, 3.0, 0.5);
        let points = [
            Candidate::Detected {
                name: "right_knee",
                keypoint: Some(&knee),
            },
            Candidate::Detected {
                name: "right_ankle",
                keypoint: Some(&ankle),
            },
            Candidate::Synthesized(Point::new(1.0, -98.0)),
        ];
        assert!(validate(&points, 0.5));
        assert!(insufficient(&points, 0.5).is_empty());
    }

    #[test]
    fn test_low_score_and_absent_fail() {
        let knee = Keypoint::new("right_knee", 1.0, 2.0, 0.49);
        let points = [
            Candidate::Detected {
                name: "right_knee",
                keypoint: Some(&knee),
            },
            Candidate::Detected {
                name: "right_foot_index",
                keypoint: None,
            },
        ];
        assert!(!validate(&points, 0.5));
        assert_eq!(
            insufficient(&points, 0.5),
            vec!["right_knee".to_string(), "right_foot_index".to_string()]
        );
    }

    #[test]
    fn test_threshold_is_configurable() {
        let hip = Keypoint::new("left_hip", 0.0, 0.0, 0.7);
        let points = [Candidate::Detected {
            name: "left_hip",
            keypoint: Some(&hip),
        }];
        assert!(validate(&points, 0.5));
        assert!(!validate(&points, 0.8));
    }
}
