// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose data: named keypoints, body side, anatomical roles, and the
//! side-aware keypoint resolver.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 2D location in image pixel coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal pixel coordinate.
    pub x: f32,
    /// Vertical pixel coordinate.
    pub y: f32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A single named, scored body-landmark estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Landmark name, e.g. `right_knee`.
    pub name: String,
    /// X coordinate in pixels.
    pub x: f32,
    /// Y coordinate in pixels.
    pub y: f32,
    /// Detection confidence (0.0 - 1.0).
    pub score: f32,
}

impl Keypoint {
    /// Create a new keypoint.
    pub fn new(name: impl Into<String>, x: f32, y: f32, score: f32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            score,
        }
    }

    /// Location of this keypoint.
    #[must_use]
    pub const fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Whether the score reaches `threshold`.
    #[must_use]
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// The full set of keypoints for one detected person.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Keypoints in provider order.
    pub keypoints: Vec<Keypoint>,
    /// Overall pose confidence.
    pub score: f32,
}

impl Pose {
    /// Create a new pose.
    #[must_use]
    pub const fn new(keypoints: Vec<Keypoint>, score: f32) -> Self {
        Self { keypoints, score }
    }

    /// Find a keypoint by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == name)
    }

    /// Number of keypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Whether the pose has no keypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Which half of the body a request measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Patient's left side.
    Left,
    /// Patient's right side.
    #[default]
    Right,
}

impl Side {
    /// Keypoint-name prefix for this side.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Sign applied to horizontal imaginary offsets: `+1` for right, `-1` for left.
    #[must_use]
    pub const fn horizontal_sign(&self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            _ => Err(format!("Unknown side: {s} (expected 'left' or 'right')")),
        }
    }
}

/// Anatomical role a metric needs, independent of side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Hip joint.
    Hip,
    /// Knee joint.
    Knee,
    /// Ankle joint.
    Ankle,
    /// Tip of the foot (big toe).
    FootIndex,
}

impl Role {
    /// Name fragment used in keypoint names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hip => "hip",
            Self::Knee => "knee",
            Self::Ankle => "ankle",
            Self::FootIndex => "foot_index",
        }
    }

    /// Full keypoint name for `side`, e.g. `left_foot_index`.
    #[must_use]
    pub fn keypoint_name(&self, side: Side) -> String {
        format!("{}_{}", side.as_str(), self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Look up the detected keypoint for `role` on `side`.
///
/// Absence is an expected outcome and is reported as `None`.
#[must_use]
pub fn resolve<'a>(pose: &'a Pose, role: Role, side: Side) -> Option<&'a Keypoint> {
    pose.get(&role.keypoint_name(side))
}

/// COCO-Pose landmark order (17 points).
pub const COCO17_NAMES: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// BlazePose landmark order (33 points).
pub const BLAZEPOSE33_NAMES: [&str; 33] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// Mapping from model output index to landmark name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointSchema {
    /// 17-point COCO layout (no foot landmarks).
    Coco17,
    /// 33-point BlazePose layout.
    BlazePose33,
}

impl KeypointSchema {
    /// Pick the schema for a model emitting `count` keypoints.
    #[must_use]
    pub const fn for_count(count: usize) -> Option<Self> {
        match count {
            17 => Some(Self::Coco17),
            33 => Some(Self::BlazePose33),
            _ => None,
        }
    }

    /// Landmark names in output order.
    #[must_use]
    pub const fn names(&self) -> &'static [&'static str] {
        match self {
            Self::Coco17 => &COCO17_NAMES,
            Self::BlazePose33 => &BLAZEPOSE33_NAMES,
        }
    }

    /// Number of keypoints in this schema.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.names().len()
    }

    /// Name for output index `index`.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.names().get(index).copied()
    }

    /// Index of the contralateral landmark for `index`.
    ///
    /// A person detected in a horizontally mirrored image has their left and
    /// right landmarks swapped; this maps each output slot to the slot that
    /// holds the same body part in the unmirrored frame. Midline landmarks
    /// such as `nose` map to themselves.
    #[must_use]
    pub fn mirror_index(&self, index: usize) -> usize {
        let names = self.names();
        let Some(name) = names.get(index) else {
            return index;
        };
        let counterpart = if let Some(rest) = name.strip_prefix("left_") {
            format!("right_{rest}")
        } else if let Some(rest) = name.strip_prefix("right_") {
            format!("left_{rest}")
        } else if let Some(rest) = name.strip_suffix("_left") {
            format!("{rest}_right")
        } else if let Some(rest) = name.strip_suffix("_right") {
            format!("{rest}_left")
        } else {
            return index;
        };
        names.iter().position(|n| *n == counterpart).unwrap_or(index)
    }

    /// Whether the layout includes `*_foot_index` landmarks.
    ///
    /// Ankle dorsiflexion needs them; COCO-17 models cannot measure it.
    #[must_use]
    pub fn has_foot_landmarks(&self) -> bool {
        self.names().iter().any(|name| name.ends_with("_foot_index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pose() -> Pose {
        Pose::new(
            vec![
                Keypoint::new("right_knee", 100.0, 100.0, 0.9),
                Keypoint::new("right_ankle", 100.0, 200.0, 0.8),
                Keypoint::new("left_knee", 80.0, 100.0, 0.3),
            ],
            0.85,
        )
    }

    #[test]
    fn test_resolve_by_side() {
        let pose = sample_pose();
        let knee = resolve(&pose, Role::Knee, Side::Right).unwrap();
        assert_eq!(knee.x, 100.0);
        let left = resolve(&pose, Role::Knee, Side::Left).unwrap();
        assert_eq!(left.x, 80.0);
    }

    #[test]
    fn test_resolve_absent_is_none() {
        let pose = sample_pose();
        assert!(resolve(&pose, Role::Hip, Side::Right).is_none());
        assert!(resolve(&pose, Role::FootIndex, Side::Right).is_none());
    }

    #[test]
    fn test_role_keypoint_name() {
        assert_eq!(Role::FootIndex.keypoint_name(Side::Left), "left_foot_index");
        assert_eq!(Role::Hip.keypoint_name(Side::Right), "right_hip");
    }

    #[test]
    fn test_side_parse() {
        assert_eq!("left".parse::<Side>().unwrap(), Side::Left);
        assert_eq!(" Right ".parse::<Side>().unwrap(), Side::Right);
        assert!("middle".parse::<Side>().is_err());
        assert_eq!(Side::default(), Side::Right);
    }

    #[test]
    fn test_side_serde_lowercase() {
        let json = serde_json::to_string(&Side::Left).unwrap();
        assert_eq!(json, "\"left\"");
    }

    #[test]
    fn test_schema_for_count() {
        assert_eq!(KeypointSchema::for_count(17), Some(KeypointSchema::Coco17));
        assert_eq!(
            KeypointSchema::for_count(33),
            Some(KeypointSchema::BlazePose33)
        );
        assert_eq!(KeypointSchema::for_count(21), None);
        assert_eq!(KeypointSchema::BlazePose33.name(32), Some("right_foot_index"));
        assert_eq!(KeypointSchema::Coco17.name(16), Some("right_ankle"));
        assert_eq!(KeypointSchema::Coco17.len(), 17);
    }

    #[test]
    fn test_mirror_index_swaps_sides() {
        let coco = KeypointSchema::Coco17;
        assert_eq!(coco.mirror_index(0), 0);
        assert_eq!(coco.name(coco.mirror_index(15)), Some("right_ankle"));
        assert_eq!(coco.name(coco.mirror_index(16)), Some("left_ankle"));
        assert_eq!(coco.mirror_index(40), 40);

        let blaze = KeypointSchema::BlazePose33;
        assert_eq!(blaze.name(blaze.mirror_index(9)), Some("mouth_right"));
        assert_eq!(blaze.name(blaze.mirror_index(31)), Some("right_foot_index"));
        for schema in [coco, blaze] {
            for i in 0..schema.len() {
                assert_eq!(schema.mirror_index(schema.mirror_index(i)), i);
            }
        }
    }

    #[test]
    fn test_foot_landmarks_by_schema() {
        assert!(!KeypointSchema::Coco17.has_foot_landmarks());
        assert!(KeypointSchema::BlazePose33.has_foot_landmarks());
    }
}
