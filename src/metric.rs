// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! The six supported clinical metrics and the per-metric angle calculator.
//!
//! Every metric is an angle at a vertex landmark between a first landmark and
//! a third point. The third point is either another detected landmark or an
//! imaginary point synthesized from a detected base landmark.
//!
//! | Metric | First | Vertex | Third |
//! |---|---|---|---|
//! | Ankle Dorsiflexion | knee | ankle | foot index |
//! | Knee Flexion Extension | hip | knee | ankle |
//! | Hip Flexion | knee | hip | horizontal from hip |
//! | Hamstring R1 | ankle | knee | vertical from knee |
//! | Popliteal Angle | ankle | knee | vertical from knee |
//! | Hamstring R2 | ankle | knee | hip |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::confidence::{self, Candidate};
use crate::error::MetricError;
use crate::geometry::angle_at;
use crate::imaginary::{ImaginaryKind, ImaginaryPoint, imaginary_point};
use crate::pose::{Keypoint, KeypointSchema, Point, Pose, Role, Side, resolve};

/// Identifier of a supported clinical metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricId {
    /// Ankle dorsiflexion.
    #[serde(rename = "ankle")]
    AnkleDorsiflexion,
    /// Knee flexion/extension.
    #[serde(rename = "knee")]
    KneeFlexionExtension,
    /// Hip flexion against a horizontal reference.
    #[serde(rename = "hipFlexion")]
    HipFlexion,
    /// Hamstring length test R1.
    #[serde(rename = "R1", alias = "hipRotation")]
    HamstringR1,
    /// Popliteal angle.
    #[serde(rename = "popliteal")]
    PoplitealAngle,
    /// Hamstring length test R2 (foot progression in older clients).
    #[serde(rename = "R2", alias = "footProgression")]
    HamstringR2,
}

impl MetricId {
    /// All metrics in response order.
    pub const ALL: [Self; 6] = [
        Self::AnkleDorsiflexion,
        Self::KneeFlexionExtension,
        Self::HipFlexion,
        Self::HamstringR1,
        Self::PoplitealAngle,
        Self::HamstringR2,
    ];

    /// Wire key used in requests and responses.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::AnkleDorsiflexion => "ankle",
            Self::KneeFlexionExtension => "knee",
            Self::HipFlexion => "hipFlexion",
            Self::HamstringR1 => "R1",
            Self::PoplitealAngle => "popliteal",
            Self::HamstringR2 => "R2",
        }
    }

    /// Human-readable name drawn on annotated images.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::AnkleDorsiflexion => "Ankle Dorsiflexion",
            Self::KneeFlexionExtension => "Knee Flexion Extension",
            Self::HipFlexion => "Hip Flexion",
            Self::HamstringR1 => "Hamstring R1",
            Self::PoplitealAngle => "Popliteal Angle",
            Self::HamstringR2 => "Hamstring R2",
        }
    }

    /// Parse a wire key, accepting legacy aliases.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ankle" => Some(Self::AnkleDorsiflexion),
            "knee" => Some(Self::KneeFlexionExtension),
            "hipFlexion" => Some(Self::HipFlexion),
            "R1" | "hipRotation" => Some(Self::HamstringR1),
            "popliteal" => Some(Self::PoplitealAngle),
            "R2" | "footProgression" => Some(Self::HamstringR2),
            _ => None,
        }
    }

    /// Whether a model emitting `schema` has every landmark this metric reads.
    #[must_use]
    pub fn supported_by(&self, schema: KeypointSchema) -> bool {
        let names = schema.names();
        self.definition().required_roles().into_iter().all(|role| {
            [Side::Left, Side::Right]
                .into_iter()
                .all(|side| names.contains(&role.keypoint_name(side).as_str()))
        })
    }

    /// Static definition of this metric.
    #[must_use]
    pub const fn definition(&self) -> MetricDefinition {
        let (first, vertex, third, normal_range) = match self {
            Self::AnkleDorsiflexion => (
                Role::Knee,
                Role::Ankle,
                ThirdPoint::Detected(Role::FootIndex),
                NormalRange::new(10.0, 20.0),
            ),
            Self::KneeFlexionExtension => (
                Role::Hip,
                Role::Knee,
                ThirdPoint::Detected(Role::Ankle),
                NormalRange::new(0.0, 135.0),
            ),
            Self::HipFlexion => (
                Role::Knee,
                Role::Hip,
                ThirdPoint::Imaginary {
                    kind: ImaginaryKind::Horizontal,
                    base: Role::Hip,
                },
                NormalRange::new(0.0, 120.0),
            ),
            Self::HamstringR1 => (
                Role::Ankle,
                Role::Knee,
                ThirdPoint::Imaginary {
                    kind: ImaginaryKind::Vertical,
                    base: Role::Knee,
                },
                NormalRange::new(30.0, 60.0),
            ),
            Self::PoplitealAngle => (
                Role::Ankle,
                Role::Knee,
                ThirdPoint::Imaginary {
                    kind: ImaginaryKind::Vertical,
                    base: Role::Knee,
                },
                NormalRange::new(5.0, 15.0),
            ),
            Self::HamstringR2 => (
                Role::Ankle,
                Role::Knee,
                ThirdPoint::Detected(Role::Hip),
                NormalRange::new(5.0, 18.0),
            ),
        };
        MetricDefinition {
            id: *self,
            first,
            vertex,
            third,
            normal_range,
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for MetricId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s.trim()).ok_or_else(|| format!("Unknown metric: {s}"))
    }
}

/// Where the third angle point comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThirdPoint {
    /// Another detected landmark.
    Detected(Role),
    /// A point synthesized from a detected base landmark.
    Imaginary {
        /// Offset direction.
        kind: ImaginaryKind,
        /// Landmark the offset starts from.
        base: Role,
    },
}

/// Clinically expected angle interval in degrees, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalRange {
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
}

impl NormalRange {
    /// Create a new range.
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Whether `angle` falls inside the range.
    #[must_use]
    pub fn contains(&self, angle: f32) -> bool {
        (self.min..=self.max).contains(&angle)
    }
}

impl fmt::Display for NormalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}°", self.min, self.max)
    }
}

/// Static description of one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDefinition {
    /// Metric this definition belongs to.
    pub id: MetricId,
    /// First ray endpoint.
    pub first: Role,
    /// Angle vertex.
    pub vertex: Role,
    /// Second ray endpoint.
    pub third: ThirdPoint,
    /// Expected range.
    pub normal_range: NormalRange,
}

impl MetricDefinition {
    /// Detected landmarks this metric reads, deduplicated, in A, B, C order.
    #[must_use]
    pub fn required_roles(&self) -> Vec<Role> {
        let third = match self.third {
            ThirdPoint::Detected(role) | ThirdPoint::Imaginary { base: role, .. } => role,
        };
        let mut roles = Vec::with_capacity(3);
        for role in [self.first, self.vertex, third] {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        roles
    }

    /// Whether the third point is synthesized.
    #[must_use]
    pub const fn uses_imaginary(&self) -> bool {
        matches!(self.third, ThirdPoint::Imaginary { .. })
    }
}

/// A successfully computed angle.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Angle at the vertex in degrees, within `[0, 180]`.
    pub angle: f32,
    /// Lowest score among the detected keypoints used.
    pub confidence: f32,
    /// Detected keypoints the angle was computed from.
    pub keypoints_used: Vec<Keypoint>,
    /// Synthesized third point, if any.
    pub imaginary: Option<ImaginaryPoint>,
}

/// Compute `definition`'s angle for `side` from a detected pose.
///
/// `image_dims` is `(width, height)` and only matters when the imaginary
/// offset is configured to scale with the image.
///
/// # Errors
///
/// * [`MetricError::InsufficientKeypoints`] if any required landmark is
///   absent or scores below `config.min_keypoint_confidence`.
/// * [`MetricError::DegenerateGeometry`] if two angle points coincide.
pub fn compute(
    definition: &MetricDefinition,
    pose: &Pose,
    side: Side,
    config: &AnalysisConfig,
    image_dims: (u32, u32),
) -> Result<Measurement, MetricError> {
    let threshold = config.min_keypoint_confidence;
    let roles = definition.required_roles();
    let names: Vec<String> = roles.iter().map(|role| role.keypoint_name(side)).collect();
    let resolved: Vec<Option<&Keypoint>> = roles
        .iter()
        .map(|role| resolve(pose, *role, side))
        .collect();

    let candidates: Vec<Candidate<'_>> = names
        .iter()
        .zip(&resolved)
        .map(|(name, keypoint)| Candidate::Detected {
            name,
            keypoint: *keypoint,
        })
        .collect();
    if !confidence::validate(&candidates, threshold) {
        return Err(MetricError::InsufficientKeypoints {
            missing: confidence::insufficient(&candidates, threshold),
        });
    }

    let used: Vec<Keypoint> = resolved.into_iter().flatten().cloned().collect();
    let point_of = |role: Role| -> Result<Point, MetricError> {
        roles
            .iter()
            .position(|r| *r == role)
            .and_then(|i| used.get(i))
            .map(Keypoint::point)
            .ok_or_else(|| MetricError::InsufficientKeypoints {
                missing: vec![role.keypoint_name(side)],
            })
    };

    let a = point_of(definition.first)?;
    let b = point_of(definition.vertex)?;
    let (c, imaginary) = match definition.third {
        ThirdPoint::Detected(role) => (point_of(role)?, None),
        ThirdPoint::Imaginary { kind, base } => {
            let offset = config.offset().resolve(image_dims);
            let synthesized = imaginary_point(kind, point_of(base)?, side, offset);
            (synthesized.point, Some(synthesized))
        }
    };

    let angle = angle_at(a, b, c)?;
    let confidence = used
        .iter()
        .map(|kp| kp.score)
        .fold(f32::INFINITY, f32::min);

    Ok(Measurement {
        angle,
        confidence,
        keypoints_used: used,
        imaginary,
    })
}
