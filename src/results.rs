// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Per-metric results and their JSON wire form.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::to_data_uri;
use crate::error::{MetricError, Result};
use crate::metric::{Measurement, MetricId, NormalRange};
use crate::pose::{Keypoint, Side};

/// Timing information for one metric pipeline (in milliseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
    /// Time spent decoding and resizing the upload.
    pub preprocess: Option<f64>,
    /// Time spent in the pose provider.
    pub inference: Option<f64>,
    /// Time spent measuring and annotating.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Get total time.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

/// Outcome of one metric pipeline. Immutable once built.
///
/// Equality ignores [`Speed`].
#[derive(Debug, Clone)]
pub struct AngleResult {
    metric: MetricId,
    side: Side,
    angle: Option<f32>,
    confidence: Option<f32>,
    keypoints_used: Vec<Keypoint>,
    annotated_image: Option<Vec<u8>>,
    error: Option<MetricError>,
    speed: Speed,
}

impl PartialEq for AngleResult {
    fn eq(&self, other: &Self) -> bool {
        self.metric == other.metric
            && self.side == other.side
            && self.angle == other.angle
            && self.confidence == other.confidence
            && self.keypoints_used == other.keypoints_used
            && self.annotated_image == other.annotated_image
            && self.error == other.error
    }
}

impl AngleResult {
    /// Successful measurement.
    #[must_use]
    pub fn success(
        metric: MetricId,
        side: Side,
        measurement: Measurement,
        annotated_image: Option<Vec<u8>>,
    ) -> Self {
        Self {
            metric,
            side,
            angle: Some(measurement.angle),
            confidence: Some(measurement.confidence),
            keypoints_used: measurement.keypoints_used,
            annotated_image,
            error: None,
            speed: Speed::default(),
        }
    }

    /// Failed measurement; the angle is always `None`.
    #[must_use]
    pub const fn failure(
        metric: MetricId,
        side: Side,
        error: MetricError,
        annotated_image: Option<Vec<u8>>,
    ) -> Self {
        Self {
            metric,
            side,
            angle: None,
            confidence: None,
            keypoints_used: Vec::new(),
            annotated_image,
            error: Some(error),
            speed: Speed {
                preprocess: None,
                inference: None,
                postprocess: None,
            },
        }
    }

    /// Attach timing information.
    #[must_use]
    pub const fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    /// Metric this result belongs to.
    #[must_use]
    pub const fn metric(&self) -> MetricId {
        self.metric
    }

    /// Side the metric was measured on.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Angle in degrees.
    #[must_use]
    pub const fn angle(&self) -> Option<f32> {
        self.angle
    }

    /// Lowest keypoint score that went into the angle.
    #[must_use]
    pub const fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    /// Detected keypoints the angle was computed from.
    #[must_use]
    pub fn keypoints_used(&self) -> &[Keypoint] {
        &self.keypoints_used
    }

    /// Annotated image as PNG bytes.
    #[must_use]
    pub fn annotated_image(&self) -> Option<&[u8]> {
        self.annotated_image.as_deref()
    }

    /// Per-metric error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&MetricError> {
        self.error.as_ref()
    }

    /// Timing information.
    #[must_use]
    pub const fn speed(&self) -> Speed {
        self.speed
    }

    /// Whether an angle was computed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.angle.is_some()
    }

    /// Clinically expected range for this metric.
    #[must_use]
    pub const fn normal_range(&self) -> NormalRange {
        self.metric.definition().normal_range
    }

    /// Whether the angle lies in the normal range; `None` without an angle.
    #[must_use]
    pub fn within_normal_range(&self) -> Option<bool> {
        self.angle.map(|angle| self.normal_range().contains(angle))
    }

    /// One-line description for console output.
    #[must_use]
    pub fn verbose(&self) -> String {
        match (self.angle, &self.error) {
            (Some(angle), _) => {
                let flag = if self.within_normal_range() == Some(true) {
                    "normal"
                } else {
                    "outside normal"
                };
                format!(
                    "{}: {angle:.1}° (conf {:.2}, {flag} {})",
                    self.metric.display_name(),
                    self.confidence.unwrap_or(0.0),
                    self.normal_range()
                )
            }
            (None, Some(error)) => format!("{}: {error}", self.metric.display_name()),
            (None, None) => format!("{}: no result", self.metric.display_name()),
        }
    }

    /// Write the annotated PNG to `path`. Returns `false` when there is no image.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        match &self.annotated_image {
            Some(png) => {
                std::fs::write(path, png)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// JSON wire form of this result.
    #[must_use]
    pub fn to_response(&self) -> MetricResponse {
        MetricResponse::from(self)
    }
}

/// Keypoint entry in a [`MetricResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct KeypointEntry {
    /// Landmark name, e.g. `right_knee`.
    pub name: String,
    /// X coordinate in pixels.
    pub x: f32,
    /// Y coordinate in pixels.
    pub y: f32,
    /// Detection confidence (0.0 - 1.0).
    pub score: f32,
}

/// Normal range entry in a [`MetricResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct RangeEntry {
    /// Lower bound in degrees.
    pub min: f32,
    /// Upper bound in degrees.
    pub max: f32,
}

/// JSON entry for one metric.
///
/// `angle` is always present (possibly `null`); every other field is omitted
/// when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MetricResponse {
    /// Angle in degrees, or `null` on failure.
    pub angle: Option<f32>,
    /// Lowest keypoint score used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Keypoints used for the angle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<KeypointEntry>>,
    /// Annotated image as a PNG data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Human-readable error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Whether the angle lies in the normal range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_normal_range: Option<bool>,
    /// Clinically expected range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<RangeEntry>,
    /// Side the metric was measured on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
}

impl From<&AngleResult> for MetricResponse {
    fn from(result: &AngleResult) -> Self {
        let keypoints = (!result.keypoints_used.is_empty()).then(|| {
            result
                .keypoints_used
                .iter()
                .map(|kp| KeypointEntry {
                    name: kp.name.clone(),
                    x: kp.x,
                    y: kp.y,
                    score: kp.score,
                })
                .collect()
        });
        let range = result.normal_range();
        Self {
            angle: result.angle,
            confidence: result.confidence,
            keypoints,
            image: result.annotated_image.as_deref().map(to_data_uri),
            error: result.error.as_ref().map(ToString::to_string),
            error_kind: result.error.as_ref().map(|e| e.kind().to_string()),
            within_normal_range: result.within_normal_range(),
            normal_range: Some(RangeEntry {
                min: range.min,
                max: range.max,
            }),
            side: Some(result.side.to_string()),
        }
    }
}

/// Results for every metric of one request, keyed by metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricResults {
    results: BTreeMap<MetricId, AngleResult>,
}

impl MetricResults {
    /// Create an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `result` under its metric, replacing any earlier entry.
    pub fn insert(&mut self, result: AngleResult) {
        self.results.insert(result.metric(), result);
    }

    /// Result for `metric`.
    #[must_use]
    pub fn get(&self, metric: MetricId) -> Option<&AngleResult> {
        self.results.get(&metric)
    }

    /// Results in metric order.
    pub fn iter(&self) -> impl Iterator<Item = &AngleResult> {
        self.results.values()
    }

    /// Number of metrics present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no metric is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of metrics with a computed angle.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.iter().filter(|r| r.is_success()).count()
    }

    /// Wire map from metric key to response entry.
    #[must_use]
    pub fn to_response(&self) -> BTreeMap<String, MetricResponse> {
        self.results
            .iter()
            .map(|(metric, result)| (metric.key().to_string(), result.to_response()))
            .collect()
    }

    /// Wire map as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.to_response()).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<AngleResult> for MetricResults {
    fn from_iter<I: IntoIterator<Item = AngleResult>>(iter: I) -> Self {
        let mut results = Self::new();
        for result in iter {
            results.insert(result);
        }
        results
    }
}

impl<'a> IntoIterator for &'a MetricResults {
    type Item = &'a AngleResult;
    type IntoIter = std::collections::btree_map::Values<'a, MetricId, AngleResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.values()
    }
}
