// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose provider abstraction and readiness tracking.

use std::fmt;
use std::sync::{Arc, RwLock};

use image::DynamicImage;

use crate::error::{GoniometryError, Result};
use crate::pose::{KeypointSchema, Pose};

/// Options passed to [`PoseProvider::detect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    /// Mirror the image horizontally before detection. Returned coordinates
    /// are always in the original (unflipped) image frame.
    pub flip_horizontal: bool,
    /// Maximum number of poses to return.
    pub max_poses: usize,
    /// Minimum overall pose score.
    pub score_threshold: f32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            flip_horizontal: false,
            max_poses: 1,
            score_threshold: 0.5,
        }
    }
}

/// Lifecycle state of a pose provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Still loading; requests are rejected.
    Loading,
    /// Ready to serve.
    Ready,
    /// Loading failed permanently.
    Failed(String),
}

impl Readiness {
    /// Whether requests may be dispatched.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Short status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }

    /// Convert a non-ready state into [`GoniometryError::ServiceUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns an error for `Loading` and `Failed`.
    pub fn ensure_ready(&self) -> Result<()> {
        match self {
            Self::Ready => Ok(()),
            Self::Loading => Err(GoniometryError::ServiceUnavailable(
                "pose model is still loading".to_string(),
            )),
            Self::Failed(reason) => Err(GoniometryError::ServiceUnavailable(format!(
                "pose model failed to load: {reason}"
            ))),
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// A source of detected poses.
///
/// Implementations must be shareable across the worker tasks of a request.
pub trait PoseProvider: Send + Sync {
    /// Current lifecycle state.
    fn readiness(&self) -> Readiness;

    /// Detect up to `options.max_poses` poses in `image`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails. Finding no pose is `Ok(vec![])`.
    fn detect(&self, image: &DynamicImage, options: &DetectOptions) -> Result<Vec<Pose>>;

    /// Short provider description for logs and health checks.
    fn name(&self) -> String {
        "pose provider".to_string()
    }

    /// Landmark layout of the detected poses, when known.
    fn keypoint_schema(&self) -> Option<KeypointSchema> {
        None
    }
}

enum SlotState {
    Loading,
    Ready(Arc<dyn PoseProvider>),
    Failed(String),
}

/// A provider that becomes available later, e.g. after a background model load.
///
/// Starts in [`Readiness::Loading`]; [`install`](Self::install) moves it to
/// ready and [`fail`](Self::fail) to failed.
pub struct ProviderSlot {
    state: RwLock<SlotState>,
}

impl Default for ProviderSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("readiness", &self.readiness())
            .finish()
    }
}

impl ProviderSlot {
    /// Create an empty slot in the loading state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(SlotState::Loading),
        }
    }

    /// Install a loaded provider.
    pub fn install(&self, provider: Arc<dyn PoseProvider>) {
        if let Ok(mut state) = self.state.write() {
            *state = SlotState::Ready(provider);
        }
    }

    /// Record a permanent load failure.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            *state = SlotState::Failed(reason.into());
        }
    }

    /// Record the outcome of a load attempt.
    pub fn complete<P: PoseProvider + 'static>(&self, outcome: Result<P>) {
        match outcome {
            Ok(provider) => self.install(Arc::new(provider)),
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn current(&self) -> Option<Arc<dyn PoseProvider>> {
        match &*self.state.read().ok()? {
            SlotState::Ready(provider) => Some(Arc::clone(provider)),
            _ => None,
        }
    }
}

impl PoseProvider for ProviderSlot {
    fn readiness(&self) -> Readiness {
        match self.state.read() {
            Ok(state) => match &*state {
                SlotState::Loading => Readiness::Loading,
                SlotState::Ready(provider) => provider.readiness(),
                SlotState::Failed(reason) => Readiness::Failed(reason.clone()),
            },
            Err(_) => Readiness::Failed("provider state poisoned".to_string()),
        }
    }

    fn detect(&self, image: &DynamicImage, options: &DetectOptions) -> Result<Vec<Pose>> {
        let provider = self.current().ok_or_else(|| {
            GoniometryError::ServiceUnavailable("pose model is not ready".to_string())
        })?;
        provider.detect(image, options)
    }

    fn name(&self) -> String {
        self.current()
            .map_or_else(|| "unloaded".to_string(), |provider| provider.name())
    }

    fn keypoint_schema(&self) -> Option<KeypointSchema> {
        self.current().and_then(|provider| provider.keypoint_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl PoseProvider for Fixed {
        fn readiness(&self) -> Readiness {
            Readiness::Ready
        }

        fn detect(&self, _image: &DynamicImage, _options: &DetectOptions) -> Result<Vec<Pose>> {
            Ok(vec![Pose::default()])
        }

        fn name(&self) -> String {
            "fixed".to_string()
        }

        fn keypoint_schema(&self) -> Option<KeypointSchema> {
            Some(KeypointSchema::Coco17)
        }
    }

    #[test]
    fn test_slot_lifecycle() {
        let slot = ProviderSlot::new();
        assert_eq!(slot.readiness(), Readiness::Loading);
        assert!(slot.readiness().ensure_ready().is_err());
        let image = DynamicImage::new_rgb8(4, 4);
        assert!(slot.detect(&image, &DetectOptions::default()).is_err());

        assert_eq!(slot.keypoint_schema(), None);

        slot.install(Arc::new(Fixed));
        assert!(slot.readiness().is_ready());
        assert_eq!(slot.name(), "fixed");
        assert_eq!(slot.keypoint_schema(), Some(KeypointSchema::Coco17));
        assert_eq!(slot.detect(&image, &DetectOptions::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_slot_failure() {
        let slot = ProviderSlot::new();
        slot.complete::<Fixed>(Err(GoniometryError::ModelLoadError("missing".to_string())));
        let readiness = slot.readiness();
        assert_eq!(readiness.as_str(), "failed");
        let err = readiness.ensure_ready().unwrap_err();
        assert!(matches!(err, GoniometryError::ServiceUnavailable(_)));
    }
}
