// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! The per-metric pipeline and request orchestration.
//!
//! Each metric runs `decode → detect → measure → annotate` on its own image.
//! [`Analyzer::process_request`] checks provider readiness once, then runs
//! one blocking task per metric and joins them under the request deadline.
//! Per-metric failures are stored in that metric's entry and never abort the
//! others.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::DynamicImage;

#[cfg(feature = "annotate")]
use ab_glyph::FontVec;

use crate::annotate::{Annotation, plan};
use crate::codec::{decode, limit_size};
use crate::config::AnalysisConfig;
use crate::error::{GoniometryError, MetricError, Result};
use crate::metric::{Measurement, MetricId, compute};
use crate::pose::{Pose, Side};
use crate::provider::{DetectOptions, PoseProvider, Readiness};
use crate::results::{AngleResult, MetricResults, Speed};

/// Uploaded images for one request, keyed by metric.
pub type MetricImages = HashMap<MetricId, Vec<u8>>;

struct Inner {
    provider: Arc<dyn PoseProvider>,
    config: AnalysisConfig,
    #[cfg(feature = "annotate")]
    font: Option<FontVec>,
}

/// Runs metric pipelines against a shared pose provider.
///
/// Cloning is cheap; clones share the provider, configuration and font.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use pose_goniometry::{AnalysisConfig, Analyzer, MetricId, PoseModel, Side};
///
/// let model = PoseModel::load("yolo11n-pose.onnx")?;
/// let analyzer = Analyzer::new(Arc::new(model), AnalysisConfig::default())?;
/// let bytes = std::fs::read("knee.jpg")?;
/// let result = analyzer.analyze_metric(MetricId::KneeFlexionExtension, Some(&bytes), Side::Right);
/// println!("{}", result.verbose());
/// # Ok::<(), pose_goniometry::GoniometryError>(())
/// ```
#[derive(Clone)]
pub struct Analyzer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("provider", &self.inner.provider.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Create an analyzer.
    ///
    /// When annotation is enabled the label font is loaded once here, from
    /// `config.font_path` or else the default font in the user config
    /// directory (downloaded on first use). A font that cannot be found or
    /// loaded is reported and labels are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GoniometryError::ConfigError`] if the configuration is invalid.
    pub fn new(provider: Arc<dyn PoseProvider>, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;

        #[cfg(feature = "annotate")]
        let font = if config.annotate {
            label_font(config.font_path.as_deref())
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(Inner {
                provider,
                config,
                #[cfg(feature = "annotate")]
                font,
            }),
        })
    }

    /// Analysis configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.inner.config
    }

    /// Shared pose provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn PoseProvider> {
        &self.inner.provider
    }

    /// Whether annotated images carry text labels.
    #[cfg(feature = "annotate")]
    #[must_use]
    pub fn has_label_font(&self) -> bool {
        self.inner.font.is_some()
    }

    /// Current provider readiness.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.inner.provider.readiness()
    }

    /// Provider options for a request on `side`.
    #[must_use]
    pub fn detect_options(&self, side: Side) -> DetectOptions {
        let config = &self.inner.config;
        DetectOptions {
            flip_horizontal: config.flip.should_flip(side),
            max_poses: config.max_poses,
            score_threshold: config.pose_score_threshold,
        }
    }

    /// Run one metric pipeline on raw upload bytes.
    ///
    /// `None` yields [`MetricError::NoImageProvided`]. Never panics and never
    /// returns an error; every failure is captured in the result.
    #[must_use]
    pub fn analyze_metric(&self, metric: MetricId, bytes: Option<&[u8]>, side: Side) -> AngleResult {
        self.analyze_metric_until(metric, bytes, side, &AtomicBool::new(false))
    }

    /// [`analyze_metric`](Self::analyze_metric) that stops at the next stage
    /// boundary once `cancelled` is set.
    fn analyze_metric_until(
        &self,
        metric: MetricId,
        bytes: Option<&[u8]>,
        side: Side,
        cancelled: &AtomicBool,
    ) -> AngleResult {
        let Some(bytes) = bytes else {
            crate::verbose!("{metric}: no image provided");
            return AngleResult::failure(metric, side, MetricError::NoImageProvided, None);
        };

        let start = Instant::now();
        let image = match decode(bytes) {
            Ok(image) => image,
            Err(e) => return processing_failure(metric, side, &e),
        };
        let image = match self.inner.config.max_image_dim {
            Some(max_dim) => limit_size(image, max_dim),
            None => image,
        };
        let preprocess = elapsed_ms(start);

        let result = self.analyze_image_until(metric, &image, side, cancelled);
        let speed = Speed {
            preprocess: Some(preprocess),
            ..result.speed()
        };
        result.with_speed(speed)
    }

    /// Run one metric pipeline on an already decoded image.
    #[must_use]
    pub fn analyze_image(&self, metric: MetricId, image: &DynamicImage, side: Side) -> AngleResult {
        self.analyze_image_until(metric, image, side, &AtomicBool::new(false))
    }

    fn analyze_image_until(
        &self,
        metric: MetricId,
        image: &DynamicImage,
        side: Side,
        cancelled: &AtomicBool,
    ) -> AngleResult {
        if cancelled.load(Ordering::Relaxed) {
            return abandoned(metric, side);
        }
        let start = Instant::now();
        let poses = match self.inner.provider.detect(image, &self.detect_options(side)) {
            Ok(poses) => poses,
            Err(e) => return processing_failure(metric, side, &e),
        };
        let inference = elapsed_ms(start);
        if cancelled.load(Ordering::Relaxed) {
            return abandoned(metric, side);
        }

        let start = Instant::now();
        let result = self.measure(metric, image, side, poses.first());
        let speed = Speed {
            preprocess: None,
            inference: Some(inference),
            postprocess: Some(elapsed_ms(start)),
        };
        crate::verbose!("{}", result.verbose());
        result.with_speed(speed)
    }

    fn measure(
        &self,
        metric: MetricId,
        image: &DynamicImage,
        side: Side,
        pose: Option<&Pose>,
    ) -> AngleResult {
        let dims = (image.width(), image.height());
        let outcome = match pose {
            Some(pose) => compute(&metric.definition(), pose, side, &self.inner.config, dims),
            None => Err(MetricError::NoPoseDetected),
        };

        let annotated = match self.annotate(image, metric, side, pose, outcome.as_ref().ok()) {
            Ok(annotated) => annotated,
            Err(e) => return processing_failure(metric, side, &e),
        };

        match outcome {
            Ok(measurement) => AngleResult::success(metric, side, measurement, annotated),
            Err(error) => AngleResult::failure(metric, side, error, annotated),
        }
    }

    /// Plan, render and PNG-encode the overlay. `Ok(None)` when annotation is off.
    #[cfg(feature = "annotate")]
    fn annotate(
        &self,
        image: &DynamicImage,
        metric: MetricId,
        side: Side,
        pose: Option<&Pose>,
        measurement: Option<&Measurement>,
    ) -> Result<Option<Vec<u8>>> {
        let config = &self.inner.config;
        if !config.annotate {
            return Ok(None);
        }
        let commands = plan(&Annotation {
            metric,
            side,
            pose,
            measurement,
            image_dims: (image.width(), image.height()),
            marker_threshold: config.label_marker_threshold,
        });
        let canvas = crate::render::render(image, &commands, self.inner.font.as_ref());
        crate::codec::encode_png(&canvas).map(Some)
    }

    /// Without the raster backend only the plan is built, for logging.
    #[cfg(not(feature = "annotate"))]
    #[allow(clippy::unnecessary_wraps)]
    fn annotate(
        &self,
        image: &DynamicImage,
        metric: MetricId,
        side: Side,
        pose: Option<&Pose>,
        measurement: Option<&Measurement>,
    ) -> Result<Option<Vec<u8>>> {
        if self.inner.config.annotate {
            let commands = plan(&Annotation {
                metric,
                side,
                pose,
                measurement,
                image_dims: (image.width(), image.height()),
                marker_threshold: self.inner.config.label_marker_threshold,
            });
            crate::verbose!("{metric}: {} draw commands (raster backend disabled)", commands.len());
        }
        Ok(None)
    }

    /// Process all six metrics concurrently.
    ///
    /// Readiness is checked once before any work starts. Metrics without an
    /// image get [`MetricError::NoImageProvided`]. Unknown extra keys cannot
    /// occur because `images` is keyed by [`MetricId`].
    ///
    /// Blocking workers cannot be interrupted. When the deadline elapses they
    /// are told to stop, and each one returns at its next stage boundary
    /// (before detection or before annotation) instead of finishing the
    /// pipeline. A detection already running completes in the background.
    ///
    /// # Errors
    ///
    /// * [`GoniometryError::ServiceUnavailable`] if the provider is not ready.
    /// * [`GoniometryError::Timeout`] if the request deadline elapses.
    pub async fn process_request(&self, mut images: MetricImages, side: Side) -> Result<MetricResults> {
        self.readiness().ensure_ready()?;
        crate::verbose!("Processing {} image(s) for side {side}", images.len());

        let cancelled = Arc::new(AtomicBool::new(false));
        let handles: Vec<_> = MetricId::ALL
            .into_iter()
            .map(|metric| {
                let analyzer = self.clone();
                let bytes = images.remove(&metric);
                let cancelled = Arc::clone(&cancelled);
                let handle = tokio::task::spawn_blocking(move || {
                    analyzer.analyze_metric_until(metric, bytes.as_deref(), side, &cancelled)
                });
                (metric, handle)
            })
            .collect();

        let deadline = self.inner.config.request_timeout;
        let outcome = tokio::time::timeout(deadline, async move {
            let mut results = MetricResults::new();
            for (metric, handle) in handles {
                let result = handle.await.unwrap_or_else(|e| {
                    crate::warn!("{metric}: worker task failed: {e}");
                    AngleResult::failure(
                        metric,
                        side,
                        MetricError::ProcessingError(format!("worker task failed: {e}")),
                        None,
                    )
                });
                results.insert(result);
            }
            results
        })
        .await;
        if outcome.is_err() {
            cancelled.store(true, Ordering::Relaxed);
            crate::warn!("Request deadline of {deadline:?} exceeded; abandoning unfinished metrics");
        }
        outcome.map_err(|_| GoniometryError::Timeout(deadline))
    }

    /// Process all six metrics one after another on the calling thread.
    ///
    /// Produces the same results as [`process_request`](Self::process_request).
    ///
    /// # Errors
    ///
    /// Returns [`GoniometryError::ServiceUnavailable`] if the provider is not ready.
    pub fn process_request_sequential(&self, images: &MetricImages, side: Side) -> Result<MetricResults> {
        self.readiness().ensure_ready()?;
        Ok(MetricId::ALL
            .into_iter()
            .map(|metric| self.analyze_metric(metric, images.get(&metric).map(Vec::as_slice), side))
            .collect())
    }
}

#[cfg(feature = "annotate")]
fn label_font(path: Option<&std::path::Path>) -> Option<FontVec> {
    let path = match path {
        Some(path) => path,
        None => {
            let Some(path) = crate::render::default_font() else {
                crate::warn!("No label font available; annotated images will have no text labels");
                return None;
            };
            path
        }
    };
    match crate::render::load_font(path) {
        Ok(font) => Some(font),
        Err(e) => {
            crate::warn!("{e}; annotated images will have no text labels");
            None
        }
    }
}

fn abandoned(metric: MetricId, side: Side) -> AngleResult {
    crate::verbose!("{metric}: request deadline exceeded, stopping");
    AngleResult::failure(
        metric,
        side,
        MetricError::ProcessingError("request deadline exceeded".to_string()),
        None,
    )
}

fn processing_failure(metric: MetricId, side: Side, error: &GoniometryError) -> AngleResult {
    crate::warn!("{metric}: {error}");
    AngleResult::failure(metric, side, MetricError::ProcessingError(error.to_string()), None)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::AtomicUsize;

    struct OnePose(Option<Pose>);

    impl PoseProvider for OnePose {
        fn readiness(&self) -> Readiness {
            Readiness::Ready
        }

        fn detect(&self, _image: &DynamicImage, _options: &DetectOptions) -> Result<Vec<Pose>> {
            Ok(self.0.clone().into_iter().collect())
        }
    }

    /// Counts detection calls.
    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl PoseProvider for Counting {
        fn readiness(&self) -> Readiness {
            Readiness::Ready
        }

        fn detect(&self, _image: &DynamicImage, _options: &DetectOptions) -> Result<Vec<Pose>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn png() -> Vec<u8> {
        let image = RgbImage::from_pixel(64, 64, Rgb([40, 40, 40]));
        crate::codec::encode_png(&image).unwrap()
    }

    fn leg() -> Pose {
        Pose::new(
            vec![
                Keypoint::new("right_hip", 20.0, 10.0, 0.9),
                Keypoint::new("right_knee", 20.0, 30.0, 0.9),
                Keypoint::new("right_ankle", 20.0, 50.0, 0.9),
                Keypoint::new("right_foot_index", 35.0, 50.0, 0.9),
            ],
            0.9,
        )
    }

    fn analyzer(pose: Option<Pose>) -> Analyzer {
        Analyzer::new(Arc::new(OnePose(pose)), AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_no_image() {
        let result = analyzer(None).analyze_metric(MetricId::AnkleDorsiflexion, None, Side::Right);
        assert_eq!(result.error(), Some(&MetricError::NoImageProvided));
        assert!(result.angle().is_none());
        assert!(result.annotated_image().is_none());
    }

    #[test]
    fn test_empty_upload_is_processing_error() {
        let result = analyzer(Some(leg())).analyze_metric(MetricId::KneeFlexionExtension, Some(&[]), Side::Right);
        assert_eq!(result.error().map(MetricError::kind), Some("processing_error"));
    }

    #[test]
    fn test_no_pose_still_annotates() {
        let result = analyzer(None).analyze_metric(MetricId::KneeFlexionExtension, Some(&png()), Side::Right);
        assert_eq!(result.error(), Some(&MetricError::NoPoseDetected));
        #[cfg(feature = "annotate")]
        assert!(result.annotated_image().is_some());
    }

    #[test]
    fn test_success_path() {
        let result = analyzer(Some(leg())).analyze_metric(MetricId::KneeFlexionExtension, Some(&png()), Side::Right);
        let angle = result.angle().unwrap();
        assert!((angle - 180.0).abs() < 1e-3);
        assert_eq!(result.keypoints_used().len(), 3);
        assert!(result.speed().inference.is_some());
    }

    #[test]
    fn test_detect_options_follow_flip_policy() {
        let config = AnalysisConfig::default().with_flip(crate::config::FlipPolicy::LeftSide);
        let analyzer = Analyzer::new(Arc::new(OnePose(None)), config).unwrap();
        assert!(analyzer.detect_options(Side::Left).flip_horizontal);
        assert!(!analyzer.detect_options(Side::Right).flip_horizontal);
        assert_eq!(analyzer.detect_options(Side::Right).max_poses, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalysisConfig::default().with_max_poses(0);
        assert!(Analyzer::new(Arc::new(OnePose(None)), config).is_err());
    }

    #[test]
    fn test_cancelled_metric_skips_detection() {
        let provider = Arc::new(Counting::default());
        let analyzer = Analyzer::new(provider.clone(), AnalysisConfig::default()).unwrap();

        let cancelled = AtomicBool::new(true);
        let result = analyzer.analyze_metric_until(MetricId::KneeFlexionExtension, Some(&png()), Side::Right, &cancelled);
        assert_eq!(provider.0.load(Ordering::SeqCst), 0);
        assert!(result.error().unwrap().to_string().contains("deadline"));
        assert!(result.annotated_image().is_none());

        let result = analyzer.analyze_metric(MetricId::KneeFlexionExtension, Some(&png()), Side::Right);
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
        assert_eq!(result.error(), Some(&MetricError::NoPoseDetected));
    }

    #[cfg(feature = "annotate")]
    #[test]
    fn test_default_config_loads_label_font() {
        let labelled = analyzer(Some(leg()));
        assert_eq!(labelled.has_label_font(), crate::render::default_font().is_some());

        let unlabelled = Analyzer::new(
            Arc::new(OnePose(Some(leg()))),
            AnalysisConfig::default().with_font_path("/nonexistent/label-font.ttf"),
        )
        .unwrap();
        assert!(!unlabelled.has_label_font());

        if labelled.has_label_font() {
            let with_text = labelled.analyze_metric(MetricId::KneeFlexionExtension, Some(&png()), Side::Right);
            let without_text = unlabelled.analyze_metric(MetricId::KneeFlexionExtension, Some(&png()), Side::Right);
            assert_ne!(with_text.annotated_image(), without_text.annotated_image());
        }
    }

    #[cfg(feature = "annotate")]
    #[test]
    fn test_annotate_off_skips_font() {
        let analyzer = Analyzer::new(
            Arc::new(OnePose(None)),
            AnalysisConfig::default().with_annotate(false),
        )
        .unwrap();
        assert!(!analyzer.has_label_font());
    }
}
