// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP transport for the metric pipeline.
//!
//! `POST /analyze-metrics` takes a multipart form with up to six image fields
//! named by metric key (`ankle`, `knee`, `hipFlexion`, `R1`, `popliteal`,
//! `R2`, plus the legacy aliases) and an optional `side` text field. The
//! response is the per-metric JSON map.
//!
//! Browser clients on other origins are allowed through a CORS layer. By
//! default any origin may call the API; `--cors-origin` or `CORS_ORIGINS`
//! restricts it to a list.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AnalysisConfig;
use crate::error::{GoniometryError, Result};
use crate::metric::MetricId;
use crate::model::{DEFAULT_MODEL, PoseModel};
use crate::pipeline::{Analyzer, MetricImages};
use crate::pose::Side;
use crate::provider::{PoseProvider, ProviderSlot};
use crate::results::{KeypointEntry, MetricResponse, RangeEntry};

/// Default listening port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8000;

/// Upper bound on a whole multipart request (six photos).
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    analyzer: Analyzer,
    cors_origins: Vec<String>,
}

impl AppState {
    /// Wrap an analyzer. Cross-origin requests are allowed from any origin.
    #[must_use]
    pub const fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            cors_origins: Vec::new(),
        }
    }

    /// Restrict cross-origin requests to `origins`. Empty or `*` allows any origin.
    #[must_use]
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

type AnalyzeResponse = BTreeMap<String, MetricResponse>;

#[derive(Debug, Serialize, ToSchema)]
struct ErrorResponse {
    /// Error message
    error: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    /// Server status
    status: String,
    /// API version
    version: String,
    /// Pose model readiness: `loading`, `ready` or `failed`
    model: String,
    /// Load failure reason, when `model` is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    /// Whether the loaded model emits foot landmarks
    #[serde(rename = "footLandmarks", skip_serializing_if = "Option::is_none")]
    foot_landmarks: Option<bool>,
    /// Metric keys the loaded model cannot measure
    #[serde(rename = "unsupportedMetrics", skip_serializing_if = "Vec::is_empty")]
    unsupported_metrics: Vec<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pose Goniometry Server",
        description = "Clinical joint-angle measurement from pose keypoints.\n\n## Form fields\n- `ankle`, `knee`, `hipFlexion`, `R1`, `popliteal`, `R2`: one image per metric (all optional)\n- `side`: `left` or `right` (default: `right`)",
        version = "0.1.0",
        license(name = "AGPL-3.0", url = "https://ultralytics.com/license")
    ),
    paths(root, health, analyze_metrics),
    components(schemas(MetricResponse, KeypointEntry, RangeEntry, ErrorResponse, HealthResponse)),
    tags(
        (name = "metrics", description = "Joint-angle measurement endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
struct ApiDoc;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/analyze-metrics", post(analyze_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .with_state(state)
}

/// CORS policy for `origins`. Empty or containing `*` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Split a comma-separated origin list, dropping blanks.
fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run the server until it is shut down.
///
/// The listener is bound first; the model then loads in the background so
/// `/health` reports `loading` until it is ready, and requests made before
/// that receive `503`.
///
/// # Errors
///
/// Returns [`GoniometryError::Server`] if the address cannot be bound or the
/// server fails, and [`GoniometryError::ConfigError`] for an invalid config.
pub async fn serve(
    model_path: String,
    port: u16,
    cors_origins: Vec<String>,
    config: AnalysisConfig,
) -> Result<()> {
    let slot = Arc::new(ProviderSlot::new());
    let provider: Arc<dyn PoseProvider> = slot.clone();
    let analyzer = Analyzer::new(provider, config)?;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GoniometryError::Server(format!("Failed to bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| GoniometryError::Server(e.to_string()))?;
    tracing::info!("Server listening on {local}");
    tracing::info!("Swagger UI available at http://localhost:{port}/swagger-ui/");
    if cors_origins.is_empty() {
        tracing::info!("CORS: any origin");
    } else {
        tracing::info!("CORS: {}", cors_origins.join(", "));
    }

    tokio::task::spawn_blocking(move || {
        tracing::info!("Loading model: {model_path}");
        slot.complete(PoseModel::load(&model_path));
        tracing::info!("Model {model_path}: {}", slot.readiness());
    });

    let state = AppState::new(analyzer).with_cors_origins(cors_origins);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| GoniometryError::Server(e.to_string()))
}

/// Initialise tracing and run the server.
///
/// `model_path` and `port` fall back to the `MODEL_PATH` and `PORT`
/// environment variables, then to [`DEFAULT_MODEL`] and [`DEFAULT_PORT`].
/// An empty `cors_origins` falls back to the comma-separated `CORS_ORIGINS`
/// variable, then to any origin.
///
/// # Errors
///
/// See [`serve`]; an unparsable `PORT` is a [`GoniometryError::ConfigError`].
pub async fn run(
    model_path: Option<String>,
    port: Option<u16>,
    cors_origins: Vec<String>,
    config: AnalysisConfig,
) -> Result<()> {
    tracing_subscriber::fmt::init();
    let model_path = model_path
        .or_else(|| std::env::var("MODEL_PATH").ok())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let port = match (port, std::env::var("PORT")) {
        (Some(port), _) => port,
        (None, Ok(port)) => port
            .parse()
            .map_err(|_| GoniometryError::ConfigError(format!("Invalid PORT: {port}")))?,
        (None, Err(_)) => DEFAULT_PORT,
    };
    let cors_origins = if cors_origins.is_empty() {
        std::env::var("CORS_ORIGINS")
            .map(|value| parse_origins(&value))
            .unwrap_or_default()
    } else {
        cors_origins
    };
    serve(model_path, port, cors_origins, config).await
}

/// Root endpoint
///
/// Returns a short usage banner.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Usage banner", body = String)
    )
)]
async fn root() -> &'static str {
    "Pose Goniometry Server - POST /analyze-metrics with one image per metric. Swagger UI at /swagger-ui/"
}

/// Health check endpoint
///
/// Returns server status and pose model readiness.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let readiness = state.analyzer.readiness();
    let detail = match &readiness {
        crate::provider::Readiness::Failed(reason) => Some(reason.clone()),
        _ => None,
    };
    let schema = state.analyzer.provider().keypoint_schema();
    let unsupported_metrics = schema
        .map(|schema| {
            MetricId::ALL
                .into_iter()
                .filter(|metric| !metric.supported_by(schema))
                .map(|metric| metric.key().to_string())
                .collect()
        })
        .unwrap_or_default();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        model: readiness.as_str().to_string(),
        detail,
        foot_landmarks: schema.map(|schema| schema.has_foot_landmarks()),
        unsupported_metrics,
    })
}

/// Measure joint angles
///
/// Upload one image per metric and get one entry per metric back. Metrics
/// without an image report `No image provided`.
#[utoipa::path(
    post,
    path = "/analyze-metrics",
    tag = "metrics",
    request_body(content_type = "multipart/form-data", description = "Metric images and optional side"),
    responses(
        (status = 200, description = "One entry per metric", body = BTreeMap<String, MetricResponse>),
        (status = 400, description = "Bad request - invalid side or unreadable form", body = ErrorResponse),
        (status = 503, description = "Pose model not ready", body = ErrorResponse),
        (status = 504, description = "Request deadline exceeded", body = ErrorResponse)
    )
)]
async fn analyze_metrics(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<AnalyzeResponse>, ApiError> {
    let mut images = MetricImages::new();
    let mut side_field = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(api_error(StatusCode::BAD_REQUEST, format!("Invalid form: {e}")));
            }
        };
        let name = field.name().unwrap_or_default().to_string();

        if name == "side" {
            let text = field
                .text()
                .await
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Failed to read side: {e}")))?;
            side_field = Some(text);
        } else if let Some(metric) = MetricId::from_key(&name) {
            let data = field.bytes().await.map_err(|e| {
                api_error(StatusCode::BAD_REQUEST, format!("Failed to read field '{name}': {e}"))
            })?;
            insert_upload(&mut images, metric, &name, data.to_vec());
        } else {
            tracing::warn!("Ignoring unknown form field '{name}'");
        }
    }

    let side = parse_side(side_field.as_deref())?;
    run_analysis(&state, images, side).await.map(Json)
}

/// Store an uploaded image. A later field for the same metric, e.g. `R1`
/// after `hipRotation`, replaces the earlier one with a warning. Returns
/// whether an upload was replaced.
fn insert_upload(images: &mut MetricImages, metric: MetricId, field: &str, data: Vec<u8>) -> bool {
    let replaced = images.insert(metric, data).is_some();
    if replaced {
        tracing::warn!(
            "Form field '{field}' replaces an earlier upload for '{}'",
            metric.key()
        );
    }
    replaced
}

/// Parse the optional `side` form field; absent or blank means right.
fn parse_side(field: Option<&str>) -> std::result::Result<Side, ApiError> {
    match field.map(str::trim) {
        None | Some("") => Ok(Side::default()),
        Some(value) => value.parse().map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e)),
    }
}

async fn run_analysis(
    state: &AppState,
    images: MetricImages,
    side: Side,
) -> std::result::Result<AnalyzeResponse, ApiError> {
    tracing::info!("Analyzing {} image(s), side {side}", images.len());
    match state.analyzer.process_request(images, side).await {
        Ok(results) => {
            tracing::info!("Computed {}/{} metrics", results.success_count(), results.len());
            Ok(results.to_response())
        }
        Err(e) => {
            tracing::warn!("Request failed: {e}");
            Err(api_error(error_status(&e), e.to_string()))
        }
    }
}

const fn error_status(error: &GoniometryError) -> StatusCode {
    match error {
        GoniometryError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GoniometryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GoniometryError::ConfigError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetricError;
    use crate::pose::{KeypointSchema, Pose};
    use crate::provider::{DetectOptions, Readiness};
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use image::DynamicImage;
    use tower::ServiceExt;

    struct NoPoses;

    impl PoseProvider for NoPoses {
        fn readiness(&self) -> Readiness {
            Readiness::Ready
        }

        fn detect(&self, _image: &DynamicImage, _options: &DetectOptions) -> Result<Vec<Pose>> {
            Ok(Vec::new())
        }

        fn keypoint_schema(&self) -> Option<KeypointSchema> {
            Some(KeypointSchema::Coco17)
        }
    }

    fn get_with_origin(uri: &str, origin: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    }

    fn state(provider: Arc<dyn PoseProvider>) -> AppState {
        AppState::new(Analyzer::new(provider, AnalysisConfig::default()).unwrap())
    }

    #[test]
    fn test_parse_side() {
        assert_eq!(parse_side(None).unwrap(), Side::Right);
        assert_eq!(parse_side(Some(" ")).unwrap(), Side::Right);
        assert_eq!(parse_side(Some("left")).unwrap(), Side::Left);
        let (status, _) = parse_side(Some("middle")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status() {
        let unavailable = GoniometryError::ServiceUnavailable("loading".to_string());
        assert_eq!(error_status(&unavailable), StatusCode::SERVICE_UNAVAILABLE);
        let timeout = GoniometryError::Timeout(std::time::Duration::from_secs(1));
        assert_eq!(error_status(&timeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_loading_model_is_503() {
        let slot: Arc<dyn PoseProvider> = Arc::new(ProviderSlot::new());
        let state = state(slot);
        let Json(health) = health(State(state.clone())).await;
        assert_eq!(health.model, "loading");
        assert_eq!(health.foot_landmarks, None);
        assert!(health.unsupported_metrics.is_empty());

        let (status, _) = run_analysis(&state, MetricImages::new(), Side::Right)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_empty_request_reports_every_metric() {
        let state = state(Arc::new(NoPoses));
        let response = run_analysis(&state, MetricImages::new(), Side::Left).await.unwrap();
        assert_eq!(response.len(), 6);
        let no_image = MetricError::NoImageProvided.to_string();
        for entry in response.values() {
            assert!(entry.angle.is_none());
            assert_eq!(entry.error.as_deref(), Some(no_image.as_str()));
            assert_eq!(entry.side.as_deref(), Some("left"));
        }
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/analyze-metrics"));
        assert!(doc.paths.paths.contains_key("/health"));
    }

    #[tokio::test]
    async fn test_health_reports_missing_foot_landmarks() {
        let Json(health) = health(State(state(Arc::new(NoPoses)))).await;
        assert_eq!(health.model, "ready");
        assert_eq!(health.foot_landmarks, Some(false));
        assert_eq!(health.unsupported_metrics, vec!["ankle".to_string()]);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["footLandmarks"], false);
        assert_eq!(json["unsupportedMetrics"][0], "ankle");
    }

    #[test]
    fn test_alias_upload_replaces_with_warning() {
        let mut images = MetricImages::new();
        assert!(!insert_upload(&mut images, MetricId::HamstringR1, "hipRotation", vec![1]));
        assert!(insert_upload(&mut images, MetricId::HamstringR1, "R1", vec![2]));
        assert_eq!(images.len(), 1);
        assert_eq!(images[&MetricId::HamstringR1], vec![2]);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_by_default() {
        let app = router(state(Arc::new(NoPoses)));
        let response = app
            .oneshot(get_with_origin("/health", "http://localhost:5173"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_preflight_for_analyze() {
        let app = router(state(Arc::new(NoPoses)));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/analyze-metrics")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn test_cors_origin_list() {
        let state = state(Arc::new(NoPoses))
            .with_cors_origins(parse_origins("https://clinic.example, ,http://localhost:3000"));
        assert_eq!(state.cors_origins.len(), 2);

        let allowed = router(state.clone())
            .oneshot(get_with_origin("/health", "https://clinic.example"))
            .await
            .unwrap();
        assert_eq!(
            allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://clinic.example"
        );

        let denied = router(state)
            .oneshot(get_with_origin("/health", "https://elsewhere.example"))
            .await
            .unwrap();
        assert!(!denied.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
