//! Web server module for orbtrack.
//!
//! Serves the JSON Query API (current sample with analytics, recent path),
//! health probes and collector statistics. Every request reads from one
//! snapshot so its parts agree with each other.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::analytics::{AnalyticsEngine, AnalyticsResult};
use crate::collector::CollectorMonitor;
use crate::config::{PathConfig, parse_duration};
use crate::storage::{Sample, SampleReader, StorageError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub reader: SampleReader,
    pub analytics: AnalyticsEngine,
    pub path: PathConfig,
    /// Statistics of the running collector, if one was started.
    pub collector: Option<CollectorMonitor>,
}

// =============================================================================
// Errors
// =============================================================================

/// Query API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The store could not be read.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The requested window is malformed or out of bounds.
    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        tracing::error!(error = %e, "Query failed");
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::with_message("storage_unavailable", &msg)),
            )
                .into_response(),
            ApiError::InvalidWindow(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_message("invalid_window", &msg)),
            )
                .into_response(),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: None,
        }
    }

    pub fn with_message(error: &str, message: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: Some(message.to_string()),
        }
    }
}

// =============================================================================
// Requests and responses
// =============================================================================

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<u64>,
}

/// Latest sample with analytics.
#[derive(Debug, Serialize)]
pub struct CurrentResponse {
    pub sample: Option<Sample>,
    pub analytics: AnalyticsResult,
}

/// Query parameters for the path API.
///
/// Kept as strings so malformed values get a JSON 400 instead of the
/// extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct PathQueryParams {
    /// Humantime window, e.g. `90m` or `24h`.
    pub window: Option<String>,
    /// Window in whole seconds.
    pub window_seconds: Option<String>,
}

/// Recent ground track, ascending by timestamp.
#[derive(Debug, Default, Serialize)]
pub struct PathResponse {
    pub window_seconds: u64,
    /// Exclusive lower bound on `timestamp_utc`.
    pub since: i64,
    /// `[latitude, longitude]` pairs.
    pub path: Vec<[f64; 2]>,
    pub timestamps: Vec<i64>,
    pub altitudes: Vec<f64>,
}

impl PathResponse {
    fn push(&mut self, sample: &Sample) {
        self.path.push([sample.latitude, sample.longitude]);
        self.timestamps.push(sample.timestamp_utc);
        self.altitudes.push(sample.altitude);
    }
}

/// Resolve the requested path window against configured defaults and cap.
fn resolve_window(params: &PathQueryParams, config: &PathConfig) -> ApiResult<Duration> {
    let window = match (params.window.as_deref(), params.window_seconds.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(ApiError::InvalidWindow(
                "use either 'window' or 'window_seconds', not both".to_string(),
            ));
        }
        (Some(text), None) => parse_duration(text)
            .map_err(|e| ApiError::InvalidWindow(format!("'{}': {}", text, e)))?,
        (None, Some(text)) => text
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ApiError::InvalidWindow(format!("'{}': {}", text, e)))?,
        (None, None) => config.default_window,
    };

    if window.as_secs() == 0 {
        return Err(ApiError::InvalidWindow(
            "window must be at least one second".to_string(),
        ));
    }

    if let Some(max) = config.max_window
        && window > max
    {
        return Err(ApiError::InvalidWindow(format!(
            "window {} exceeds the maximum of {}",
            humantime::format_duration(window),
            humantime::format_duration(max)
        )));
    }

    Ok(window)
}

// =============================================================================
// Router
// =============================================================================

/// Create the Axum router with all routes.
///
/// When `static_dir` is set its files are served for any path the API does
/// not claim.
pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let app_state = Arc::new(state);

    let router = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/current", get(current_handler))
        .route("/api/path", get(path_handler))
        .route("/api/collector", get(collector_handler))
        .route("/api/realtime_data", get(current_handler))
        .route("/api/path_history", get(path_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
        samples: None,
    })
}

/// Readiness probe that checks the store is readable.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reader.count().await {
        Ok(samples) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
            samples: Some(samples),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                    samples: None,
                }),
            )
                .into_response()
        }
    }
}

/// Latest sample plus analytics, from one snapshot.
async fn current_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<CurrentResponse>> {
    let mut snapshot = state.reader.snapshot().await?;
    let sample = snapshot.latest().await?;
    let analytics = state
        .analytics
        .compute_with_latest(&mut snapshot, sample.as_ref())
        .await?;

    Ok(Json(CurrentResponse { sample, analytics }))
}

/// Samples newer than `now - window`.
async fn path_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<PathQueryParams>, QueryRejection>,
) -> ApiResult<Json<PathResponse>> {
    let Query(params) = params.map_err(|e| ApiError::InvalidWindow(e.body_text()))?;
    let window = resolve_window(&params, &state.path)?;

    let window_seconds = window.as_secs();
    let since = chrono::Utc::now()
        .timestamp()
        .saturating_sub(i64::try_from(window_seconds).unwrap_or(i64::MAX));

    let mut response = PathResponse {
        window_seconds,
        since,
        ..Default::default()
    };

    let mut snapshot = state.reader.snapshot().await?;
    let mut samples = snapshot.range(since);
    while let Some(sample) = samples.next().await {
        response.push(&sample?);
    }

    tracing::debug!(
        window_seconds,
        points = response.timestamps.len(),
        "Path served"
    );
    Ok(Json(response))
}

/// Live collector statistics.
async fn collector_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.collector {
        Some(monitor) => Json(monitor.status()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("collector_not_running")),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageBuilder, StorageHandles};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    async fn create_test_state(path: PathConfig) -> (AppState, StorageHandles, TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_server.db");

        let handles = StorageBuilder::new(&db_path)
            .pool_size(2)
            .channel_capacity(16)
            .build()
            .await
            .expect("Failed to build storage");

        let state = AppState {
            reader: handles.reader.clone(),
            analytics: AnalyticsEngine::new(Duration::from_secs(3600)),
            path,
            collector: None,
        };

        // Return handles AND dir to keep tempdir alive
        (state, handles, dir)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| panic!("non-JSON body: {}", String::from_utf8_lossy(&bytes)));
        (status, body)
    }

    #[tokio::test]
    async fn test_current_empty_store() {
        let (state, handles, _dir) = create_test_state(PathConfig::default()).await;
        let app = create_router(state, None);

        let (status, body) = get_json(app, "/api/current").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "sample": null,
                "analytics": { "extrema": null, "altitude_delta": "unavailable" }
            })
        );

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_current_with_samples() {
        let (state, handles, _dir) = create_test_state(PathConfig::default()).await;
        for (ts, alt) in [(0, 400.0), (3600, 410.0), (3601, 411.0)] {
            handles
                .writer
                .append(Sample::new(ts, 51.5, -0.1, alt, 27_600.0))
                .await
                .unwrap();
        }
        let app = create_router(state, None);

        let (status, body) = get_json(app.clone(), "/api/current").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sample"]["sequence_id"], json!(3));
        assert_eq!(body["sample"]["altitude"], json!(411.0));
        assert_eq!(body["analytics"]["altitude_delta"]["delta_km"], json!(11.0));
        assert_eq!(body["analytics"]["extrema"]["min_altitude"], json!(400.0));

        // Alias serves the same document
        let (_, alias) = get_json(app, "/api/realtime_data").await;
        assert_eq!(alias, body);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_path_window() {
        let (state, handles, _dir) = create_test_state(PathConfig::default()).await;
        let now = chrono::Utc::now().timestamp();
        for (offset, lat) in [(7200, 1.0), (100, 2.0), (10, 3.0)] {
            handles
                .writer
                .append(Sample::new(now - offset, lat, lat * 10.0, 410.0, 27_600.0))
                .await
                .unwrap();
        }
        let app = create_router(state, None);

        let (status, body) = get_json(app.clone(), "/api/path?window=1h").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["window_seconds"], json!(3600));
        assert_eq!(body["path"], json!([[2.0, 20.0], [3.0, 30.0]]));
        assert_eq!(body["timestamps"], json!([now - 100, now - 10]));
        assert_eq!(body["altitudes"], json!([410.0, 410.0]));

        let (_, body) = get_json(app.clone(), "/api/path?window_seconds=50").await;
        assert_eq!(body["path"].as_array().unwrap().len(), 1);

        // Default window (24h) covers everything
        let (_, body) = get_json(app, "/api/path_history").await;
        assert_eq!(body["window_seconds"], json!(86_400));
        assert_eq!(body["timestamps"].as_array().unwrap().len(), 3);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_path_invalid_window() {
        let config = PathConfig {
            max_window: Some(Duration::from_secs(48 * 3600)),
            ..Default::default()
        };
        let (state, handles, _dir) = create_test_state(config).await;
        let app = create_router(state, None);

        for uri in [
            "/api/path?window=soon",
            "/api/path?window_seconds=-5",
            "/api/path?window_seconds=0",
            "/api/path?window=3d",
            "/api/path?window=1h&window_seconds=60",
        ] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], json!("invalid_window"), "{uri}");
            assert!(body["message"].is_string(), "{uri}");
        }

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_failure_is_503() {
        let (state, handles, _dir) = create_test_state(PathConfig::default()).await;
        let app = create_router(state, None);

        // Closing the pool makes every read fail
        handles.reader.close().await;

        let (status, body) = get_json(app.clone(), "/api/current").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("storage_unavailable"));

        let (status, _) = get_json(app.clone(), "/api/path").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], json!("not_ready"));

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_probes() {
        let (state, handles, _dir) = create_test_state(PathConfig::default()).await;
        handles
            .writer
            .append(Sample::new(1, 0.0, 0.0, 400.0, 27_600.0))
            .await
            .unwrap();
        let app = create_router(state, None);

        let (status, body) = get_json(app.clone(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));

        let (status, body) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "db": "ready", "samples": 1 }));

        let (status, body) = get_json(app, "/api/collector").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("collector_not_running"));

        handles.shutdown().await.unwrap();
    }

    #[test]
    fn test_resolve_window_default_and_cap() {
        let config = PathConfig::default();
        let window = resolve_window(&PathQueryParams::default(), &config).unwrap();
        assert_eq!(window, Duration::from_secs(86_400));

        let params = PathQueryParams {
            window: Some("90m".to_string()),
            window_seconds: None,
        };
        assert_eq!(
            resolve_window(&params, &config).unwrap(),
            Duration::from_secs(5400)
        );

        // Uncapped by default
        let params = PathQueryParams {
            window: None,
            window_seconds: Some("31536000".to_string()),
        };
        assert!(resolve_window(&params, &config).is_ok());
    }
}
