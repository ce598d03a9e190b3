use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::calibration::TrackerSnapshot;
use crate::engine::{EngineHandle, TrackerInput};
use crate::error::{ErrorCode, ErrorKind, TrackerError};
use crate::telemetry::{self, TelemetrySnapshot};

use super::sse;

/// Handler state: the engine plus the expected token.
#[derive(Clone)]
pub struct DebugHttpState {
    pub handle: &'static EngineHandle,
    token: Arc<str>,
}

impl DebugHttpState {
    pub fn new(handle: &'static EngineHandle, token: String) -> Self {
        Self {
            handle,
            token: token.into(),
        }
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        presented == Some(&*self.token)
    }
}

/// Failure returned by a handler, rendered as `{"error", "code"}` JSON.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Tracker(TrackerError),
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        Self::Tracker(err)
    }
}

fn tracker_status(err: &TrackerError) -> StatusCode {
    if let TrackerError::EngineUnavailable { reason } = err {
        return if reason.contains("full") {
            StatusCode::TOO_MANY_REQUESTS
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
    }
    match err.kind() {
        ErrorKind::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::PreconditionViolation => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "missing or invalid token" }),
            ),
            Self::Tracker(err) => (
                tracker_status(&err),
                serde_json::json!({ "error": err.message(), "code": err.code() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub uptime_ms: u64,
    pub calibrated: bool,
    pub worker_running: bool,
    pub queued_inputs: usize,
    pub processed_inputs: u64,
}

#[derive(Debug, Serialize)]
pub struct TelemetryReport {
    pub snapshot: Option<TrackerSnapshot>,
    pub diagnostics: TelemetrySnapshot,
}

#[derive(Debug, Serialize)]
pub struct Queued {
    pub accepted: bool,
    pub input: &'static str,
}

/// Assemble the router; every route sits behind the token check.
pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route("/snapshot-stream", get(snapshot_stream))
        .route("/telemetry", get(telemetry_report))
        .route("/input", post(queue_input))
        .route("/reset", post(reset))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding debug listener on {addr}"))?;
    axum::serve(listener, build_router(state))
        .await
        .context("serving debug router")
}

/// Token from `?token=`, `x-debug-token` or a bearer `Authorization` header.
fn presented_token<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> Option<&'a str> {
    let from_query = uri.query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
    });
    let from_header = || {
        headers
            .get("x-debug-token")
            .and_then(|value| value.to_str().ok())
    };
    let from_bearer = || {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    };
    from_query.or_else(from_header).or_else(from_bearer)
}

async fn require_token(
    State(state): State<DebugHttpState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.accepts(presented_token(request.uri(), request.headers())) {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

async fn health(State(state): State<DebugHttpState>) -> Json<Health> {
    let handle = state.handle;
    Json(Health {
        status: "ok",
        uptime_ms: handle.uptime_ms(),
        calibrated: handle
            .snapshot()
            .map(|snapshot| snapshot.phase.is_calibrated())
            .unwrap_or(false),
        worker_running: handle.is_worker_running(),
        queued_inputs: handle.queued_inputs(),
        processed_inputs: handle.processed_inputs(),
    })
}

async fn snapshot(State(state): State<DebugHttpState>) -> Result<Json<TrackerSnapshot>, ApiError> {
    Ok(Json(state.handle.snapshot()?))
}

async fn snapshot_stream(State(state): State<DebugHttpState>) -> sse::SnapshotSse {
    sse::snapshot_events(state.handle)
}

async fn telemetry_report(State(state): State<DebugHttpState>) -> Json<TelemetryReport> {
    Json(TelemetryReport {
        snapshot: state.handle.snapshot().ok(),
        diagnostics: telemetry::hub().snapshot(),
    })
}

async fn queue_input(
    State(state): State<DebugHttpState>,
    Json(input): Json<TrackerInput>,
) -> Result<Json<Queued>, ApiError> {
    state.handle.try_submit(input)?;
    Ok(Json(Queued {
        accepted: true,
        input: input.label(),
    }))
}

async fn reset(State(state): State<DebugHttpState>) -> Result<Json<TrackerSnapshot>, ApiError> {
    Ok(Json(state.handle.reset()?))
}

#[cfg(all(test, feature = "debug_http"))]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::body::{to_bytes, Body};
    use once_cell::sync::Lazy;
    use serde_json::Value;
    use tower::ServiceExt;

    static ENGINE: Lazy<EngineHandle> =
        Lazy::new(|| EngineHandle::from_config(AppConfig::default()));
    const TOKEN: &str = "route-test";

    async fn call(request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let router = build_router(DebugHttpState::new(&ENGINE, TOKEN.to_string()));
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, json: &str) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let (status, body) = call(get("/snapshot")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing or invalid token");
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let (status, _) = call(get("/health?token=nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn header_tokens_are_accepted() {
        let bearer = axum::http::Request::get("/health")
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(bearer).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let custom = axum::http::Request::get("/health")
            .header("x-debug-token", TOKEN)
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(custom).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn snapshot_and_telemetry_render_json() {
        let (status, body) = call(get(&format!("/snapshot?token={TOKEN}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["session_steps"].is_u64());
        assert!(body["phase"].is_string());

        let (status, body) = call(get(&format!("/telemetry?token={TOKEN}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["diagnostics"]["recent"].is_array());
    }

    #[tokio::test]
    async fn input_is_queued() {
        let (status, body) = call(post(
            &format!("/input?token={TOKEN}"),
            r#"{"type":"steps","raw":12}"#,
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["input"], "step_sample");
    }

    #[tokio::test]
    async fn malformed_input_is_a_client_error() {
        let (status, _) = call(post(
            &format!("/input?token={TOKEN}"),
            r#"{"type":"teleport"}"#,
        ))
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn reset_returns_fresh_snapshot() {
        let (status, body) = call(post(&format!("/reset?token={TOKEN}"), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "uncalibrated");
    }

    #[test]
    fn tracker_errors_map_to_status_codes() {
        let full = TrackerError::EngineUnavailable {
            reason: "command queue full".to_string(),
        };
        let closed = TrackerError::EngineUnavailable {
            reason: "command queue closed".to_string(),
        };

        assert_eq!(tracker_status(&full), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(tracker_status(&closed), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            tracker_status(&TrackerError::NegativeStepCount { raw: -1 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            tracker_status(&TrackerError::NotCalibrated),
            StatusCode::CONFLICT
        );
        assert_eq!(
            tracker_status(&TrackerError::StatePoisoned),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
