//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use crate::bot::{self, AppState};
use crate::security::{verify_line_signature, SecurityError, SIGNATURE_HEADER};
use crate::webhook::WebhookBody;

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/", get(status))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/webhook", post(webhook))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// Service status
#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    model_ready: bool,
    model_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_error: Option<String>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        model_ready: state.model.is_ready(),
        model_path: state.model.weights_path().display().to_string(),
        model_error: state.model.unavailable_reason().map(str::to_string),
    })
}

/// LINE webhook receiver
///
/// The body is taken raw so the signature is checked over the exact bytes
/// LINE signed.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, AppError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("webhook", %request_id);

    async move {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());
        verify_line_signature(&state.config.line.channel_secret, &body, signature).map_err(|e| {
            metrics::counter!("chillibot_webhook_rejected_total", "reason" => "signature").increment(1);
            warn!(error = %e, "Rejected webhook");
            AppError::from(e)
        })?;

        let payload: WebhookBody = serde_json::from_slice(&body).map_err(|e| {
            metrics::counter!("chillibot_webhook_rejected_total", "reason" => "body").increment(1);
            AppError::from(e)
        })?;

        info!(events = payload.events.len(), "Webhook received");
        bot::dispatch(&state, payload.events).await;
        Ok::<_, AppError>("OK")
    }
    .instrument(span)
    .await
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    InvalidSignature,
    InvalidRequest(String),
}

impl From<SecurityError> for AppError {
    fn from(_: SecurityError) -> Self {
        AppError::InvalidSignature
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidSignature => (StatusCode::BAD_REQUEST, "Invalid signature".to_string()),
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", msg)),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
