//! Webhook Integration Tests
//!
//! Drives the router in-process; a local axum server stands in for the
//! LINE Messaging and content APIs.

use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use candle_core::{DType, Device, Tensor};
use chillibot_core::CHILLI_CATALOG;
use chillibot_server::security::sign_body;
use chillibot_server::{create_router, AppState, BotConfig};
use chillibot_vision::{ArchitectureConfig, ModelConfig, ModelHandle, ModelProvisioner, ModelSource};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "test-channel-secret";

#[derive(Clone, Default)]
struct MockLine {
    replies: Arc<Mutex<Vec<Value>>>,
    content_hits: Arc<AtomicUsize>,
    image: Arc<Vec<u8>>,
}

impl MockLine {
    fn replies(&self) -> Vec<Value> {
        self.replies.lock().unwrap().clone()
    }
}

async fn record_reply(State(mock): State<MockLine>, Json(body): Json<Value>) -> Response {
    let fail = body["replyToken"] == "fail";
    mock.replies.lock().unwrap().push(body);
    if fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    Json(json!({})).into_response()
}

async fn message_content(State(mock): State<MockLine>, UrlPath(id): UrlPath<String>) -> Response {
    mock.content_hits.fetch_add(1, Ordering::SeqCst);
    if id != "img1" {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(header::CONTENT_TYPE, "image/png")],
        mock.image.as_ref().clone(),
    )
        .into_response()
}

async fn spawn_mock_line() -> (String, MockLine) {
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(224, 224, Rgb([0, 0, 255])))
        .write_to(&mut png, ImageFormat::Png)
        .unwrap();
    let mock = MockLine {
        image: Arc::new(png.into_inner()),
        ..Default::default()
    };

    let app = Router::new()
        .route("/v2/bot/message/reply", post(record_reply))
        .route("/v2/bot/message/:id/content", get(message_content))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), mock)
}

/// Head-only weights mapping a blue image to class 3
async fn ready_model(dir: &Path) -> ModelHandle {
    let device = Device::Cpu;
    let num_classes = CHILLI_CATALOG.len();
    let mut weight = vec![0f32; num_classes * 3];
    weight[3 * 3 + 2] = 10.0;

    let mut tensors = HashMap::new();
    tensors.insert(
        "classifier.weight".to_string(),
        Tensor::from_vec(weight, (num_classes, 3), &device).unwrap(),
    );
    tensors.insert(
        "classifier.bias".to_string(),
        Tensor::zeros(num_classes, DType::F32, &device).unwrap(),
    );
    let path = dir.join("head.safetensors");
    candle_core::safetensors::save(&tensors, &path).unwrap();

    let config = ModelConfig::from_local(path).with_architecture(ArchitectureConfig {
        conv_channels: vec![],
        ..Default::default()
    });
    let handle = ModelProvisioner::new(config).unwrap().ensure_available().await;
    assert!(handle.is_ready(), "{:?}", handle);
    handle
}

struct Harness {
    app: Router,
    mock: MockLine,
    dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let model = ready_model(dir.path()).await;
        Self::with_model(dir, model).await
    }

    async fn with_model(dir: TempDir, model: ModelHandle) -> Self {
        let (line_url, mock) = spawn_mock_line().await;

        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(static_dir.join("catalog")).unwrap();
        std::fs::write(static_dir.join("catalog/bacterial_spot.jpg"), b"jpeg").unwrap();

        let mut config = BotConfig::default();
        config.line.channel_secret = SECRET.to_string();
        config.line.access_token = "token".to_string();
        config.line.api_base = line_url.clone();
        config.line.data_api_base = line_url;
        config.server.public_base_url = Some("https://bot.example.com".to_string());
        config.server.static_dir = static_dir;
        config.staging_dir = dir.path().join("staging");

        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let state = AppState::new(config, model, metrics_handle).unwrap();

        Self {
            app: create_router(state),
            mock,
            dir,
        }
    }

    fn staging_entries(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("staging")).unwrap().count()
    }

    async fn post_webhook(&self, body: &Value) -> (StatusCode, Value) {
        let bytes = serde_json::to_vec(body).unwrap();
        let signature = sign_body(SECRET, &bytes).unwrap();
        self.send(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .header("x-line-signature", signature)
                .body(Body::from(bytes))
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }
}

fn text_event(token: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "replyToken": token,
        "source": {"type": "user", "userId": "U1"},
        "message": {"type": "text", "id": "t1", "text": text}
    })
}

fn image_event(token: &str, id: &str) -> Value {
    json!({
        "type": "message",
        "replyToken": token,
        "source": {"type": "user", "userId": "U1"},
        "message": {"type": "image", "id": id, "contentProvider": {"type": "line"}}
    })
}

fn webhook(events: Vec<Value>) -> Value {
    json!({"destination": "Ubot", "events": events})
}

#[tokio::test]
async fn test_bad_signature_rejected() {
    let harness = Harness::new().await;
    let body = serde_json::to_vec(&webhook(vec![text_event("r1", "hello")])).unwrap();

    for signature in [Some(sign_body("wrong-secret", &body).unwrap()), Some("garbage".to_string()), None] {
        let mut request = Request::builder().method("POST").uri("/webhook");
        if let Some(signature) = signature {
            request = request.header("x-line-signature", signature);
        }
        let (status, value) = harness
            .send(request.body(Body::from(body.clone())).unwrap())
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value, json!({"error": "Invalid signature"}));
    }
    assert!(harness.mock.replies().is_empty());
}

#[tokio::test]
async fn test_empty_event_list_accepted() {
    let harness = Harness::new().await;

    let (status, value) = harness.post_webhook(&webhook(vec![])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, Value::String("OK".to_string()));
    assert!(harness.mock.replies().is_empty());
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let harness = Harness::new().await;

    let (status, value) = harness.post_webhook(&json!({"events": "nope"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_text_message_replies() {
    let harness = Harness::new().await;

    let (status, _) = harness
        .post_webhook(&webhook(vec![text_event("r1", "Hello"), text_event("r2", "พริก")]))
        .await;
    assert_eq!(status, StatusCode::OK);

    let mut replies = harness.mock.replies();
    replies.sort_by_key(|r| r["replyToken"].as_str().unwrap().to_string());
    assert_eq!(replies.len(), 2);

    assert_eq!(replies[0]["replyToken"], "r1");
    assert_eq!(replies[0]["messages"].as_array().unwrap().len(), 1);
    assert!(replies[0]["messages"][0]["text"].as_str().unwrap().starts_with("Hi there"));

    assert_eq!(replies[1]["messages"][0], json!({"type": "text", "text": "You said: พริก"}));
}

#[tokio::test]
async fn test_image_message_is_diagnosed() {
    let harness = Harness::new().await;

    let (status, _) = harness.post_webhook(&webhook(vec![image_event("r1", "img1")])).await;
    assert_eq!(status, StatusCode::OK);

    let replies = harness.mock.replies();
    assert_eq!(replies.len(), 1);
    let messages = replies[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);

    let summary = messages[0]["text"].as_str().unwrap();
    assert!(summary.contains(CHILLI_CATALOG[3].name), "{}", summary);
    assert!(summary.contains("Confidence:"));
    assert!(messages[1]["text"].as_str().unwrap().contains(CHILLI_CATALOG[3].advice));
    assert_eq!(
        messages[2]["originalContentUrl"],
        "https://bot.example.com/static/catalog/bacterial_spot.jpg"
    );

    assert_eq!(harness.mock.content_hits.load(Ordering::SeqCst), 1);
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn test_image_download_failure_replies_with_advice() {
    let harness = Harness::new().await;

    let (status, _) = harness.post_webhook(&webhook(vec![image_event("r1", "gone")])).await;
    assert_eq!(status, StatusCode::OK);

    let replies = harness.mock.replies();
    let messages = replies[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0]["text"].as_str().unwrap().contains("clearer"));
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn test_image_with_unavailable_model() {
    let dir = tempfile::tempdir().unwrap();
    let model = ModelHandle::not_ready("download failed", dir.path().join("m.safetensors"), ModelSource::Local);
    let harness = Harness::with_model(dir, model).await;

    let (status, _) = harness.post_webhook(&webhook(vec![image_event("r1", "img1")])).await;
    assert_eq!(status, StatusCode::OK);

    let replies = harness.mock.replies();
    assert!(replies[0]["messages"][0]["text"].as_str().unwrap().contains("operator"));
    assert_eq!(harness.mock.content_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reply_failure_does_not_fail_webhook() {
    let harness = Harness::new().await;

    let (status, _) = harness
        .post_webhook(&webhook(vec![
            text_event("fail", "hello"),
            json!({"type": "follow", "replyToken": "r9"}),
            json!({"type": "message", "replyToken": "r8", "message": {"type": "sticker", "id": "s1"}}),
        ]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.mock.replies().len(), 1);
}

#[tokio::test]
async fn test_events_without_reply_token_are_skipped() {
    let harness = Harness::new().await;

    let (status, _) = harness
        .post_webhook(&webhook(vec![
            json!({
                "type": "message",
                "mode": "standby",
                "source": {"type": "group", "groupId": "G1"},
                "message": {"type": "text", "id": "t2", "text": "hello"}
            }),
            json!({
                "type": "message",
                "mode": "standby",
                "source": {"type": "group", "groupId": "G1"},
                "message": {"type": "image", "id": "img1", "contentProvider": {"type": "line"}}
            }),
            text_event("r1", "hello"),
        ]))
        .await;

    assert_eq!(status, StatusCode::OK);
    let replies = harness.mock.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["replyToken"], "r1");
    assert_eq!(harness.mock.content_hits.load(Ordering::SeqCst), 0);
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn test_status_and_health() {
    let harness = Harness::new().await;

    let (status, value) = harness
        .send(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "running");
    assert_eq!(value["model_ready"], true);
    assert!(value["model_path"].as_str().unwrap().ends_with("head.safetensors"));

    let (status, value) = harness
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, Value::String("OK".to_string()));
}

#[tokio::test]
async fn test_static_catalog_assets_served() {
    let harness = Harness::new().await;

    let (status, _) = harness
        .send(
            Request::builder()
                .uri("/static/catalog/bacterial_spot.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness
        .send(Request::builder().uri("/static/missing.jpg").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
