//! Router-level tests. Every answer comes from the deterministic fallbacks:
//! either the ML stack is switched off, or it is on but the model cache is
//! empty.

use std::io::Cursor;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use deepfake_ml_service::api::{self, AppState};
use deepfake_ml_service::config::AppConfig;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app() -> Router {
    api::app(AppState::new(AppConfig::default()))
}

/// ML stack on, pointed at an empty model cache.
fn app_with_empty_model_cache(cache: &tempfile::TempDir) -> Router {
    api::app(AppState::new(AppConfig {
        use_ml: true,
        model_cache_dir: Some(cache.path().to_path_buf()),
        ..AppConfig::default()
    }))
}

async fn send(req: Request<Body>) -> (StatusCode, Value) {
    send_to(app(), req).await
}

async fn send_to(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_post(field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "deepfake-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict-image")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// A small PNG padded (after IEND, which decoders ignore) to the wanted parity.
fn png_with_parity(even: bool) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([200, 30, 30])))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    let mut bytes = out.into_inner();
    if (bytes.len() % 2 == 0) != even {
        bytes.push(0);
    }
    bytes
}

fn assert_prediction(body: &Value, label: &str, confidence: f64) {
    assert_eq!(body["label"], label, "{body}");
    let got = body["confidence"].as_f64().unwrap();
    assert!((got - confidence).abs() < 1e-6, "{body}");
}

// ---------------------------------------------------------------------------
// Service info
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "OK" }));
}

#[tokio::test]
async fn root_describes_the_service() {
    let req = Request::get("/").body(Body::empty()).unwrap();
    let (status, body) = send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["service"], "Deepfake ML Service");
    assert_eq!(body["hint"], "Use /health, /predict-text, or /predict-image");
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blank_text_is_unknown() {
    for text in ["", "    "] {
        let (status, body) = send(json_post("/predict-text", json!({ "text": text }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_prediction(&body, "Unknown", 0.0);
    }
}

#[tokio::test]
async fn sensational_text_is_fake() {
    let (_, body) = send(json_post(
        "/predict-text",
        json!({ "text": "BREAKING: shocking news" }),
    ))
    .await;
    assert_prediction(&body, "Fake", 0.6);
}

#[tokio::test]
async fn plain_text_is_real() {
    let (_, body) = send(json_post(
        "/predict-text",
        json!({ "text": "The weather is nice today" }),
    ))
    .await;
    assert_prediction(&body, "Real", 0.6);
}

#[tokio::test]
async fn text_request_without_text_field_is_rejected() {
    let (status, _) = send(json_post("/predict-text", json!({ "body": "hi" }))).await;
    assert!(status.is_client_error());
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

#[tokio::test]
async fn undecodable_upload_is_unknown() {
    let (status, body) = send(multipart_post("file", "notes.txt", b"plain text, not pixels")).await;
    assert_eq!(status, StatusCode::OK);
    assert_prediction(&body, "Unknown", 0.0);
}

#[tokio::test]
async fn odd_length_image_is_real() {
    let (_, body) = send(multipart_post("file", "odd.png", &png_with_parity(false))).await;
    assert_prediction(&body, "Real", 0.65);
}

#[tokio::test]
async fn even_length_image_is_fake() {
    let (_, body) = send(multipart_post("file", "even.png", &png_with_parity(true))).await;
    assert_prediction(&body, "Fake", 0.55);
}

#[tokio::test]
async fn first_file_field_is_used_when_not_named_file() {
    let (_, body) = send(multipart_post("upload", "even.png", &png_with_parity(true))).await;
    assert_prediction(&body, "Fake", 0.55);
}

#[tokio::test]
async fn base64_json_upload_is_accepted() {
    let encoded = STANDARD.encode(png_with_parity(false));
    let (status, body) = send(json_post(
        "/predict-image",
        json!({ "data_base64": format!("data:image/png;base64,{encoded}") }),
    ))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_prediction(&body, "Real", 0.65);
}

#[tokio::test]
async fn image_request_without_payload_is_rejected() {
    let (status, _) = send(json_post("/predict-image", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// ML stack enabled, no models available
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_text_models_fall_through_to_keywords() {
    let cache = tempfile::tempdir().unwrap();
    let (_, body) = send_to(
        app_with_empty_model_cache(&cache),
        json_post("/predict-text", json!({ "text": "BREAKING: shocking news" })),
    )
    .await;
    assert_prediction(&body, "Fake", 0.6);

    let (_, body) = send_to(
        app_with_empty_model_cache(&cache),
        json_post("/predict-text", json!({ "text": "The weather is nice today" })),
    )
    .await;
    assert_prediction(&body, "Real", 0.6);
}

#[tokio::test]
async fn missing_image_model_falls_back_to_parity() {
    let cache = tempfile::tempdir().unwrap();
    let (_, body) = send_to(
        app_with_empty_model_cache(&cache),
        multipart_post("file", "odd.png", &png_with_parity(false)),
    )
    .await;
    assert_prediction(&body, "Real", 0.65);

    let (_, body) = send_to(
        app_with_empty_model_cache(&cache),
        multipart_post("file", "even.png", &png_with_parity(true)),
    )
    .await;
    assert_prediction(&body, "Fake", 0.55);
}
