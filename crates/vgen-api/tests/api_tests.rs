//! API integration tests.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use vgen_api::{create_router, ApiConfig, AppState};

struct TestApp {
    router: Router,
    output_dir: PathBuf,
    _dir: TempDir,
}

async fn test_app(configure: impl FnOnce(&mut ApiConfig, &Path)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let output_dir = dir.path().join("videos");
    let mut config = ApiConfig {
        output_dir: output_dir.clone(),
        font_file: None,
        ffmpeg_bin: "vgen-test-missing-ffmpeg".to_string(),
        ffprobe_bin: "vgen-test-missing-ffprobe".to_string(),
        ..ApiConfig::default()
    };
    configure(&mut config, dir.path());

    let state = AppState::new(config).await.unwrap();
    TestApp {
        router: create_router(state, None),
        output_dir,
        _dir: dir,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn post_json(router: &Router, uri: &str, body: String) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Write an executable stand-in for ffmpeg.
#[cfg(unix)]
fn fake_ffmpeg(dir: &Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\nfor last; do :; done\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn test_root_endpoint() {
    let app = test_app(|_, _| {}).await;
    let (status, _, body) = get(&app.router, "/").await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["msg"], "Working properly");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(|_, _| {}).await;
    let (status, headers, body) = get(&app.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");

    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["cross-origin-resource-policy"], "cross-origin");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_ready_reports_missing_tools() {
    let app = test_app(|_, _| {}).await;
    let (status, _, body) = get(&app.router, "/ready").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["output_dir"]["status"], "ok");
    assert_eq!(body["checks"]["ffmpeg"]["status"], "error");
}

#[tokio::test]
async fn test_metrics_not_mounted_when_disabled() {
    let app = test_app(|_, _| {}).await;
    let (status, _, _) = get(&app.router, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duration_over_limit_is_rejected() {
    let app = test_app(|_, _| {}).await;
    let request = json!({"width": 1920, "height": 1080, "duration": 301, "format": "mp4"});

    let (status, body) = post_json(&app.router, "/api/generate-video", request.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["error"], "Invalid request");
    assert!(body["details"].as_str().unwrap().contains("301"));
    assert_eq!(file_count(&app.output_dir), 0);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = test_app(|_, _| {}).await;

    let (status, body) = post_json(&app.router, "/api/generate-video", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "payload");

    let request = json!({"width": "wide", "height": 360, "duration": 5});
    let (status, _) = post_json(&app.router, "/api/generate-video", request.to_string()).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_unsupported_format_is_rejected() {
    let app = test_app(|_, _| {}).await;
    let request = json!({"width": 640, "height": 360, "duration": 5, "format": "gif"});

    let (status, body) = post_json(&app.router, "/api/generate-video", request.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_unwritable_output_dir_is_environment_failure() {
    let app = test_app(|_, _| {}).await;
    std::fs::remove_dir(&app.output_dir).unwrap();

    let request = json!({"width": 640, "height": 360, "duration": 5, "format": "mp4"});
    let (status, body) = post_json(&app.router, "/api/generate-video", request.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "environment");
    assert_eq!(body["error"], "Server configuration error");
    assert!(!app.output_dir.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_generate_and_serve_video() {
    let app = test_app(|config, dir| {
        config.ffmpeg_bin = fake_ffmpeg(dir, "echo 'encoding' >&2\nprintf 'fake video' > \"$last\"");
    })
    .await;

    // Numbers as strings, the way HTML forms post them
    let request = json!({
        "width": "640",
        "height": "360",
        "duration": "5",
        "format": "mp4",
        "audioEnabled": "true"
    });
    let (status, body) = post_json(&app.router, "/api/generate-video", request.to_string()).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    let url = body["videoUrl"].as_str().unwrap();
    assert!(url.starts_with("/videos/video_640x360_d5s_"));
    assert!(url.ends_with(".mp4"));
    assert_eq!(body["sizeBytes"], 10);
    assert!(body["expiresAt"].as_str().unwrap().ends_with('Z'));
    assert_eq!(format!("/videos/{}", body["fileName"].as_str().unwrap()), url);

    let (status, _, video) = get(&app.router, url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(video, b"fake video");
}

#[cfg(unix)]
#[tokio::test]
async fn test_encoder_failure_returns_logs() {
    let app = test_app(|config, dir| {
        config.ffmpeg_bin = fake_ffmpeg(dir, "echo 'Unknown encoder' >&2\nprintf 'partial' > \"$last\"\nexit 1");
    })
    .await;

    let request = json!({"width": 640, "height": 360, "duration": 5, "format": "webm"});
    let (status, body) = post_json(&app.router, "/api/generate-video", request.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "encode");
    assert_eq!(body["error"], "Error generating video");
    assert!(body["logs"].as_str().unwrap().contains("Unknown encoder"));
    // Partial output is removed
    assert_eq!(file_count(&app.output_dir), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_render_timeout_maps_to_gateway_timeout() {
    let app = test_app(|config, dir| {
        config.ffmpeg_bin = fake_ffmpeg(dir, "exec sleep 30");
        config.render_timeout = Some(std::time::Duration::from_millis(200));
    })
    .await;

    let request = json!({"width": 640, "height": 360, "duration": 5});
    let (status, body) = post_json(&app.router, "/api/generate-video", request.to_string()).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["kind"], "timeout");
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_real_encoder_round_trip() {
    if vgen_media::resolve_binary("ffmpeg").is_err() || vgen_media::resolve_binary("ffprobe").is_err() {
        return;
    }
    let app = test_app(|config, _| {
        config.ffmpeg_bin = "ffmpeg".to_string();
        config.ffprobe_bin = "ffprobe".to_string();
    })
    .await;

    let request = json!({"width": 640, "height": 360, "duration": 5, "format": "mp4", "audioEnabled": true});
    let (status, body) = post_json(&app.router, "/api/generate-video", request.to_string()).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert!(body["sizeBytes"].as_u64().unwrap() > 0);

    let (status, _, _) = get(&app.router, "/ready").await;
    assert_eq!(status, StatusCode::OK);
}
