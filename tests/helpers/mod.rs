//! Test helpers for driving the router without a socket.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use timelapse_control::api::{create_router, AppState};
use timelapse_control::session::{CaptureSession, SessionOptions};
use timelapse_control::settings::SettingsStore;
use timelapse_control::tools::{CaptureOptions, FrameCapture, VideoEncoder};
use timelapse_control::videos::VideoLibrary;
use timelapse_control::ToolError;

/// Camera that writes a placeholder JPEG and remembers what it shot.
#[derive(Default)]
pub struct RecordingCamera {
    pub shots: Mutex<Vec<PathBuf>>,
}

impl FrameCapture for RecordingCamera {
    fn capture(&self, output: &Path, _options: &CaptureOptions) -> Result<(), ToolError> {
        std::fs::write(output, b"jpeg").map_err(|source| ToolError::Spawn {
            program: "test-camera".into(),
            source,
        })?;
        self.shots.lock().push(output.to_path_buf());
        Ok(())
    }
}

/// Encoder that writes a placeholder video.
#[derive(Default)]
pub struct RecordingEncoder {
    pub calls: Mutex<Vec<u32>>,
}

impl VideoEncoder for RecordingEncoder {
    fn encode(&self, frame_rate: u32, _frames: &str, output: &Path) -> Result<(), ToolError> {
        std::fs::write(output, b"mp4").map_err(|source| ToolError::Spawn {
            program: "test-encoder".into(),
            source,
        })?;
        self.calls.lock().push(frame_rate);
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub session: CaptureSession,
    pub camera: Arc<RecordingCamera>,
    pub encoder: Arc<RecordingEncoder>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let camera = Arc::new(RecordingCamera::default());
        let encoder = Arc::new(RecordingEncoder::default());
        let session = CaptureSession::new(
            camera.clone(),
            encoder.clone(),
            SessionOptions {
                frames_dir: dir.path().join("frames"),
                videos_dir: dir.path().join("videos"),
                poll_interval: Duration::from_secs(1),
                capture: CaptureOptions::default(),
                show_progress: false,
            },
        );
        let state = AppState::new(
            SettingsStore::new(dir.path().join("config.json")),
            session.clone(),
            VideoLibrary::new(dir.path().join("videos")),
        );

        Self {
            router: create_router(state),
            session,
            camera,
            encoder,
            dir,
        }
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.dir.path().join("videos")
    }

    pub async fn request(&self, method: Method, uri: &str, json: Option<serde_json::Value>) -> Response<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match json {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}
