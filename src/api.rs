//! HTTP control surface
//!
//! JSON endpoints for settings, session control and the video library.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::error::SessionError;
use crate::session::{CaptureSession, SessionState};
use crate::settings::{Settings, SettingsStore};
use crate::videos::{VideoInfo, VideoLibrary};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub session: CaptureSession,
    pub videos: Arc<VideoLibrary>,
}

impl AppState {
    pub fn new(settings: SettingsStore, session: CaptureSession, videos: VideoLibrary) -> Self {
        Self {
            settings: Arc::new(settings),
            session,
            videos: Arc::new(videos),
        }
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/settings", get(get_settings).put(set_settings).delete(reset_settings))
        .route("/api/session/start", post(start_session))
        .route("/api/session/stop", post(stop_session))
        .route("/api/videos", get(list_videos))
        .route("/api/videos/{name}", get(download_video).delete(delete_video))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Error Types
// ============================================================================

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use serde_json::json;

        let (status, code) = match &self.0 {
            SessionError::InvalidConfiguration(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_CONFIGURATION")
            }
            SessionError::AlreadyRunning => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
            SessionError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            err => {
                tracing::error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        (
            status,
            Json(json!({ "error": code, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub settings: Settings,
    pub session: SessionState,
}

/// Settings form; every field is required.
#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    pub interval: u32,
    pub capture_duration: u32,
    #[serde(default)]
    pub start_date: Option<String>,
    pub start_time: String,
    pub video_duration: u32,
}

impl From<SettingsForm> for Settings {
    fn from(form: SettingsForm) -> Self {
        Self {
            interval: form.interval,
            capture_duration: form.capture_duration,
            start_date: form.start_date.filter(|d| !d.trim().is_empty()),
            start_time: form.start_time,
            video_duration: form.video_duration,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        settings: state.settings.load()?,
        session: state.session.current_state(),
    }))
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    Ok(Json(state.settings.load()?))
}

async fn set_settings(
    State(state): State<AppState>,
    form: Result<Json<SettingsForm>, JsonRejection>,
) -> ApiResult<Json<Settings>> {
    // Missing fields and negative numbers are configuration errors too.
    let Json(form) =
        form.map_err(|rejection| SessionError::InvalidConfiguration(rejection.body_text()))?;
    let settings = Settings::from(form);
    settings.validate()?;
    state.settings.save(&settings)?;
    Ok(Json(settings))
}

async fn reset_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    state.settings.reset()?;
    Ok(Json(state.settings.load()?))
}

async fn start_session(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<SessionState>)> {
    let settings = state.settings.load()?;
    let session = state.session.start(&settings)?;
    Ok((StatusCode::ACCEPTED, Json(session)))
}

async fn stop_session(State(state): State<AppState>) -> Json<SessionState> {
    state.session.stop();
    Json(state.session.current_state())
}

async fn list_videos(State(state): State<AppState>) -> ApiResult<Json<Vec<VideoInfo>>> {
    Ok(Json(state.videos.list().await?))
}

async fn download_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let (file, len) = state.videos.open(&name).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

async fn delete_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.videos.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
