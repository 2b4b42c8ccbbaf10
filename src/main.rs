use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use timelapse_control::api::{self, AppState};
use timelapse_control::config::Config;
use timelapse_control::session::{self, CaptureSession};
use timelapse_control::settings::SettingsStore;
use timelapse_control::tools::{Ffmpeg, Fswebcam};
use timelapse_control::videos::VideoLibrary;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timelapse_control=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(version = env!("CARGO_PKG_VERSION"), ?config, "Starting timelapse control");

    std::fs::create_dir_all(&config.frames_dir)
        .with_context(|| format!("Failed to create {}", config.frames_dir.display()))?;
    let stale = session::purge_stale_frames(&config.frames_dir)
        .with_context(|| format!("Failed to clean {}", config.frames_dir.display()))?;
    if stale > 0 {
        info!(stale, "Purged frames left by a previous run");
    }
    std::fs::create_dir_all(&config.videos_dir)
        .with_context(|| format!("Failed to create {}", config.videos_dir.display()))?;

    // Set up Ctrl+C handler
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        on_signal.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let session = CaptureSession::new(
        Arc::new(Fswebcam::new(&config.capture_program)),
        Arc::new(Ffmpeg::new(&config.encoder_program)),
        config.session_options(),
    );
    let state = AppState::new(
        SettingsStore::new(&config.settings_file),
        session.clone(),
        VideoLibrary::new(&config.videos_dir),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!(address = %config.bind_address, "Server listening");

    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    if let Some(outcome) = session.shutdown().await {
        info!(?outcome, "Capture session ended during shutdown");
    }
    info!("Shutdown complete");

    Ok(())
}
