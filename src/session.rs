//! The capture session: one process-wide state machine plus the background
//! job that waits, captures frames and renders the video.
//!
//! ```text
//! Idle --start()--> Waiting --start instant--> Recording --done--> Idle
//!                      |                           |
//!                      +---------stop()------------+----> Idle
//! ```
//!
//! `stop()` flips the state to `Idle` right away and cancels the job; the
//! job notices at its next checkpoint (before a capture, or during any sleep)
//! and unwinds. An external tool that is already running is never killed.

use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Result, SessionError};
use crate::schedule::{self, Schedule};
use crate::settings::Settings;
use crate::tools::{CaptureOptions, FrameCapture, VideoEncoder};

/// Snapshot of the session, as reported to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Waiting {
        start: DateTime<Local>,
        end: DateTime<Local>,
    },
    Recording {
        start: DateTime<Local>,
        end: DateTime<Local>,
        next_frame: u32,
        total_frames: u32,
    },
}

impl SessionState {
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// How a finished job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { frames: u32, video: PathBuf },
    /// Stopped before finishing; frames are discarded, no video is rendered.
    Cancelled { frames: u32 },
    /// Every capture failed, so there was nothing to encode.
    NothingCaptured,
    EncodeFailed { frames: u32 },
}

/// Where a session keeps its files and how it talks to the camera.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Each session creates (and always removes) its own sub-directory here.
    pub frames_dir: PathBuf,
    pub videos_dir: PathBuf,
    /// Granularity of the wait phase.
    pub poll_interval: Duration,
    pub capture: CaptureOptions,
    pub show_progress: bool,
}

/// Handle to the single capture session. Cheap to clone.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<Inner>,
}

struct Inner {
    slot: Mutex<Slot>,
    camera: Arc<dyn FrameCapture>,
    encoder: Arc<dyn VideoEncoder>,
    options: SessionOptions,
}

#[derive(Default)]
struct Slot {
    state: SessionState,
    active: Option<Active>,
    task: Option<JoinHandle<SessionOutcome>>,
    next_id: u64,
}

struct Active {
    id: u64,
    cancel: CancellationToken,
}

/// Everything the background job needs, fixed at `start()`.
struct Job {
    id: u64,
    schedule: Schedule,
    frame_rate: u32,
    cancel: CancellationToken,
    frames_dir: PathBuf,
}

impl CaptureSession {
    pub fn new(
        camera: Arc<dyn FrameCapture>,
        encoder: Arc<dyn VideoEncoder>,
        options: SessionOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::default()),
                camera,
                encoder,
                options,
            }),
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.inner.slot.lock().state.clone()
    }

    /// Start a session from a settings snapshot and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, settings: &Settings) -> Result<SessionState> {
        let mut slot = self.inner.slot.lock();
        if !slot.state.is_idle() {
            return Err(SessionError::AlreadyRunning);
        }

        settings.validate()?;
        let frame_rate = settings.frame_rate()?;
        let schedule = settings.schedule(Local::now().date_naive())?;

        slot.next_id += 1;
        let id = slot.next_id;
        let cancel = CancellationToken::new();
        let frames_dir = self
            .inner
            .options
            .frames_dir
            .join(format!("{}-{id}", schedule::stamp(&schedule.start)));

        slot.state = SessionState::Waiting {
            start: schedule.start,
            end: schedule.end,
        };
        slot.active = Some(Active {
            id,
            cancel: cancel.clone(),
        });

        info!(
            session = id,
            start = %schedule.start,
            end = %schedule.end,
            interval_secs = schedule.interval.num_seconds(),
            frames = schedule.frame_count(),
            frame_rate,
            "Capture session scheduled"
        );

        let job = Job {
            id,
            schedule,
            frame_rate,
            cancel,
            frames_dir,
        };
        slot.task = Some(tokio::spawn(run(Arc::clone(&self.inner), job)));

        Ok(slot.state.clone())
    }

    /// Request cancellation. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        slot.state = SessionState::Idle;
        match slot.active.take() {
            Some(active) => {
                active.cancel.cancel();
                info!(session = active.id, "Capture session stop requested");
                true
            }
            None => false,
        }
    }

    /// Wait for the most recently started job to unwind completely.
    pub async fn join(&self) -> Option<SessionOutcome> {
        let task = self.inner.slot.lock().task.take()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(error = %e, "Capture job panicked");
                None
            }
        }
    }

    /// Stop any running session and wait until its frames are gone.
    pub async fn shutdown(&self) -> Option<SessionOutcome> {
        self.stop();
        self.join().await
    }
}

impl Inner {
    /// Replace the state, unless the job has been stopped or superseded.
    fn publish(&self, id: u64, state: SessionState) {
        let mut slot = self.slot.lock();
        if slot.active.as_ref().is_some_and(|a| a.id == id) {
            slot.state = state;
        }
    }

    fn release(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.active.as_ref().is_some_and(|a| a.id == id) {
            slot.active = None;
            slot.state = SessionState::Idle;
        }
    }
}

/// Removes the frame directory and releases the state on every exit path,
/// including a panic inside the job.
struct SessionGuard<'a> {
    inner: &'a Inner,
    id: u64,
    frames_dir: &'a Path,
    purged: bool,
}

impl SessionGuard<'_> {
    async fn purge(&mut self) {
        let result = tokio::fs::remove_dir_all(self.frames_dir).await;
        self.report(result);
        self.purged = true;
    }

    fn report(&self, result: std::io::Result<()>) {
        match result {
            Ok(()) => info!(session = self.id, dir = %self.frames_dir.display(), "Frames purged"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => error!(
                session = self.id,
                dir = %self.frames_dir.display(),
                error = %e,
                "Failed to purge frames"
            ),
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // Only reached unpurged when the job panicked; blocking here is the
        // last chance to remove the frames.
        if !self.purged {
            self.report(std::fs::remove_dir_all(self.frames_dir));
        }
        self.inner.release(self.id);
    }
}

/// Remove frame directories left behind by a previous process.
///
/// Call before the first session starts; returns how many were removed.
pub fn purge_stale_frames(frames_dir: &Path) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(frames_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
            warn!(dir = %entry.path().display(), "Removed stale frame directory");
            removed += 1;
        }
    }
    Ok(removed)
}

async fn run(inner: Arc<Inner>, job: Job) -> SessionOutcome {
    let progress = spinner(inner.options.show_progress);

    let outcome = {
        let mut guard = SessionGuard {
            inner: &inner,
            id: job.id,
            frames_dir: &job.frames_dir,
            purged: false,
        };
        let outcome = drive(&inner, &job, &progress).await;
        guard.purge().await;
        outcome
    };

    match &outcome {
        SessionOutcome::Completed { frames, video } => {
            info!(session = job.id, frames, video = %video.display(), "Capture session finished");
            progress.finish_with_message(format!("Finished! {frames} frames -> {}", video.display()));
        }
        SessionOutcome::Cancelled { frames } => {
            info!(session = job.id, frames, "Capture session cancelled");
            progress.finish_with_message(format!("Cancelled after {frames} frames"));
        }
        SessionOutcome::NothingCaptured => {
            warn!(session = job.id, "Capture session produced no frames");
            progress.finish_with_message("No frames captured");
        }
        SessionOutcome::EncodeFailed { frames } => {
            warn!(session = job.id, frames, "Capture session ended without a video");
            progress.finish_with_message("Encoding failed");
        }
    }
    outcome
}

async fn drive(inner: &Inner, job: &Job, progress: &ProgressBar) -> SessionOutcome {
    if !wait_for_start(job, inner.options.poll_interval, progress).await {
        return SessionOutcome::Cancelled { frames: 0 };
    }

    let Recorded { frames, complete } = match record(inner, job, progress).await {
        Ok(recorded) => recorded,
        Err(e) => {
            error!(session = job.id, error = %e, "Could not prepare frame directory");
            return SessionOutcome::NothingCaptured;
        }
    };

    // A stop during the pause after the last frame still renders the video.
    if !complete {
        return SessionOutcome::Cancelled { frames };
    }
    if frames == 0 {
        return SessionOutcome::NothingCaptured;
    }

    progress.set_message(format!("Encoding {frames} frames at {} fps", job.frame_rate));
    match encode(inner, job).await {
        Ok(video) => SessionOutcome::Completed { frames, video },
        Err(e) => {
            error!(session = job.id, error = %e, "Video encoding failed");
            SessionOutcome::EncodeFailed { frames }
        }
    }
}

/// Returns `false` if cancelled before the start instant.
async fn wait_for_start(job: &Job, poll: Duration, progress: &ProgressBar) -> bool {
    let delay = (job.schedule.start - Local::now())
        .to_std()
        .unwrap_or_default();
    let deadline = Instant::now() + delay;

    loop {
        if job.cancel.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        progress.set_message(format!("Waiting, recording starts in {}s", remaining.as_secs()));
        if !sleep_unless_cancelled(remaining.min(poll), &job.cancel).await {
            return false;
        }
    }
}

/// Result of the recording phase.
struct Recorded {
    /// Frames actually written
    frames: u32,
    /// Every scheduled instant was attempted
    complete: bool,
}

/// Capture one frame per scheduled instant. A failed capture leaves a gap
/// and the loop goes on.
async fn record(inner: &Inner, job: &Job, progress: &ProgressBar) -> Result<Recorded> {
    let Schedule {
        start,
        end,
        interval,
    } = job.schedule;
    let total_frames = job.schedule.frame_count();
    let pause = interval.to_std().unwrap_or_default();

    tokio::fs::create_dir_all(&job.frames_dir).await?;
    info!(session = job.id, total_frames, "Recording started");

    let recording = |next_frame| SessionState::Recording {
        start,
        end,
        next_frame,
        total_frames,
    };
    inner.publish(job.id, recording(1));

    let mut captured = 0;
    let mut attempted = 0;
    for (index, scheduled) in (1u32..).zip(job.schedule.frame_times()) {
        if job.cancel.is_cancelled() {
            break;
        }
        attempted = index;
        progress.set_message(format!("Taking photo #{index} of {total_frames}"));

        let path = job
            .frames_dir
            .join(format!("{}.jpg", schedule::stamp(&scheduled)));
        let camera = Arc::clone(&inner.camera);
        let options = inner.options.capture.clone();
        let result = tokio::task::spawn_blocking(move || camera.capture(&path, &options)).await;

        match result {
            Ok(Ok(())) => {
                captured += 1;
                info!(session = job.id, frame = index, at = %scheduled, "Frame captured");
            }
            Ok(Err(e)) => {
                warn!(session = job.id, frame = index, error = %e, "Frame capture failed, skipping");
            }
            Err(e) => {
                error!(session = job.id, frame = index, error = %e, "Frame capture task panicked");
            }
        }

        inner.publish(job.id, recording((index + 1).min(total_frames)));
        progress.set_message(format!(
            "Photo #{index} of {total_frames} done. Next in {}s",
            pause.as_secs()
        ));
        if !sleep_unless_cancelled(pause, &job.cancel).await {
            break;
        }
    }

    Ok(Recorded {
        frames: captured,
        complete: attempted == total_frames,
    })
}

async fn encode(inner: &Inner, job: &Job) -> Result<PathBuf> {
    let videos_dir = &inner.options.videos_dir;
    tokio::fs::create_dir_all(videos_dir).await?;

    let output = videos_dir.join(format!("{}.mp4", schedule::stamp(&Local::now())));
    let frames = job.frames_dir.join("*.jpg").display().to_string();
    let frame_rate = job.frame_rate;
    info!(session = job.id, frame_rate, output = %output.display(), "Encoding video");

    let encoder = Arc::clone(&inner.encoder);
    let target = output.clone();
    tokio::task::spawn_blocking(move || encoder.encode(frame_rate, &frames, &target))
        .await
        .map_err(|e| SessionError::Io(std::io::Error::other(e)))??;

    Ok(output)
}

/// Sleep for `duration`, waking early on cancellation. Returns `false` if cancelled.
async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

fn spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        progress.set_style(style);
    }
    progress
}
