//! Scheduled timelapse capture.
//!
//! A single capture session waits for a configured start instant, takes a
//! frame with an external camera tool at a fixed interval, then renders the
//! frames into a video with an external encoder and throws the frames away.
//! Settings, session control and the finished videos are exposed over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod schedule;
pub mod session;
pub mod settings;
pub mod tools;
pub mod videos;

pub use error::{SessionError, ToolError};
pub use session::{CaptureSession, SessionOutcome, SessionState};
pub use settings::{Settings, SettingsStore};
