//! Persisted user settings for the next capture session.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::schedule::{self, Schedule};

/// Flat settings record, stored as a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between two captures
    pub interval: u32,

    /// Length of the recording phase in seconds
    pub capture_duration: u32,

    /// `YYYY-MM-DD`; when absent the session starts on the day it is started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    /// `HH:MM` or `HH:MM:SS`, local time
    pub start_time: String,

    /// Target playback length of the rendered video in seconds
    pub video_duration: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: 10,
            capture_duration: 60,
            start_date: None,
            start_time: "12:30".to_string(),
            video_duration: 60,
        }
    }
}

impl Settings {
    /// Check every field without touching the clock.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(SessionError::invalid("interval must be positive"));
        }
        if self.capture_duration == 0 {
            return Err(SessionError::invalid("capture duration must be positive"));
        }
        if let Some(date) = &self.start_date {
            schedule::parse_date(date)?;
        }
        schedule::parse_time(&self.start_time)?;
        self.frame_rate()?;
        Ok(())
    }

    pub fn frame_rate(&self) -> Result<u32> {
        schedule::frame_rate(self.capture_duration, self.video_duration)
    }

    /// Resolve the recording window, using `today` when no start date is set.
    pub fn schedule(&self, today: NaiveDate) -> Result<Schedule> {
        let date = match &self.start_date {
            Some(raw) => schedule::parse_date(raw)?,
            None => today,
        };
        let time = schedule::parse_time(&self.start_time)?;
        Schedule::new(date, time, self.capture_duration, self.interval)
    }
}

/// JSON file holding the current [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored settings, or the defaults when nothing has been saved yet.
    pub fn load(&self) -> Result<Settings> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw).map_err(|source| SessionError::CorruptSettings {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Write atomically: temp file next to the target, then rename over it.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(settings).map_err(|source| {
            SessionError::CorruptSettings {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), ?settings, "Settings saved");
        Ok(())
    }

    /// Remove the stored record; the next `load` returns defaults.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Settings reset to defaults");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
