//! Process configuration
//!
//! Loads configuration from environment variables.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::session::SessionOptions;
use crate::tools::CaptureOptions;

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// JSON file holding the user settings
    pub settings_file: PathBuf,

    /// Root for transient frame directories
    pub frames_dir: PathBuf,

    /// Where rendered videos are kept
    pub videos_dir: PathBuf,

    /// Frame capture executable
    pub capture_program: PathBuf,

    /// Video encoder executable
    pub encoder_program: PathBuf,

    pub capture_resolution: String,

    /// JPEG quality, 1-100
    pub capture_jpeg_quality: u8,

    /// Wait-phase poll granularity (default: 1s)
    pub poll_interval: Duration,

    /// Draw a progress spinner on the terminal
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
            settings_file: "config.json".into(),
            frames_dir: "frames".into(),
            videos_dir: "videos".into(),
            capture_program: "fswebcam".into(),
            encoder_program: "ffmpeg".into(),
            capture_resolution: CaptureOptions::default().resolution,
            capture_jpeg_quality: CaptureOptions::default().jpeg_quality,
            poll_interval: Duration::from_secs(1),
            show_progress: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let capture_jpeg_quality =
            parsed(&lookup, "CAPTURE_JPEG_QUALITY")?.unwrap_or(defaults.capture_jpeg_quality);
        if !(1..=100).contains(&capture_jpeg_quality) {
            bail!("CAPTURE_JPEG_QUALITY must be between 1 and 100, got {capture_jpeg_quality}");
        }

        let poll_secs: u64 = parsed(&lookup, "POLL_INTERVAL_SECS")?.unwrap_or(1);
        if poll_secs == 0 {
            bail!("POLL_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            settings_file: lookup("SETTINGS_FILE").map_or(defaults.settings_file, PathBuf::from),
            frames_dir: lookup("FRAMES_DIR").map_or(defaults.frames_dir, PathBuf::from),
            videos_dir: lookup("VIDEOS_DIR").map_or(defaults.videos_dir, PathBuf::from),
            capture_program: lookup("CAPTURE_PROGRAM").map_or(defaults.capture_program, PathBuf::from),
            encoder_program: lookup("ENCODER_PROGRAM").map_or(defaults.encoder_program, PathBuf::from),
            capture_resolution: lookup("CAPTURE_RESOLUTION").unwrap_or(defaults.capture_resolution),
            capture_jpeg_quality,
            poll_interval: Duration::from_secs(poll_secs),
            show_progress: parsed(&lookup, "SHOW_PROGRESS")?.unwrap_or(defaults.show_progress),
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            frames_dir: self.frames_dir.clone(),
            videos_dir: self.videos_dir.clone(),
            poll_interval: self.poll_interval,
            capture: CaptureOptions {
                resolution: self.capture_resolution.clone(),
                jpeg_quality: self.capture_jpeg_quality,
            },
            show_progress: self.show_progress,
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("{key} has an invalid value: {raw:?}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.settings_file, PathBuf::from("config.json"));
        assert_eq!(config.capture_resolution, "1280x720");
        assert_eq!(config.capture_jpeg_quality, 85);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.show_progress);
    }

    #[test]
    fn overrides_are_applied() {
        let config = from_pairs(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("VIDEOS_DIR", "/srv/videos"),
            ("CAPTURE_JPEG_QUALITY", "95"),
            ("POLL_INTERVAL_SECS", "2"),
            ("SHOW_PROGRESS", "false"),
        ])
        .unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.videos_dir, PathBuf::from("/srv/videos"));

        let options = config.session_options();
        assert_eq!(options.capture.jpeg_quality, 95);
        assert_eq!(options.poll_interval, Duration::from_secs(2));
        assert!(!options.show_progress);
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(from_pairs(&[("CAPTURE_JPEG_QUALITY", "high")]).is_err());
        assert!(from_pairs(&[("CAPTURE_JPEG_QUALITY", "0")]).is_err());
        assert!(from_pairs(&[("POLL_INTERVAL_SECS", "0")]).is_err());
        assert!(from_pairs(&[("SHOW_PROGRESS", "maybe")]).is_err());
    }
}
