//! Rendered videos on disk.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::{Result, SessionError};

pub const VIDEO_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoInfo {
    pub name: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Directory of finished videos. Only plain file names inside it are ever
/// resolved, so a request can never reach outside.
#[derive(Debug, Clone)]
pub struct VideoLibrary {
    dir: PathBuf,
}

impl VideoLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All videos, newest name first. A missing directory is an empty library.
    pub async fn list(&self) -> Result<Vec<VideoInfo>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut videos = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !is_valid_name(&name) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            videos.push(VideoInfo {
                name,
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Local>::from),
            });
        }

        videos.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(videos)
    }

    /// Path of an existing video.
    pub async fn resolve(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_name(name) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(SessionError::NotFound(name.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SessionError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a video for streaming; returns the file and its length.
    pub async fn open(&self, name: &str) -> Result<(fs::File, u64)> {
        let path = self.resolve(name).await?;
        let file = fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name).await?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(video = name, "Video deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SessionError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `[A-Za-z0-9_.-]+`, no leading dot, `.mp4` suffix.
pub fn is_valid_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(&format!(".{VIDEO_EXTENSION}")) else {
        return false;
    };
    !stem.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
