//! External camera and encoder tools.
//!
//! Both are synchronous: the session runs them on the blocking pool.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::ToolError;

/// Camera parameters handed to every capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub resolution: String,
    pub jpeg_quality: u8,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            resolution: "1280x720".to_string(),
            jpeg_quality: 85,
        }
    }
}

/// Takes one still image and writes it to `output`.
pub trait FrameCapture: Send + Sync {
    fn capture(&self, output: &Path, options: &CaptureOptions) -> Result<(), ToolError>;
}

/// Assembles the frames of a directory into one video.
pub trait VideoEncoder: Send + Sync {
    /// `frames` is the glob selecting every frame; lexical order is capture order.
    fn encode(&self, frame_rate: u32, frames: &str, output: &Path) -> Result<(), ToolError>;
}

/// `fswebcam` (or anything accepting the same flags).
#[derive(Debug, Clone)]
pub struct Fswebcam {
    program: PathBuf,
}

impl Fswebcam {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FrameCapture for Fswebcam {
    fn capture(&self, output: &Path, options: &CaptureOptions) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-r", &options.resolution])
            .args(["--jpeg", &options.jpeg_quality.to_string()])
            .args(["-D", "1", "--no-banner"])
            .arg(output);
        run(cmd, &self.program)
    }
}

/// `ffmpeg` encoding a glob of JPEG frames to H.264.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl VideoEncoder for Ffmpeg {
    fn encode(&self, frame_rate: u32, frames: &str, output: &Path) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-y", "-loglevel", "error"])
            .args(["-framerate", &frame_rate.to_string()])
            .args(["-pattern_type", "glob", "-i", frames])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(output);
        run(cmd, &self.program)
    }
}

fn run(mut cmd: Command, program: &Path) -> Result<(), ToolError> {
    let program = program.display().to_string();
    debug!(?cmd, "Running external tool");

    let result = cmd.output().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    if !result.status.success() {
        return Err(ToolError::Failed {
            program,
            code: result.status.code(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }
    Ok(())
}
