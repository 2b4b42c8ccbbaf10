//! Error types shared by the scheduler, the session and the video library.

use thiserror::Error;

/// Failure of an external tool (camera or encoder).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", exit_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("status {c}"))
}

/// Errors surfaced by session and library operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("a capture session is already running")]
    AlreadyRunning,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    ExternalTool(#[from] ToolError),

    #[error("settings file {path} is corrupt: {source}")]
    CorruptSettings {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_message_names_exit_code() {
        let err = ToolError::Failed {
            program: "ffmpeg".into(),
            code: Some(1),
            stderr: "no input".into(),
        };
        assert_eq!(err.to_string(), "ffmpeg exited with status 1: no input");

        let err = ToolError::Failed {
            program: "fswebcam".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }
}
