//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error. The stderr is clipped to a
    /// 400-char prefix before it reaches job rows or logs.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr: stderr.map(|raw| stderr_prefix(&raw)),
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Human-facing failure detail: the message plus the clipped
    /// stderr when present.
    pub fn detail(&self) -> String {
        match self {
            MediaError::FfmpegFailed {
                message,
                stderr: Some(stderr),
                ..
            } => format!("{message}: {stderr}"),
            other => other.to_string(),
        }
    }
}

/// Clip encoder stderr to a 400-char prefix.
pub fn stderr_prefix(raw: &str) -> String {
    raw.trim().chars().take(400).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_clipped_to_prefix() {
        let long = "e".repeat(1000);
        let err = MediaError::ffmpeg_failed("concat failed", Some(long), Some(1));
        match err {
            MediaError::FfmpegFailed { stderr, .. } => {
                assert_eq!(stderr.unwrap().len(), 400);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_detail_includes_stderr() {
        let err = MediaError::ffmpeg_failed("mix failed", Some("boom".to_string()), None);
        assert!(err.detail().contains("boom"));
    }
}
