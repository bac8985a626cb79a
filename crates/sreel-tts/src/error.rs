//! Error types for speech synthesis.
//!
//! TTS is never fatal to a job: the silent-WAV fallback absorbs every
//! failure, so these errors only surface in logs and between fallback
//! tiers.

use thiserror::Error;

pub type TtsResult<T> = Result<T, TtsError>;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Remote TTS returned {status}: {detail}")]
    Remote { status: u16, detail: String },

    #[error("Remote TTS returned non-audio content-type: {0}")]
    NotAudio(String),

    #[error("Remote TTS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Local TTS engine not found in PATH")]
    EngineNotFound,

    #[error("Local TTS failed: {0}")]
    Engine(String),

    #[error("TTS timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
