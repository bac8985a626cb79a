//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Image generation failed and no fallback scene/reference image available")]
    ImageUnresolvable,

    #[error("Store error: {0}")]
    Store(#[from] sreel_store::StoreError),

    #[error("Scene cache error: {0}")]
    Cache(#[from] sreel_cache::CacheError),

    #[error("Media error: {0}")]
    Media(#[from] sreel_media::MediaError),

    #[error("LLM error: {0}")]
    Llm(#[from] sreel_llm::LlmError),

    #[error("Image provider error: {0}")]
    ImageGen(#[from] sreel_llm::ImageGenError),

    #[error("TTS error: {0}")]
    Tts(#[from] sreel_tts::TtsError),

    #[error("Segment range error: {0}")]
    Range(#[from] sreel_text::RangeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::JobFailed(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Human message stored on the failed job row.
    pub fn job_message(&self) -> String {
        match self {
            WorkerError::Media(err) => format!("Video generation failed: {}", err.detail()),
            WorkerError::Store(_) | WorkerError::Cache(_) => {
                "Video generation failed: internal error".to_string()
            }
            other => format!("Video generation failed: {other}"),
        }
    }
}
