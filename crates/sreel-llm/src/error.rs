//! Error types for provider calls.

use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM provider is not configured")]
    Disabled,

    #[error("LLM provider returned {status}: {detail}")]
    Provider { status: u16, detail: String },

    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM response is not parseable JSON: {0}")]
    Unparseable(String),

    #[error("LLM call timed out after {0} seconds")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ImageGenResult<T> = Result<T, ImageGenError>;

/// Errors from the streaming image provider. Any of these triggers
/// the resolver's fallback cascade.
#[derive(Debug, Error)]
pub enum ImageGenError {
    #[error("Image provider is not configured")]
    Disabled,

    #[error("Image provider returned {status}: {detail}")]
    Provider { status: u16, detail: String },

    #[error("Image request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("No image URL found in provider stream")]
    NoImageUrl,

    #[error("Image generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Downloaded image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
