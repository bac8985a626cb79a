#![deny(unreachable_patterns)]
//! Shared data models for the StoryReel generation core.
//!
//! This crate defines the types that cross crate boundaries:
//! - Job identity, lifecycle state, and durable status snapshots
//! - The full video generation request payload (persisted 1:1 per job)
//! - Characters and the fixed voice catalog
//! - Render knobs (mode profiles, subtitle styles, camera motion)
//! - The per-segment image provenance report

pub mod character;
pub mod job;
pub mod model_info;
pub mod render;
pub mod report;
pub mod request;
pub mod segment;
pub mod voice;

pub use character::Character;
pub use job::{Job, JobId, JobState, FINAL_VIDEO_MIN_BYTES};
pub use model_info::{default_model_catalog, merge_probed_models, ModelInfo};
pub use render::{
    parse_resolution, CameraMotion, RenderMode, RenderProfile, Resolution, SubtitleStyle,
    AUDIO_BITRATE, FINAL_AUDIO_GAIN, TTS_GAIN,
};
pub use report::{ImageSource, ImageSourceReport};
pub use request::{GenerateVideoRequest, SegmentMethod};
pub use segment::Segment;
pub use voice::{is_catalog_voice, recommend_voice, VoiceInfo, NARRATOR_VOICE_ID, VOICES};
