#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the StoryReel core.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building for multi-input graphs
//! - Probing (video info, media durations)
//! - Ken-Burns motion planning and drawtext caption chains
//! - Per-scene clip rendering
//! - Final composition (concat, title band, traveling watermark, BGM)
//! - Thumbnail extraction

pub mod clip;
pub mod command;
pub mod compose;
pub mod concat;
pub mod error;
pub mod filters;
pub mod font;
pub mod fs_utils;
pub mod motion;
pub mod probe;
pub mod subtitle;
pub mod thumbnail;
pub mod watermark;

pub use clip::render_clip;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{compose_final_video, remix_final_video, ComposeSettings};
pub use concat::{concat_reencode, concat_stream_copy, write_concat_list};
pub use error::{stderr_prefix, MediaError, MediaResult};
pub use font::subtitle_font_path;
pub use fs_utils::{ensure_dir, file_at_least, file_size, remove_dir_quietly, remove_file_quietly};
pub use motion::{MotionAxis, MotionPlan};
pub use probe::{probe_media_duration, probe_video, VideoInfo};
pub use subtitle::{subtitle_filter_chain, subtitle_timeline, SubtitleUnit};
pub use thumbnail::generate_thumbnail;
pub use watermark::{
    title_band_filter, watermark_image_filter_complex, watermark_text_filter, WatermarkConfig,
    WATERMARK_CYCLE_SECS,
};
