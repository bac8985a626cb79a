//! The full video generation request payload.
//!
//! Persisted 1:1 with the job row; required to resume after a crash.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::character::Character;
use crate::render::{CameraMotion, RenderMode, SubtitleStyle};

/// Segmentation method for turning the source text into scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMethod {
    /// Deterministic sentence split + grouping
    #[default]
    Sentence,
    /// Fixed-size slices of the normalized text
    Fixed,
    /// LLM-planned segmentation with deterministic fallback
    Smart,
}

impl SegmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentMethod::Sentence => "sentence",
            SegmentMethod::Fixed => "fixed",
            SegmentMethod::Smart => "smart",
        }
    }
}

/// Full serialized request for one generation job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct GenerateVideoRequest {
    /// Source prose
    #[validate(length(min = 1, message = "text is required"))]
    pub text: String,

    /// Cast of characters
    #[serde(default)]
    pub characters: Vec<Character>,

    /// Segmentation method
    #[serde(default)]
    pub segment_method: SegmentMethod,

    /// Sentences grouped per segment (sentence method)
    #[serde(default = "default_sentences_per_segment")]
    #[validate(range(min = 1, max = 50))]
    pub sentences_per_segment: u32,

    /// Slice size in chars (fixed method)
    #[serde(default = "default_fixed_size")]
    #[validate(range(min = 20, max = 1000))]
    pub fixed_size: u32,

    /// Cap on segment count; 0 means no cap
    #[serde(default)]
    #[validate(range(max = 10000))]
    pub max_segment_groups: u32,

    /// Optional 1-based range spec like `"2,4-6"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_range: Option<String>,

    /// Output resolution as `"WxH"`
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Optional aspect ratio hint forwarded to the image provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_aspect_ratio: Option<String>,

    /// Subtitle caption style
    #[serde(default)]
    pub subtitle_style: SubtitleStyle,

    /// Ken-Burns travel axis preference
    #[serde(default)]
    pub camera_motion: CameraMotion,

    /// Output frame rate
    #[serde(default = "default_fps")]
    #[validate(range(min = 15, max = 60))]
    pub fps: u32,

    /// Preferred LLM model id; empty uses the configured default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Mix background music into the final video
    #[serde(default = "default_true")]
    pub bgm_enabled: bool,

    /// BGM volume in [0, 1]
    #[serde(default = "default_bgm_volume")]
    pub bgm_volume: f32,

    /// Overlay a traveling watermark with this text; empty disables
    #[serde(default)]
    pub watermark_text: String,

    /// Optional watermark image path, preferred over text when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_image_path: Option<String>,

    /// Novel alias shown in the final title band; empty disables
    #[serde(default)]
    pub novel_alias: String,

    /// Encoder quality mode
    #[serde(default)]
    pub render_mode: RenderMode,

    /// Consult the scene cache before generating each frame
    #[serde(default = "default_true")]
    pub enable_scene_image_reuse: bool,

    /// Size of the no-repeat ring for reused cache entries; 0 disables
    #[serde(default)]
    pub scene_reuse_no_repeat_window: u32,

    /// Signature of a client-side precomputed segmentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_signature: Option<String>,

    /// Client-side precomputed segments, honored only when the
    /// signature matches the server-side recomputation
    #[serde(default)]
    pub precomputed_segments: Vec<String>,
}

fn default_sentences_per_segment() -> u32 {
    5
}

fn default_fixed_size() -> u32 {
    120
}

fn default_resolution() -> String {
    "1080x1920".to_string()
}

fn default_fps() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_bgm_volume() -> f32 {
    0.18
}

impl GenerateVideoRequest {
    /// Minimal request for the given text, everything else defaulted.
    pub fn for_text(text: impl Into<String>) -> Self {
        serde_json::from_value(serde_json::json!({ "text": text.into() }))
            .expect("defaultable request")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_defaults() {
        let request = GenerateVideoRequest::for_text("雨夜，林远推开了那扇门。");
        assert_eq!(request.segment_method, SegmentMethod::Sentence);
        assert_eq!(request.sentences_per_segment, 5);
        assert_eq!(request.fixed_size, 120);
        assert_eq!(request.resolution, "1080x1920");
        assert_eq!(request.fps, 30);
        assert!(request.bgm_enabled);
        assert!(request.enable_scene_image_reuse);
        assert_eq!(request.scene_reuse_no_repeat_window, 0);
    }

    #[test]
    fn test_validation_rejects_empty_text() {
        let request = GenerateVideoRequest::for_text("");
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_fps() {
        let mut request = GenerateVideoRequest::for_text("x");
        request.fps = 5;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_payload_round_trip() {
        let mut request = GenerateVideoRequest::for_text("第一章。她来了。");
        request.scene_reuse_no_repeat_window = 3;
        request.precomputed_segments = vec!["第一章。".into(), "她来了。".into()];
        request.request_signature = Some("ab".repeat(32));
        let json = serde_json::to_string(&request).unwrap();
        let restored: GenerateVideoRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.precomputed_segments, request.precomputed_segments);
        assert_eq!(restored.scene_reuse_no_repeat_window, 3);
    }
}
