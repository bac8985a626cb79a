//! Render knobs: mode profiles, subtitle styles, camera motion,
//! resolution parsing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Audio bitrate used for every encode pass.
pub const AUDIO_BITRATE: &str = "96k";

/// Gain applied to TTS audio before muxing into a clip.
pub const TTS_GAIN: f32 = 1.15;

/// Gain applied to the mixed audio of the final video.
pub const FINAL_AUDIO_GAIN: f32 = 3.0;

/// Encoder quality mode for clip and final passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// ultrafast/29 clips, veryfast/30 final
    #[default]
    Fast,
    /// veryfast/23 clips, veryfast/24 final
    Balanced,
    /// slow/20 clips, medium/21 final, re-encoded BGM pass
    Quality,
}

/// Concrete encoder settings for one render mode.
#[derive(Debug, Clone, Copy)]
pub struct RenderProfile {
    pub clip_preset: &'static str,
    pub clip_crf: &'static str,
    pub final_preset: &'static str,
    pub final_crf: &'static str,
    /// Whether the BGM mix pass may stream-copy the video track
    pub bgm_video_copy: bool,
}

impl RenderMode {
    pub fn profile(&self) -> RenderProfile {
        match self {
            RenderMode::Fast => RenderProfile {
                clip_preset: "ultrafast",
                clip_crf: "29",
                final_preset: "veryfast",
                final_crf: "30",
                bgm_video_copy: true,
            },
            RenderMode::Balanced => RenderProfile {
                clip_preset: "veryfast",
                clip_crf: "23",
                final_preset: "veryfast",
                final_crf: "24",
                bgm_video_copy: true,
            },
            RenderMode::Quality => RenderProfile {
                clip_preset: "slow",
                clip_crf: "20",
                final_preset: "medium",
                final_crf: "21",
                bgm_video_copy: false,
            },
        }
    }
}

/// Subtitle caption style.
///
/// `basic`/`highlight`/`danmaku`/`center` are the legacy names;
/// `white_black`/`black_white`/`yellow_black` name the color pairs
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleStyle {
    Basic,
    #[default]
    Highlight,
    Danmaku,
    Center,
    WhiteBlack,
    BlackWhite,
    YellowBlack,
}

impl SubtitleStyle {
    /// Caption fill and stroke colors as `#RRGGBB`.
    pub fn colors(&self) -> (&'static str, &'static str) {
        match self {
            SubtitleStyle::Highlight | SubtitleStyle::YellowBlack => ("#F9E96A", "#111111"),
            SubtitleStyle::BlackWhite => ("#111111", "#FFFFFF"),
            SubtitleStyle::Basic
            | SubtitleStyle::WhiteBlack
            | SubtitleStyle::Danmaku
            | SubtitleStyle::Center => ("#FFFFFF", "#111111"),
        }
    }

    /// Caption font size for a given frame height.
    pub fn font_size(&self) -> u32 {
        match self {
            SubtitleStyle::Center => 56,
            SubtitleStyle::Danmaku => 38,
            _ => 46,
        }
    }

    /// Vertical anchor as a fraction of frame height.
    pub fn y_fraction(&self) -> f64 {
        match self {
            SubtitleStyle::Center => 0.45,
            SubtitleStyle::Danmaku => 0.18,
            _ => 0.78,
        }
    }
}

/// Ken-Burns travel axis preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraMotion {
    #[default]
    Vertical,
    Horizontal,
    Auto,
}

/// Output frame size in pixels.
pub type Resolution = (u32, u32);

/// Parse `"WxH"` into a resolution, clamping each axis to at least
/// 320 px. Malformed input falls back to portrait 1080x1920.
pub fn parse_resolution(value: &str) -> Resolution {
    let mut parts = value.to_ascii_lowercase();
    parts.retain(|c| !c.is_whitespace());
    if let Some((w, h)) = parts.split_once('x') {
        if let (Ok(width), Ok(height)) = (w.parse::<u32>(), h.parse::<u32>()) {
            return (width.max(320), height.max(320));
        }
    }
    (1080, 1920)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_profiles() {
        assert_eq!(RenderMode::Fast.profile().clip_preset, "ultrafast");
        assert_eq!(RenderMode::Balanced.profile().clip_crf, "23");
        assert_eq!(RenderMode::Quality.profile().final_preset, "medium");
        assert!(!RenderMode::Quality.profile().bgm_video_copy);
    }

    #[test]
    fn test_subtitle_style_colors() {
        assert_eq!(SubtitleStyle::Highlight.colors(), ("#F9E96A", "#111111"));
        assert_eq!(SubtitleStyle::BlackWhite.colors(), ("#111111", "#FFFFFF"));
        assert_eq!(SubtitleStyle::WhiteBlack.colors(), ("#FFFFFF", "#111111"));
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1080x1920"), (1080, 1920));
        assert_eq!(parse_resolution("720X1280"), (720, 1280));
        assert_eq!(parse_resolution("100x100"), (320, 320));
        assert_eq!(parse_resolution("garbage"), (1080, 1920));
    }

    #[test]
    fn test_serde_names() {
        let mode: RenderMode = serde_json::from_str("\"balanced\"").unwrap();
        assert_eq!(mode, RenderMode::Balanced);
        let style: SubtitleStyle = serde_json::from_str("\"yellow_black\"").unwrap();
        assert_eq!(style, SubtitleStyle::YellowBlack);
    }
}
