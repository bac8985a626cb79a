//! Subtitle timeline and drawtext chain building.
//!
//! A segment's text splits into presentation units at punctuation
//! (the caption splitter), each unit holding screen time proportional
//! to its non-whitespace length; the unit times always sum to the
//! clip duration.

use std::path::Path;

use sreel_models::{Resolution, SubtitleStyle};
use sreel_text::split_caption_units;

use crate::filters::{escape_drawtext_text, escape_filter_path, ffmpeg_color};

/// One caption with its on-screen interval.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleUnit {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Allocate screen time across caption units.
pub fn subtitle_timeline(text: &str, duration: f64) -> Vec<SubtitleUnit> {
    let units = split_caption_units(text);
    if units.is_empty() {
        return Vec::new();
    }

    let safe_duration = duration.max(0.1);
    let weights: Vec<f64> = units
        .iter()
        .map(|unit| unit.chars().filter(|c| !c.is_whitespace()).count().max(1) as f64)
        .collect();
    let total_weight: f64 = weights.iter().sum();

    let mut timeline = Vec::with_capacity(units.len());
    let mut cursor = 0.0_f64;
    for (index, unit) in units.iter().enumerate() {
        let end = if index == units.len() - 1 {
            safe_duration
        } else {
            let proportional = cursor + safe_duration * weights[index] / total_weight;
            proportional.min(safe_duration).max(cursor + 0.05)
        };
        timeline.push(SubtitleUnit {
            text: unit.clone(),
            start: cursor,
            end: end.min(safe_duration),
        });
        cursor = end.min(safe_duration);
    }
    timeline
}

/// Build the drawtext filter chain for a segment's captions. Returns
/// an empty string when there is nothing to draw.
pub fn subtitle_filter_chain(
    text: &str,
    duration: f64,
    resolution: Resolution,
    style: SubtitleStyle,
    font_path: Option<&Path>,
) -> String {
    let timeline = subtitle_timeline(text, duration);
    if timeline.is_empty() {
        return String::new();
    }

    let (_, height) = resolution;
    let (fill, stroke) = style.colors();
    let font_size = style.font_size();
    let y = (height as f64 * style.y_fraction()).round() as u32;

    let font_clause = font_path
        .map(|path| format!(":fontfile='{}'", escape_filter_path(&path.to_string_lossy())))
        .unwrap_or_default();

    timeline
        .iter()
        .map(|unit| {
            format!(
                "drawtext=text='{}'{font_clause}:fontsize={font_size}:fontcolor={}:\
borderw=2:bordercolor={}:x=(w-text_w)/2:y={y}:enable='between(t,{:.3},{:.3})'",
                escape_drawtext_text(&unit.text),
                ffmpeg_color(fill),
                ffmpeg_color(stroke),
                unit.start,
                unit.end,
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_sums_to_duration() {
        let timeline = subtitle_timeline("第一句。第二句更长一些。短。", 6.0);
        assert!(!timeline.is_empty());
        assert!((timeline.last().unwrap().end - 6.0).abs() < 1e-9);
        for pair in timeline.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < 1e-9);
            assert!(pair[0].end > pair[0].start);
        }
    }

    #[test]
    fn test_timeline_weights_by_length() {
        let timeline = subtitle_timeline("四个字呀。这一句明显要长很多很多。", 10.0);
        assert_eq!(timeline.len(), 2);
        let first = timeline[0].end - timeline[0].start;
        let second = timeline[1].end - timeline[1].start;
        assert!(second > first);
    }

    #[test]
    fn test_empty_text_yields_no_units() {
        assert!(subtitle_timeline("   ", 3.0).is_empty());
        let chain = subtitle_filter_chain(
            "",
            3.0,
            (1080, 1920),
            SubtitleStyle::Highlight,
            None,
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn test_filter_chain_styles() {
        let chain = subtitle_filter_chain(
            "你好。再见。",
            4.0,
            (1080, 1920),
            SubtitleStyle::Highlight,
            None,
        );
        assert_eq!(chain.matches("drawtext=").count(), 2);
        assert!(chain.contains("fontcolor=0xF9E96A"));
        assert!(chain.contains(&format!("y={}", (1920.0_f64 * 0.78).round() as u32)));
        assert!(chain.contains("between(t,"));
    }

    #[test]
    fn test_filter_chain_center_style_position() {
        let chain = subtitle_filter_chain(
            "你好。",
            4.0,
            (1080, 1920),
            SubtitleStyle::Center,
            None,
        );
        assert!(chain.contains(&format!("y={}", (1920.0_f64 * 0.45).round() as u32)));
        assert!(chain.contains("fontsize=56"));
    }

    #[test]
    fn test_filter_chain_includes_font_when_given() {
        let chain = subtitle_filter_chain(
            "你好。",
            4.0,
            (1080, 1920),
            SubtitleStyle::Basic,
            Some(Path::new("/fonts/noto.otf")),
        );
        assert!(chain.contains("fontfile="));
    }
}
