//! Title band and traveling watermark overlays.
//!
//! The watermark (text or image) travels a closed rectangular path
//! hugging the frame margins, one full loop every 22 seconds, drawn
//! with per-frame opacity. The title band is a translucent black bar
//! at the top of the frame carrying the novel alias.

use std::path::{Path, PathBuf};

use sreel_models::Resolution;

use crate::filters::{escape_drawtext_text, escape_filter_path};

/// Seconds per full loop of the rectangular watermark path.
pub const WATERMARK_CYCLE_SECS: f64 = 22.0;

/// Watermark configuration from the request payload.
#[derive(Debug, Clone, Default)]
pub struct WatermarkConfig {
    /// Watermark text; empty disables the text watermark
    pub text: String,
    /// Optional watermark image, preferred over text when it exists
    pub image_path: Option<PathBuf>,
    /// Per-frame opacity in [0, 1]
    pub opacity: f32,
    /// Margin the path hugs, in pixels
    pub margin: u32,
}

impl WatermarkConfig {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_path: None,
            opacity: 0.55,
            margin: 36,
        }
    }

    pub fn with_image(path: impl Into<PathBuf>) -> Self {
        Self {
            text: String::new(),
            image_path: Some(path.into()),
            opacity: 0.55,
            margin: 36,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Whether the image variant is usable.
    pub fn image_available(&self) -> bool {
        self.image_path
            .as_deref()
            .map(Path::exists)
            .unwrap_or(false)
    }

    /// Whether any watermark should be drawn.
    pub fn is_enabled(&self) -> bool {
        self.image_available() || !self.text.trim().is_empty()
    }
}

/// Piecewise-linear expression tracing one axis of the closed
/// rectangular path. `low`/`high` are ffmpeg sub-expressions for the
/// two rails; the phase shifts the four-edge schedule.
fn rail_expr(low: &str, high: &str, phase_quarters: u32) -> String {
    let quarter = WATERMARK_CYCLE_SECS / 4.0;
    let shift = quarter * phase_quarters as f64;
    let p = format!("mod(t+{shift:.3},{WATERMARK_CYCLE_SECS:.3})");
    // Edge 1: travel low -> high; edge 2: hold high; edge 3: travel
    // back; edge 4: hold low.
    format!(
        "if(lt({p},{q:.3}),{low}+(({high})-({low}))*{p}/{q:.3},\
if(lt({p},{h:.3}),{high},\
if(lt({p},{t3:.3}),{high}-(({high})-({low}))*({p}-{h:.3})/{q:.3},{low})))",
        q = quarter,
        h = quarter * 2.0,
        t3 = quarter * 3.0,
    )
}

/// Drawtext filter for a traveling text watermark.
pub fn watermark_text_filter(
    config: &WatermarkConfig,
    resolution: Resolution,
    font: Option<&Path>,
) -> String {
    let (_, height) = resolution;
    let margin = config.margin;
    let font_size = (height as f64 * 0.022).round().max(18.0) as u32;
    let font_clause = font
        .map(|path| format!(":fontfile='{}'", escape_filter_path(&path.to_string_lossy())))
        .unwrap_or_default();

    let x_expr = rail_expr(
        &format!("{margin}"),
        &format!("w-text_w-{margin}"),
        0,
    );
    let y_expr = rail_expr(
        &format!("{margin}"),
        &format!("h-text_h-{margin}"),
        1,
    );

    format!(
        "drawtext=text='{}'{font_clause}:fontsize={font_size}:fontcolor=white:\
alpha={:.2}:borderw=1:bordercolor=black:x='{x_expr}':y='{y_expr}'",
        escape_drawtext_text(config.text.trim()),
        config.opacity.clamp(0.0, 1.0),
    )
}

/// Filter-complex fragment for a traveling image watermark. Input 1 is
/// the watermark image; `input_label` is the video chain to overlay
/// onto and `output_label` names the result.
pub fn watermark_image_filter_complex(
    config: &WatermarkConfig,
    input_label: &str,
    output_label: &str,
) -> String {
    let margin = config.margin;
    let x_expr = rail_expr(&format!("{margin}"), &format!("W-w-{margin}"), 0);
    let y_expr = rail_expr(&format!("{margin}"), &format!("H-h-{margin}"), 1);
    format!(
        "[1:v]format=rgba,colorchannelmixer=aa={:.2}[wm];[{input_label}][wm]\
overlay=x='{x_expr}':y='{y_expr}':format=auto[{output_label}]",
        config.opacity.clamp(0.0, 1.0),
    )
}

/// Black title band + centered alias text at the top of the frame.
pub fn title_band_filter(alias: &str, resolution: Resolution, font: Option<&Path>) -> String {
    let (_, height) = resolution;
    let band_height = (height as f64 * 0.07).round().max(64.0) as u32;
    let font_size = (band_height as f64 * 0.42).round() as u32;
    let font_clause = font
        .map(|path| format!(":fontfile='{}'", escape_filter_path(&path.to_string_lossy())))
        .unwrap_or_default();

    format!(
        "drawbox=x=0:y=0:w=iw:h={band_height}:color=black@0.62:t=fill,\
drawtext=text='{}'{font_clause}:fontsize={font_size}:fontcolor=white:\
x=(w-text_w)/2:y=({band_height}-text_h)/2",
        escape_drawtext_text(alias.trim()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_states() {
        assert!(!WatermarkConfig::default().is_enabled());
        assert!(WatermarkConfig::with_text("故事会").is_enabled());

        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("wm.png");
        std::fs::write(&image, b"png").unwrap();
        assert!(WatermarkConfig::with_image(&image).is_enabled());
        assert!(!WatermarkConfig::with_image(dir.path().join("missing.png")).is_enabled());
    }

    #[test]
    fn test_rail_expr_covers_four_edges() {
        let expr = rail_expr("36", "w-text_w-36", 0);
        // Three if() branches split the 22s cycle into four edges.
        assert_eq!(expr.matches("if(").count(), 3);
        assert!(expr.contains("mod(t+0.000,22.000)"));
        assert!(expr.contains("5.500"));
        assert!(expr.contains("16.500"));
    }

    #[test]
    fn test_text_filter_carries_opacity_and_motion() {
        let config = WatermarkConfig::with_text("追更").with_opacity(0.4);
        let filter = watermark_text_filter(&config, (1080, 1920), None);
        assert!(filter.contains("alpha=0.40"));
        assert!(filter.contains("mod(t+"));
        assert!(filter.contains("text='追更'"));
    }

    #[test]
    fn test_image_filter_complex_labels() {
        let config = WatermarkConfig::with_text("").with_opacity(0.5);
        let filter = watermark_image_filter_complex(&config, "base", "marked");
        assert!(filter.starts_with("[1:v]"));
        assert!(filter.contains("[base][wm]"));
        assert!(filter.ends_with("[marked]"));
    }

    #[test]
    fn test_title_band_centers_alias() {
        let filter = title_band_filter("雪夜孤灯", (1080, 1920), None);
        assert!(filter.contains("drawbox="));
        assert!(filter.contains("text='雪夜孤灯'"));
        assert!(filter.contains("x=(w-text_w)/2"));
    }
}
