//! Filter-graph string helpers.

/// Escape text for use inside a drawtext `text='…'` value.
pub fn escape_drawtext_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

/// Escape a filesystem path for use inside a filter option value.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Convert `#RRGGBB` to the `0xRRGGBB` form ffmpeg color options use.
pub fn ffmpeg_color(hex: &str) -> String {
    match hex.strip_prefix('#') {
        Some(rgb) => format!("0x{rgb}"),
        None => hex.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_drawtext_text() {
        assert_eq!(escape_drawtext_text("50%:好"), "50\\%\\:好");
        assert_eq!(escape_drawtext_text("it's"), "it\\'s");
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path("C:\\Fonts\\a.ttf"), "C\\:\\\\Fonts\\\\a.ttf");
    }

    #[test]
    fn test_ffmpeg_color() {
        assert_eq!(ffmpeg_color("#F9E96A"), "0xF9E96A");
        assert_eq!(ffmpeg_color("white"), "white");
    }
}
