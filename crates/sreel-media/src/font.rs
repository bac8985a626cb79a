//! Subtitle font resolution.
//!
//! Resolved once per process: the configured path first, then the
//! bundled CJK fonts, then common OS font locations. A missing font is
//! tolerated; captions render with the encoder's default font.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{info, warn};

static SUBTITLE_FONT: OnceLock<Option<PathBuf>> = OnceLock::new();

const BUNDLED_FONTS: &[&str] = &[
    "assets/fonts/NotoSansSC-Regular.otf",
    "assets/fonts/NotoSansCJKsc-Regular.otf",
];

const OS_FONTS: &[&str] = &[
    "C:/Windows/Fonts/msyh.ttc",
    "C:/Windows/Fonts/msyhbd.ttc",
    "C:/Windows/Fonts/simhei.ttf",
    "C:/Windows/Fonts/simsun.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
    "/System/Library/Fonts/PingFang.ttc",
];

/// Resolve the subtitle font, caching the answer for the process
/// lifetime. The configured path only participates in the first call.
pub fn subtitle_font_path(configured: Option<&str>) -> Option<PathBuf> {
    SUBTITLE_FONT
        .get_or_init(|| {
            let resolved = resolve(configured);
            match &resolved {
                Some(path) => info!(font = %path.display(), "Subtitle font resolved"),
                None => warn!(
                    "No CJK subtitle font found; captions may render garbled. \
                     Set SUBTITLE_FONT_PATH to override."
                ),
            }
            resolved
        })
        .clone()
}

fn resolve(configured: Option<&str>) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    candidates.extend(BUNDLED_FONTS.iter().map(PathBuf::from));
    candidates.extend(OS_FONTS.iter().map(PathBuf::from));

    candidates.into_iter().find(|path| Path::new(path).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("custom.ttf");
        std::fs::write(&font, b"font").unwrap();

        let resolved = resolve(Some(font.to_str().unwrap()));
        assert_eq!(resolved, Some(font));
    }

    #[test]
    fn test_resolve_missing_configured_falls_through() {
        let resolved = resolve(Some("/nonexistent/font.ttf"));
        // Falls through to bundled/OS candidates; result depends on
        // the host, but must not be the bogus configured path.
        assert_ne!(resolved, Some(PathBuf::from("/nonexistent/font.ttf")));
    }
}
