//! Materializing cached frames at pipeline paths.

use std::path::Path;

use crate::error::{CacheError, CacheResult};

/// Copy a cached frame to the destination path as RGB, without
/// resizing. The clip renderer handles framing.
pub fn render_cached_image_to_output(
    cached_image_path: &Path,
    output_path: &Path,
) -> CacheResult<()> {
    if !cached_image_path.exists() {
        return Err(CacheError::ImageMissing(cached_image_path.to_path_buf()));
    }
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let decoded = image::open(cached_image_path)?;
    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
    rgb.save(output_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_preserves_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        let dst = dir.path().join("nested/out.png");

        let img = image::RgbaImage::from_pixel(64, 48, image::Rgba([10, 20, 30, 255]));
        img.save(&src).unwrap();

        render_cached_image_to_output(&src, &dst).unwrap();
        let reloaded = image::open(&dst).unwrap();
        assert_eq!(reloaded.width(), 64);
        assert_eq!(reloaded.height(), 48);
    }

    #[test]
    fn test_missing_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_cached_image_to_output(
            &dir.path().join("missing.png"),
            &dir.path().join("out.png"),
        )
        .unwrap_err();
        assert!(matches!(err, CacheError::ImageMissing(_)));
    }
}
