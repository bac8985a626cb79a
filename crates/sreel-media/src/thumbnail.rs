//! Thumbnail extraction.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

const THUMBNAIL_SCALE_WIDTH: u32 = 480;
const THUMBNAIL_TIMESTAMP: &str = "0.5";

/// Extract a single scaled frame from a video.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let filter = format!("scale={THUMBNAIL_SCALE_WIDTH}:-2");
    let cmd = FfmpegCommand::new(output_path.as_ref())
        .input_with_args(&["-ss", THUMBNAIL_TIMESTAMP], video_path.as_ref())
        .single_frame()
        .video_filter(filter);
    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_command_shape() {
        let cmd = FfmpegCommand::new("thumb.jpg")
            .input_with_args(&["-ss", THUMBNAIL_TIMESTAMP], "video.mp4")
            .single_frame()
            .video_filter(format!("scale={THUMBNAIL_SCALE_WIDTH}:-2"));
        let args = cmd.build_args();
        assert!(args.contains(&"-frames:v".to_string()));
        assert!(args.contains(&"scale=480:-2".to_string()));
    }
}
