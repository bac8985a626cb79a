//! Per-scene clip rendering: motion image + subtitles + audio.

use std::path::Path;

use tracing::{info, warn};

use sreel_models::{
    CameraMotion, RenderMode, Resolution, SubtitleStyle, AUDIO_BITRATE, TTS_GAIN,
};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::font::subtitle_font_path;
use crate::motion::MotionPlan;
use crate::probe::probe_video;
use crate::subtitle::subtitle_filter_chain;

/// Render one H.264/AAC clip from a still frame, a TTS track, and the
/// segment text.
///
/// The frame is cover-fit and panned per the camera motion, captions
/// are drawn on a style-dependent band, TTS is amplified by a fixed
/// gain, and the encoder preset/CRF follow the render mode. When
/// rendering fails with a resolved font, one retry runs without the
/// font; captions are never dropped silently for a non-font reason.
#[allow(clippy::too_many_arguments)]
pub async fn render_clip(
    image_path: &Path,
    audio_path: &Path,
    text: &str,
    duration: f64,
    output_path: &Path,
    fps: u32,
    resolution: Resolution,
    subtitle_style: SubtitleStyle,
    camera_motion: CameraMotion,
    render_mode: RenderMode,
    configured_font: Option<&str>,
) -> MediaResult<()> {
    let duration = duration.max(0.1);
    let frame = probe_video(image_path).await?;
    let plan = MotionPlan::compute(frame.width, frame.height, resolution, camera_motion);

    let font = subtitle_font_path(configured_font);
    let result = run_clip_encode(
        image_path,
        audio_path,
        text,
        duration,
        output_path,
        fps,
        resolution,
        subtitle_style,
        render_mode,
        &plan,
        font.as_deref(),
    )
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(err) if font.is_some() => {
            warn!(
                error = %err,
                "Clip render failed with resolved font, retrying with encoder default font"
            );
            run_clip_encode(
                image_path,
                audio_path,
                text,
                duration,
                output_path,
                fps,
                resolution,
                subtitle_style,
                render_mode,
                &plan,
                None,
            )
            .await
        }
        Err(err) => Err(err),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_clip_encode(
    image_path: &Path,
    audio_path: &Path,
    text: &str,
    duration: f64,
    output_path: &Path,
    fps: u32,
    resolution: Resolution,
    subtitle_style: SubtitleStyle,
    render_mode: RenderMode,
    plan: &MotionPlan,
    font: Option<&Path>,
) -> MediaResult<()> {
    if !audio_path.exists() {
        return Err(MediaError::FileNotFound(audio_path.to_path_buf()));
    }

    let profile = render_mode.profile();
    let mut video_filter = plan.to_filter(duration);
    let captions = subtitle_filter_chain(text, duration, resolution, subtitle_style, font);
    if !captions.is_empty() {
        video_filter.push(',');
        video_filter.push_str(&captions);
    }
    video_filter.push_str(",format=yuv420p");

    let cmd = FfmpegCommand::new(output_path)
        .input_with_args(&["-loop", "1"], image_path)
        .input(audio_path)
        .map("0:v:0")
        .map("1:a:0")
        .video_filter(video_filter)
        .audio_filter(format!("volume={TTS_GAIN}"))
        .video_codec("libx264")
        .preset(profile.clip_preset)
        .crf(profile.clip_crf)
        .fps(fps)
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .duration(duration)
        .faststart();

    FfmpegRunner::new().run(&cmd).await?;
    info!(
        clip = %output_path.display(),
        duration,
        "Scene clip rendered"
    );
    Ok(())
}
