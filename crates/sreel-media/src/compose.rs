//! Final composition: concat scene clips, overlay title band and
//! traveling watermark, mix background music, boost loudness.
//!
//! The fast path stream-copies the concat and only re-encodes where a
//! filter forces it; the slow path re-encodes the concat outright when
//! stream copy fails (mismatched clip parameters). Both paths are
//! idempotent: an existing output of plausible size short-circuits.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use sreel_models::{RenderMode, AUDIO_BITRATE, FINAL_AUDIO_GAIN, FINAL_VIDEO_MIN_BYTES};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::font::subtitle_font_path;
use crate::fs_utils::file_at_least;
use crate::probe::probe_video;
use crate::watermark::{
    title_band_filter, watermark_image_filter_complex, watermark_text_filter, WatermarkConfig,
};
use crate::concat::{concat_reencode, concat_stream_copy, write_concat_list};

/// Settings for the final composition pass.
#[derive(Debug, Clone)]
pub struct ComposeSettings {
    pub render_mode: RenderMode,
    pub bgm_enabled: bool,
    /// BGM volume in [0, 1]
    pub bgm_volume: f32,
    /// Resolved BGM source ("current" pointer copy, else the library
    /// default); None disables the mix
    pub bgm_path: Option<PathBuf>,
    /// Novel alias for the title band; empty disables the band
    pub novel_alias: String,
    pub watermark: WatermarkConfig,
    /// Configured subtitle font path, shared with caption rendering
    pub subtitle_font: Option<String>,
}

/// Concatenate scene clips and finish the video at `output`.
///
/// If `output` already exists at a plausible size the job is treated
/// as composed and nothing runs.
pub async fn compose_final_video(
    clip_paths: &[PathBuf],
    output: &Path,
    settings: &ComposeSettings,
) -> MediaResult<()> {
    if file_at_least(output, FINAL_VIDEO_MIN_BYTES) {
        info!(output = %output.display(), "Final video already present, skipping compose");
        return Ok(());
    }
    if clip_paths.is_empty() {
        return Err(MediaError::internal("no scene clips to compose"));
    }
    check_ffmpeg()?;

    let workdir = tempfile::Builder::new().prefix("sreel_compose_").tempdir()?;
    let list_path = workdir.path().join("concat_list.txt");
    write_concat_list(clip_paths, &list_path)?;

    let profile = settings.render_mode.profile();
    let merged = workdir.path().join("merged_no_bgm.mp4");

    if let Err(err) = concat_stream_copy(&list_path, &merged).await {
        warn!(error = %err.detail(), "Concat stream copy failed, re-encoding concat");
        concat_reencode(
            &list_path,
            &merged,
            profile.final_preset,
            profile.final_crf,
            AUDIO_BITRATE,
        )
        .await?;
    }

    let overlaid = apply_overlays(&merged, workdir.path(), settings).await?;
    mix_bgm_and_finish(&overlaid, output, settings).await?;

    if !file_at_least(output, FINAL_VIDEO_MIN_BYTES) {
        return Err(MediaError::internal(format!(
            "final video missing or truncated: {}",
            output.display()
        )));
    }
    info!(output = %output.display(), "Final video composed");
    Ok(())
}

/// Recompose an existing job's final video from its surviving clips
/// with fresh BGM/overlay settings.
pub async fn remix_final_video(
    clip_paths: &[PathBuf],
    output: &Path,
    settings: &ComposeSettings,
) -> MediaResult<()> {
    if output.exists() {
        std::fs::remove_file(output)?;
    }
    compose_final_video(clip_paths, output, settings).await
}

/// Title band + traveling watermark pass. Returns the merged input
/// unchanged when neither overlay is requested. Video re-encodes at
/// the final preset/CRF; audio stream-copies.
async fn apply_overlays(
    merged: &Path,
    workdir: &Path,
    settings: &ComposeSettings,
) -> MediaResult<PathBuf> {
    let alias = settings.novel_alias.trim();
    let watermark = &settings.watermark;
    if alias.is_empty() && !watermark.is_enabled() {
        return Ok(merged.to_path_buf());
    }

    let info = probe_video(merged).await?;
    let resolution = (info.width.max(2), info.height.max(2));
    let font = subtitle_font_path(settings.subtitle_font.as_deref());
    let profile = settings.render_mode.profile();
    let output = workdir.join("overlaid.mp4");

    let mut chain: Vec<String> = Vec::new();
    if !alias.is_empty() {
        chain.push(title_band_filter(alias, resolution, font.as_deref()));
    }

    let cmd = if watermark.image_available() {
        // Image watermark needs a second input and a filter graph.
        let mut graph = String::from("[0:v]");
        if chain.is_empty() {
            graph.push_str("null[base];");
        } else {
            graph.push_str(&format!("{}[base];", chain.join(",")));
        }
        graph.push_str(&watermark_image_filter_complex(watermark, "base", "out"));

        FfmpegCommand::new(&output)
            .input(merged)
            .input(watermark.image_path.as_deref().expect("image checked"))
            .filter_complex(graph)
            .map("[out]")
            .map("0:a?")
            .video_codec("libx264")
            .preset(profile.final_preset)
            .crf(profile.final_crf)
            .audio_codec("copy")
            .faststart()
    } else {
        if watermark.is_enabled() {
            chain.push(watermark_text_filter(watermark, resolution, font.as_deref()));
        }
        FfmpegCommand::new(&output)
            .input(merged)
            .video_filter(chain.join(","))
            .video_codec("libx264")
            .preset(profile.final_preset)
            .crf(profile.final_crf)
            .audio_codec("copy")
            .faststart()
    };

    FfmpegRunner::new().run(&cmd).await?;
    Ok(output)
}

/// BGM loop + amix + loudness boost into the final output. Without a
/// usable BGM source only the loudness boost runs, and a failed boost
/// degrades to a plain copy.
async fn mix_bgm_and_finish(
    merged: &Path,
    output: &Path,
    settings: &ComposeSettings,
) -> MediaResult<()> {
    let profile = settings.render_mode.profile();
    let bgm_volume = settings.bgm_volume.clamp(0.0, 1.0);
    let bgm_source = settings
        .bgm_path
        .as_deref()
        .filter(|path| settings.bgm_enabled && bgm_volume > 0.0 && path.exists());

    if let Some(bgm) = bgm_source {
        let filter = format!(
            "[1:a]volume={bgm_volume}[bgm];\
[0:a][bgm]amix=inputs=2:duration=first:dropout_transition=0[tmp];\
[tmp]volume={FINAL_AUDIO_GAIN}[mix]"
        );
        let mut cmd = FfmpegCommand::new(output)
            .input(merged)
            .input_with_args(&["-stream_loop", "-1"], bgm)
            .filter_complex(filter)
            .map("0:v:0")
            .map("[mix]");
        cmd = if profile.bgm_video_copy {
            cmd.video_codec("copy")
        } else {
            cmd.video_codec("libx264")
                .preset(profile.final_preset)
                .crf(profile.final_crf)
        };
        cmd = cmd.audio_codec("aac").audio_bitrate(AUDIO_BITRATE).faststart();
        return FfmpegRunner::new().run(&cmd).await;
    }

    let boost = FfmpegCommand::new(output)
        .input(merged)
        .map("0:v:0")
        .map("0:a:0")
        .video_codec("copy")
        .audio_filter(format!("volume={FINAL_AUDIO_GAIN}"))
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .faststart();
    match FfmpegRunner::new().run(&boost).await {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(error = %err.detail(), "Loudness boost failed, copying merged video");
            std::fs::copy(merged, output)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ComposeSettings {
        ComposeSettings {
            render_mode: RenderMode::Fast,
            bgm_enabled: true,
            bgm_volume: 0.2,
            bgm_path: None,
            novel_alias: String::new(),
            watermark: WatermarkConfig::default(),
            subtitle_font: None,
        }
    }

    #[tokio::test]
    async fn test_existing_output_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("final.mp4");
        std::fs::write(&output, vec![0u8; (FINAL_VIDEO_MIN_BYTES + 1) as usize]).unwrap();

        // No clips and no encoder needed: the size check wins first.
        compose_final_video(&[], &output, &settings()).await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_output_does_not_short_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("final.mp4");
        std::fs::write(&output, vec![0u8; 128]).unwrap();

        let err = compose_final_video(&[], &output, &settings()).await.unwrap_err();
        assert!(matches!(err, MediaError::Internal(_)));
    }
}
