//! Whole-segment speech assembly.
//!
//! Splits the segment into dialogue/narration pieces, synthesizes each
//! piece, and stream-copies them into one track via the encoder's
//! concat demuxer. Encoder trouble degrades to a single narrator-voice
//! synthesis of the whole segment. Piece files and the list are always
//! deleted.

use std::path::{Path, PathBuf};

use tracing::warn;

use sreel_media::{concat_stream_copy, probe_media_duration, remove_dir_quietly, write_concat_list};
use sreel_models::Character;

use crate::dialogue::build_tts_pieces;
use crate::error::TtsResult;
use crate::synth::TtsEngine;

/// Synthesize one segment's full audio track at `output_path`.
/// Returns the actual file path and its duration in seconds.
pub async fn synthesize_segment_tts(
    engine: &TtsEngine,
    text: &str,
    characters: &[Character],
    output_path: &Path,
    narrator_voice: &str,
) -> TtsResult<(PathBuf, f64)> {
    let pieces = build_tts_pieces(text, characters, narrator_voice);
    if pieces.is_empty() {
        return engine.synthesize(text, narrator_voice, output_path).await;
    }
    if pieces.len() == 1 {
        let (piece_text, piece_voice) = &pieces[0];
        return engine.synthesize(piece_text, piece_voice, output_path).await;
    }

    if sreel_media::check_ffmpeg().is_err() {
        warn!("Encoder unavailable for TTS concat, narrating whole segment");
        return engine.synthesize(text, narrator_voice, output_path).await;
    }

    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "segment".to_string());
    let parts_dir = output_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}_tts_parts"));
    std::fs::create_dir_all(&parts_dir)?;

    let result = assemble_pieces(engine, &pieces, &parts_dir, output_path).await;
    remove_dir_quietly(&parts_dir);

    match result {
        Ok(bundle) => Ok(bundle),
        Err(err) => {
            warn!(error = %err, "TTS concat failed, narrating whole segment");
            engine.synthesize(text, narrator_voice, output_path).await
        }
    }
}

async fn assemble_pieces(
    engine: &TtsEngine,
    pieces: &[(String, String)],
    parts_dir: &Path,
    output_path: &Path,
) -> TtsResult<(PathBuf, f64)> {
    let mut part_files: Vec<PathBuf> = Vec::with_capacity(pieces.len());
    let mut total_duration = 0.0_f64;

    for (index, (piece_text, piece_voice)) in pieces.iter().enumerate() {
        let part_path = parts_dir.join(format!("part_{index:03}.mp3"));
        let (actual_path, duration) = engine.synthesize(piece_text, piece_voice, &part_path).await?;
        part_files.push(actual_path);
        total_duration += duration.max(0.0);
    }

    let list_path = parts_dir.join("concat_list.txt");
    write_concat_list(&part_files, &list_path)
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    concat_stream_copy(&list_path, output_path)
        .await
        .map_err(|err| std::io::Error::other(err.detail()))?;

    let probed = probe_media_duration(output_path).await.unwrap_or(0.0);
    let duration = if probed > 0.0 { probed } else { total_duration };
    Ok((output_path.to_path_buf(), duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sreel_models::NARRATOR_VOICE_ID;

    #[tokio::test]
    async fn test_narration_only_single_piece_path() {
        // One piece never touches the concat machinery, so this works
        // without an encoder; silence absorbs missing TTS engines.
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("segment_0000.mp3");
        let engine = TtsEngine::new(None);

        let (path, duration) = synthesize_segment_tts(
            &engine,
            "夜色渐深，城市安静下来。",
            &[],
            &out,
            NARRATOR_VOICE_ID,
        )
        .await
        .unwrap();
        assert!(path.exists());
        assert!(duration > 0.0);
    }
}
