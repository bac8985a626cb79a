//! Concat demuxer plumbing.

use std::path::{Path, PathBuf};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Write a concat demuxer list file for the given media files.
///
/// Paths are absolute and single-quoted with embedded quotes escaped
/// the way the demuxer expects.
pub fn write_concat_list(paths: &[PathBuf], list_path: &Path) -> MediaResult<()> {
    let mut lines = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.clone()));
        }
        let absolute = std::fs::canonicalize(path)?;
        let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
        lines.push(format!("file '{escaped}'"));
    }
    if let Some(parent) = list_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(list_path, lines.join("\n"))?;
    Ok(())
}

/// Stream-copy all inputs of a concat list into one file.
pub async fn concat_stream_copy(list_path: &Path, output: &Path) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(output)
        .input_with_args(&["-f", "concat", "-safe", "0"], list_path)
        .stream_copy()
        .faststart();
    FfmpegRunner::new().run(&cmd).await
}

/// Re-encode concat for when stream copy is not possible (mismatched
/// clip parameters or a failed copy pass).
pub async fn concat_reencode(
    list_path: &Path,
    output: &Path,
    preset: &str,
    crf: &str,
    audio_bitrate: &str,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(output)
        .input_with_args(&["-f", "concat", "-safe", "0"], list_path)
        .video_codec("libx264")
        .preset(preset)
        .crf(crf)
        .audio_codec("aac")
        .audio_bitrate(audio_bitrate)
        .faststart();
    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_quotes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a'clip.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"x").unwrap();

        let list = dir.path().join("list.txt");
        write_concat_list(&[a, b], &list).unwrap();

        let content = std::fs::read_to_string(&list).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("file '"));
        assert!(lines[0].contains("'\\''"));
    }

    #[test]
    fn test_concat_list_rejects_missing_clip() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_concat_list(
            &[dir.path().join("missing.mp4")],
            &dir.path().join("list.txt"),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
