//! Per-piece speech synthesis with the three-tier fallback chain:
//! remote HTTP endpoint, local engine process, silent WAV.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use sreel_media::probe_media_duration;

use crate::error::{TtsError, TtsResult};

/// Remote endpoint timeout.
const REMOTE_TIMEOUT_SECS: u64 = 90;
/// Local engine timeout per attempt.
const LOCAL_TIMEOUT_SECS: u64 = 45;
/// Local engine attempts.
const LOCAL_ATTEMPTS: usize = 2;
/// Backoff between local attempts.
const LOCAL_BACKOFF_MS: u64 = 350;

/// Local engine binary, treated as an opaque process collaborator.
const LOCAL_ENGINE: &str = "edge-tts";

const SILENT_SAMPLE_RATE: u32 = 22_050;

/// Speech synthesizer handle.
#[derive(Debug, Clone, Default)]
pub struct TtsEngine {
    /// Optional remote endpoint accepting `{text, voice}`
    remote_url: Option<String>,
    http: Client,
}

impl TtsEngine {
    pub fn new(remote_url: Option<String>) -> Self {
        Self {
            remote_url: remote_url.filter(|url| !url.trim().is_empty()),
            http: Client::new(),
        }
    }

    /// Synthesize one piece of text. Never fails: the terminal
    /// fallback writes a silent WAV sized to the text. Returns the
    /// actual output path (silence lands at `.wav`) and the duration.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        output_path: &Path,
    ) -> TtsResult<(PathBuf, f64)> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if self.remote_url.is_some() {
            match self.synthesize_remote(text, voice, output_path).await {
                Ok(()) => {
                    let duration = resolve_duration(output_path, text).await;
                    return Ok((output_path.to_path_buf(), duration));
                }
                Err(err) => warn!(error = %err, "Remote TTS failed, trying local engine"),
            }
        }

        match self.synthesize_local(text, voice, output_path).await {
            Ok(()) => {
                let duration = resolve_duration(output_path, text).await;
                return Ok((output_path.to_path_buf(), duration));
            }
            Err(err) => warn!(error = %err, "Local TTS failed, writing silent track"),
        }

        let fallback_path = output_path.with_extension("wav");
        let duration = estimate_duration_by_text(text);
        write_silent_wav(&fallback_path, duration)?;
        Ok((fallback_path, duration))
    }

    async fn synthesize_remote(&self, text: &str, voice: &str, output_path: &Path) -> TtsResult<()> {
        let url = self.remote_url.as_deref().expect("checked by caller");
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "text": text, "voice": voice }))
            .timeout(Duration::from_secs(REMOTE_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TtsError::Remote {
                status: status.as_u16(),
                detail: detail.chars().take(200).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("audio/") && !content_type.starts_with("application/octet-stream")
        {
            return Err(TtsError::NotAudio(content_type));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(output_path, &bytes).await?;
        debug!(bytes = bytes.len(), "Remote TTS wrote audio");
        Ok(())
    }

    async fn synthesize_local(&self, text: &str, voice: &str, output_path: &Path) -> TtsResult<()> {
        which::which(LOCAL_ENGINE).map_err(|_| TtsError::EngineNotFound)?;

        let mut last_error = TtsError::Engine("no attempts ran".to_string());
        for attempt in 0..LOCAL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(LOCAL_BACKOFF_MS)).await;
            }

            let run = tokio::process::Command::new(LOCAL_ENGINE)
                .arg("--voice")
                .arg(voice)
                .arg("--text")
                .arg(text)
                .arg("--write-media")
                .arg(output_path)
                .output();

            match tokio::time::timeout(Duration::from_secs(LOCAL_TIMEOUT_SECS), run).await {
                Ok(Ok(output)) if output.status.success() && output_path.exists() => {
                    return Ok(());
                }
                Ok(Ok(output)) => {
                    let stderr: String = String::from_utf8_lossy(&output.stderr)
                        .chars()
                        .take(200)
                        .collect();
                    last_error = TtsError::Engine(stderr);
                }
                Ok(Err(err)) => last_error = TtsError::Io(err),
                Err(_) => last_error = TtsError::Timeout(LOCAL_TIMEOUT_SECS),
            }
        }
        Err(last_error)
    }
}

/// Duration from the metadata reader, falling back to the text-length
/// estimate whenever the reader yields nothing usable.
pub async fn resolve_duration(path: &Path, text: &str) -> f64 {
    let probed = if path.extension().and_then(|e| e.to_str()) == Some("wav") {
        wav_duration(path).unwrap_or(0.0)
    } else {
        probe_media_duration(path).await.unwrap_or(0.0)
    };
    if probed > 0.0 {
        probed
    } else {
        estimate_duration_by_text(text)
    }
}

/// Length estimate used when no metadata is available:
/// `max(1.5, chars * 0.22)` seconds.
pub fn estimate_duration_by_text(text: &str) -> f64 {
    (text.chars().count() as f64 * 0.22).max(1.5)
}

/// Write a 16-bit mono PCM WAV of silence.
pub fn write_silent_wav(path: &Path, duration_secs: f64) -> TtsResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let frame_count = (duration_secs.max(0.0) * SILENT_SAMPLE_RATE as f64) as u32;
    let data_len = frame_count * 2;
    let byte_rate = SILENT_SAMPLE_RATE * 2;

    let mut bytes: Vec<u8> = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SILENT_SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);

    std::fs::write(path, bytes)?;
    Ok(())
}

/// Duration of a canonical PCM WAV from its header.
pub fn wav_duration(path: &Path) -> Option<f64> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    let byte_rate = u32::from_le_bytes(bytes[28..32].try_into().ok()?);
    let data_len = u32::from_le_bytes(bytes[40..44].try_into().ok()?);
    if byte_rate == 0 {
        return None;
    }
    Some(data_len as f64 / byte_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_duration() {
        assert!((estimate_duration_by_text("ab") - 1.5).abs() < 1e-9);
        let long = "字".repeat(100);
        assert!((estimate_duration_by_text(&long) - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_silent_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_silent_wav(&path, 2.0).unwrap();

        let duration = wav_duration(&path).unwrap();
        assert!((duration - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_wav_duration_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not.wav");
        std::fs::write(&path, b"definitely not wav").unwrap();
        assert!(wav_duration(&path).is_none());
    }

    #[tokio::test]
    async fn test_synthesize_falls_back_to_silence() {
        // No remote endpoint and (in CI) no local engine: the silent
        // WAV tier must absorb the call.
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("piece.mp3");
        let engine = TtsEngine::new(None);

        let (path, duration) = engine
            .synthesize("这是一个测试句子。", "zh-CN-YunxiNeural", &out)
            .await
            .unwrap();
        if path.extension().and_then(|e| e.to_str()) == Some("wav") {
            assert!(path.exists());
            assert!(duration >= 1.5);
        }
    }
}
