//! Streaming image provider client.
//!
//! The provider is an OpenAI-compatible chat endpoint that streams a
//! CDN URL embedded in delta text. The client sends the prompt plus up
//! to two reference images as base64 data-URLs, extracts the first
//! HTTPS URL after the stream completes, downloads it, and re-encodes
//! the frame as RGB at the target path.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ImageGenError, ImageGenResult};
use crate::prompts::build_image_retry_prompt;

/// Hard per-attempt timeout for the provider stream plus download.
const GENERATION_TIMEOUT_SECS: u64 = 45;

/// Number of generation attempts; the second prepends the English
/// "create one image" wrapper.
const GENERATION_ATTEMPTS: usize = 2;

/// Accepted reference image extensions.
const REFERENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Image provider client.
#[derive(Debug, Clone)]
pub struct ImageClient {
    base_url: String,
    api_key: String,
    model: String,
    http: Client,
}

impl ImageClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http: Client::new(),
        }
    }

    /// Whether an API key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Generate one frame for the prompt into `output_path`.
    ///
    /// Up to two reference image paths are attached for facial
    /// identity. Failure here triggers the resolver's fallback cascade.
    pub async fn generate(
        &self,
        prompt: &str,
        reference_image_paths: &[&Path],
        aspect_ratio: Option<&str>,
        output_path: &Path,
    ) -> ImageGenResult<()> {
        if !self.is_enabled() {
            return Err(ImageGenError::Disabled);
        }

        let mut last_error = ImageGenError::NoImageUrl;
        for attempt in 0..GENERATION_ATTEMPTS {
            let attempt_prompt = if attempt == 0 {
                prompt.to_string()
            } else {
                build_image_retry_prompt(prompt)
            };

            let run = self.generate_once(
                &attempt_prompt,
                reference_image_paths,
                aspect_ratio,
                output_path,
            );
            match tokio::time::timeout(Duration::from_secs(GENERATION_TIMEOUT_SECS), run).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => {
                    warn!(attempt = attempt + 1, error = %err, "Image generation attempt failed");
                    last_error = err;
                }
                Err(_) => {
                    warn!(attempt = attempt + 1, "Image generation attempt timed out");
                    last_error = ImageGenError::Timeout(GENERATION_TIMEOUT_SECS);
                }
            }
        }
        Err(last_error)
    }

    async fn generate_once(
        &self,
        prompt: &str,
        reference_image_paths: &[&Path],
        aspect_ratio: Option<&str>,
        output_path: &Path,
    ) -> ImageGenResult<()> {
        let mut payload = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": build_message_content(prompt, reference_image_paths),
            }],
            "stream": true,
        });
        if let Some(ratio) = aspect_ratio.filter(|r| !r.trim().is_empty()) {
            payload["extra_body"] = json!({ "aspect_ratio": ratio });
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ImageGenError::Provider {
                status: status.as_u16(),
                detail: detail.chars().take(400).collect(),
            });
        }

        // Walk the SSE stream; the last URL-bearing delta wins until
        // the stream ends, then the first extracted URL is used.
        let mut image_url: Option<String> = None;
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                if let Some(url) = parse_sse_line(&line) {
                    image_url.get_or_insert(url);
                }
            }
        }
        if let Some(url) = parse_sse_line(buffer.trim()) {
            image_url.get_or_insert(url);
        }

        let image_url = image_url.ok_or(ImageGenError::NoImageUrl)?;
        debug!(url = %image_url, "Image provider returned URL");
        self.download_as_rgb(&image_url, output_path).await
    }

    async fn download_as_rgb(&self, url: &str, output_path: &Path) -> ImageGenResult<()> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageGenError::Provider {
                status: status.as_u16(),
                detail: format!("image download failed: {url}"),
            });
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let decoded = image::load_from_memory(&bytes)?;
        let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
        rgb.save(output_path)?;
        Ok(())
    }
}

/// Parse one SSE line, returning an embedded HTTPS URL if present.
fn parse_sse_line(line: &str) -> Option<String> {
    let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if line.is_empty() || line == "[DONE]" || !line.starts_with('{') {
        return None;
    }
    let chunk: Value = serde_json::from_str(line).ok()?;
    let content = chunk
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    extract_first_url(content)
}

/// First `http(s)://…` span in a text fragment.
pub fn extract_first_url(text: &str) -> Option<String> {
    let start = text.find("https://").or_else(|| text.find("http://"))?;
    let tail = &text[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || c == ')' || c == ']' || c == '"' || c == '\'')
        .unwrap_or(tail.len());
    let url = &tail[..end];
    if url.len() > "https://".len() {
        Some(url.to_string())
    } else {
        None
    }
}

/// Build the user message content: plain text, or text plus up to two
/// reference image parts as data-URLs.
fn build_message_content(prompt: &str, reference_image_paths: &[&Path]) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    for path in reference_image_paths.iter().take(2) {
        let Some(data_url) = reference_data_url(path) else {
            continue;
        };
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": data_url },
        }));
    }

    if parts.is_empty() {
        return json!(prompt);
    }

    let mut content = vec![json!({ "type": "text", "text": prompt })];
    content.extend(parts);
    json!(content)
}

fn reference_data_url(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if !REFERENCE_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    let mime = if extension == "png" { "image/png" } else { "image/jpeg" };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(format!("data:{mime};base64,{encoded}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_first_url() {
        assert_eq!(
            extract_first_url("here: https://cdn.example.com/a.png done"),
            Some("https://cdn.example.com/a.png".to_string())
        );
        assert_eq!(
            extract_first_url("[link](https://cdn.example.com/a.png)"),
            Some("https://cdn.example.com/a.png".to_string())
        );
        assert_eq!(extract_first_url("no url here"), None);
    }

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"https://cdn.example.com/x.jpg"}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            Some("https://cdn.example.com/x.jpg".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_message_content_without_references() {
        let content = build_message_content("a lone tower", &[]);
        assert_eq!(content, json!("a lone tower"));
    }

    #[test]
    fn test_message_content_with_reference() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = dir.path().join("hero_ref_01.png");
        std::fs::write(&ref_path, b"fake png bytes").unwrap();

        let content = build_message_content("a duel", &[ref_path.as_path()]);
        let parts = content.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_unsupported_reference_extension_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = dir.path().join("hero.bmp");
        std::fs::write(&ref_path, b"x").unwrap();
        let content = build_message_content("a duel", &[ref_path.as_path()]);
        assert_eq!(content, json!("a duel"));
    }

    #[tokio::test]
    async fn test_disabled_client_errors() {
        let dir = tempfile::tempdir().unwrap();
        let client = ImageClient::new("http://localhost:1", "", "nano-banana");
        let err = client
            .generate("x", &[], None, &dir.path().join("out.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageGenError::Disabled));
    }
}
