//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::json::extract_json_object;

/// System prompt for every strict-JSON call.
pub const STRICT_JSON_SYSTEM_PROMPT: &str = "You are a strict JSON generator.";

/// System prompt for the scene-reuse selector.
pub const SCENE_REUSE_SELECTOR_SYSTEM_PROMPT: &str =
    "You are a strict JSON selector for scene-image reuse. Output JSON only.";

/// LLM provider client. An empty API key puts the client into the
/// disabled state; callers route into their deterministic fallbacks.
#[derive(Debug, Clone)]
pub struct LlmClient {
    base_url: String,
    api_key: String,
    default_model: String,
    http: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: Option<String>,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            http: Client::new(),
        }
    }

    /// Whether an API key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn resolve_model<'a>(&'a self, model_id: Option<&'a str>) -> &'a str {
        match model_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => &self.default_model,
        }
    }

    /// One chat call; returns the raw assistant content.
    pub async fn chat(
        &self,
        model_id: Option<&str>,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        timeout_secs: u64,
    ) -> LlmResult<String> {
        if !self.is_enabled() {
            return Err(LlmError::Disabled);
        }

        let model = self.resolve_model(model_id);
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
        };

        debug!(model, timeout_secs, "LLM chat call");

        let send = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(Duration::from_secs(timeout_secs))
            .send();
        let response = match tokio::time::timeout(Duration::from_secs(timeout_secs), send).await {
            Ok(result) => result?,
            Err(_) => return Err(LlmError::Timeout(timeout_secs)),
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                status: status.as_u16(),
                detail: detail.chars().take(400).collect(),
            });
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::Unparseable("empty assistant content".to_string()));
        }
        Ok(content)
    }

    /// Strict-JSON chat call; extracts the first JSON object from the
    /// assistant content.
    pub async fn chat_json(
        &self,
        model_id: Option<&str>,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        timeout_secs: u64,
    ) -> LlmResult<Value> {
        let content = self
            .chat(model_id, system_prompt, user_prompt, temperature, timeout_secs)
            .await?;
        extract_json_object(&content)
            .ok_or_else(|| LlmError::Unparseable(content.chars().take(200).collect()))
    }

    /// List available model ids from the provider, sorted. Any failure
    /// yields an empty list; model listing is advisory.
    pub async fn list_models(&self) -> Vec<String> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let request = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(15))
            .send()
            .await;

        let Ok(response) = request else {
            return Vec::new();
        };
        if !response.status().is_success() {
            return Vec::new();
        }
        let Ok(body) = response.json::<ModelsResponse>().await else {
            return Vec::new();
        };

        let mut ids: Vec<String> = body.data.into_iter().filter_map(|entry| entry.id).collect();
        ids.sort();
        ids
    }
}
