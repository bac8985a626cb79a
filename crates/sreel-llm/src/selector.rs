//! LLM selector for scene-image reuse.
//!
//! The scene cache hands this module a target descriptor and a ranked
//! candidate shortlist as JSON; the selector asks the provider to pick
//! one id under strict or lenient rules. Any failure is a "no pick":
//! cache lookups never fail a job because the selector misbehaved.

use serde_json::Value;
use tracing::warn;

use crate::client::{LlmClient, SCENE_REUSE_SELECTOR_SYSTEM_PROMPT};
use crate::json::{bool_field, f64_field, str_field};
use crate::prompts::{SCENE_REUSE_SELECTOR_RULES_LENIENT, SCENE_REUSE_SELECTOR_RULES_STRICT};

const SELECTOR_TIMEOUT_SECS: u64 = 45;

/// Selector strictness. Strict is the primary lookup; lenient is the
/// forced pick used by the generation-failure fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    Strict,
    Lenient,
}

/// The selector's pick, before the cache re-verifies it.
#[derive(Debug, Clone)]
pub struct SelectorVerdict {
    pub selected_id: String,
    pub confidence: f32,
    pub reason: String,
}

/// Ask the provider to select one candidate id. `target` and
/// `candidates` are pre-serialized descriptor JSON from the cache.
pub async fn select_scene_candidate(
    client: &LlmClient,
    target: &Value,
    candidates: &[Value],
    mode: SelectorMode,
    model_id: Option<&str>,
) -> Option<SelectorVerdict> {
    if !client.is_enabled() || candidates.is_empty() {
        return None;
    }

    let rules: &[&str] = match mode {
        SelectorMode::Strict => SCENE_REUSE_SELECTOR_RULES_STRICT,
        SelectorMode::Lenient => SCENE_REUSE_SELECTOR_RULES_LENIENT,
    };

    let user_prompt = serde_json::json!({
        "task": "select_reusable_scene_image",
        "rule": rules,
        "target": target,
        "candidates": candidates,
        "output_schema": {
            "should_reuse": true,
            "selected_id": "candidate-id-or-null",
            "confidence": 0.0,
            "reason": "short reason",
        },
    });

    let response = client
        .chat_json(
            model_id,
            SCENE_REUSE_SELECTOR_SYSTEM_PROMPT,
            &user_prompt.to_string(),
            0.0,
            SELECTOR_TIMEOUT_SECS,
        )
        .await;

    let value = match response {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Scene reuse selector call failed");
            return None;
        }
    };

    if !bool_field(&value, "should_reuse") {
        return None;
    }
    let selected_id = str_field(&value, "selected_id");
    if selected_id.is_empty() || selected_id == "null" {
        return None;
    }

    Some(SelectorVerdict {
        selected_id,
        confidence: f64_field(&value, "confidence", 0.0).clamp(0.0, 1.0) as f32,
        reason: {
            let reason: String = str_field(&value, "reason").chars().take(240).collect();
            reason
        },
    })
}
