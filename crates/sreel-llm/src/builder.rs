//! LLM-backed prompt building: world summary, character analysis,
//! per-segment image prompt bundles, alias suggestions, and smart
//! segmentation.
//!
//! Every call here uses the strict-JSON system prompt and the two-pass
//! JSON extractor. The segment bundle never fails: any provider or
//! parse problem routes into a deterministic fallback bundle.

use serde_json::Value;
use tracing::{debug, warn};

use sreel_models::{is_catalog_voice, recommend_voice, Character, VOICES};

use crate::client::{LlmClient, STRICT_JSON_SYSTEM_PROMPT};
use crate::error::{LlmError, LlmResult};
use crate::json::{bool_field, f64_field, str_field, string_list_field};
use crate::prompts::{
    build_alias_prompt, build_character_analysis_prompt, build_character_identity_guard,
    build_fallback_segment_image_prompt, build_final_segment_image_prompt,
    build_smart_segmentation_prompt, build_story_world_summary_prompt, truncate_chars,
    SEGMENT_IMAGE_BUNDLE_RULES,
};

const WORLD_SUMMARY_TIMEOUT_SECS: u64 = 45;
const CHARACTER_ANALYSIS_TIMEOUT_SECS: u64 = 60;
const SEGMENT_BUNDLE_TIMEOUT_SECS: u64 = 45;
const ALIAS_TIMEOUT_SECS: u64 = 45;
const SMART_SEGMENT_TIMEOUT_SECS: u64 = 60;

/// Markers that identify a first-person narrated story.
const FIRST_PERSON_MARKERS: &[&str] = &["我", "我们", "吾"];

/// Location markers for the deterministic metadata fallback.
const LOCATION_MARKERS: &[&str] = &[
    "在", "于", "到", "来到", "进入", "房间", "街", "学校", "公园", "森林", "办公室", "家",
];

/// Stopwords excluded from fallback name extraction and aliases.
const NAME_STOPWORDS: &[&str] = &[
    "小说", "故事", "今天", "这个", "一个", "自己", "我们", "他们", "什么", "没有",
];

/// Strict scene metadata attached to every generated frame, used by
/// the scene cache for reuse matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneMetadata {
    pub action_hint: String,
    pub location_hint: String,
    pub scene_elements: Vec<String>,
    pub action_keywords: Vec<String>,
    pub location_keywords: Vec<String>,
    pub mood: String,
    pub shot_type: String,
    pub is_scene_only: bool,
}

/// Which cast members the LLM believes act in a segment, by candidate
/// index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterAssignment {
    pub primary_index: Option<usize>,
    pub related_indexes: Vec<usize>,
    pub confidence: f32,
    pub reason: String,
}

/// Everything the per-segment pipeline needs from the prompt builder.
#[derive(Debug, Clone)]
pub struct PromptBundle {
    /// Production-ready English image prompt, identity-guarded
    pub prompt: String,
    pub metadata: SceneMetadata,
    pub assignment: CharacterAssignment,
}

/// One English sentence capturing era/culture/costume/props, or None
/// when the provider is unavailable or unparseable.
pub async fn summarize_story_world_context(
    client: &LlmClient,
    text: &str,
    model_id: Option<&str>,
) -> Option<String> {
    let prompt = build_story_world_summary_prompt(text);
    let value = client
        .chat_json(
            model_id,
            STRICT_JSON_SYSTEM_PROMPT,
            &prompt,
            0.2,
            WORLD_SUMMARY_TIMEOUT_SECS,
        )
        .await
        .ok()?;
    let summary = str_field(&value, "world_summary");
    if summary.is_empty() {
        None
    } else {
        Some(summary)
    }
}

/// Analyze the cast of a text. Returns `(characters, confidence,
/// model_used)`.
///
/// With no provider configured the deterministic name-frequency
/// fallback runs; with a provider, failures bubble so the caller can
/// surface upstream detail. Either way the identity flags are
/// post-processed to at most one main and at most one story-self.
pub async fn analyze_characters(
    client: &LlmClient,
    text: &str,
    depth: &str,
    model_id: Option<&str>,
) -> LlmResult<(Vec<Character>, f32, String)> {
    let model_used = model_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(client.default_model())
        .to_string();

    if !client.is_enabled() {
        let mut characters = fallback_character_analysis(text);
        enforce_identity_flags(&mut characters, text);
        return Ok((characters, 0.42, model_used));
    }

    let allowed_ids = VOICES
        .iter()
        .map(|voice| voice.id)
        .collect::<Vec<_>>()
        .join(", ");
    let voice_lines = VOICES
        .iter()
        .map(|voice| {
            format!(
                "{} — {} ({} / {}): {}",
                voice.id, voice.name, voice.gender, voice.age, voice.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let prompt =
        build_character_analysis_prompt(text, depth, &allowed_ids, &voice_lines, None);

    let value = client
        .chat_json(
            model_id,
            STRICT_JSON_SYSTEM_PROMPT,
            &prompt,
            0.2,
            CHARACTER_ANALYSIS_TIMEOUT_SECS,
        )
        .await?;

    let raw_items = value
        .get("characters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let confidence = f64_field(&value, "confidence", 0.75).clamp(0.0, 1.0) as f32;

    let mut characters: Vec<Character> = Vec::new();
    for raw in &raw_items {
        let name = str_field(raw, "name");
        if name.is_empty() {
            continue;
        }
        let role = {
            let role = str_field(raw, "role");
            if role.is_empty() {
                "配角".to_string()
            } else {
                role
            }
        };
        let personality = str_field(raw, "personality");
        let voice_id = {
            let suggested = str_field(raw, "voice_id");
            if is_catalog_voice(&suggested) {
                suggested
            } else {
                recommend_voice(&role, &personality).to_string()
            }
        };
        let base_prompt = {
            let base = str_field(raw, "base_prompt");
            if base.is_empty() {
                format!("{name} 人像")
            } else {
                base
            }
        };
        characters.push(Character {
            name,
            role,
            importance: f64_field(raw, "importance", 5.0).round().clamp(1.0, 10.0) as u8,
            is_main_character: bool_field(raw, "is_main_character"),
            is_story_self: bool_field(raw, "is_story_self"),
            appearance: str_field(raw, "appearance"),
            personality,
            base_prompt,
            reference_image_path: None,
            voice_id,
        });
        if characters.len() >= 5 {
            break;
        }
    }

    if characters.is_empty() {
        return Err(LlmError::Unparseable("empty character list".to_string()));
    }
    enforce_identity_flags(&mut characters, text);
    Ok((characters, confidence, model_used))
}

/// Keep at most one `is_main_character` and one `is_story_self`; if no
/// main is marked, the highest-importance character becomes main.
/// `is_story_self` is granted only when the text actually reads as
/// first-person.
pub fn enforce_identity_flags(characters: &mut [Character], text: &str) {
    if characters.is_empty() {
        return;
    }

    let best = characters
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| c.importance)
        .map(|(index, _)| index)
        .unwrap_or(0);

    let mut main_seen = false;
    for character in characters.iter_mut() {
        if character.is_main_character {
            if main_seen {
                character.is_main_character = false;
            }
            main_seen = true;
        }
    }
    if !main_seen {
        characters[best].is_main_character = true;
    }

    let first_person = contains_first_person(text);
    let mut self_seen = false;
    for character in characters.iter_mut() {
        if character.is_story_self {
            if self_seen || !first_person {
                character.is_story_self = false;
            } else {
                self_seen = true;
            }
        }
    }
    if !self_seen && first_person {
        let main = characters
            .iter_mut()
            .find(|c| c.is_main_character)
            .expect("main character enforced above");
        main.is_story_self = true;
    }
}

/// Whether the text carries first-person narration markers.
pub fn contains_first_person(text: &str) -> bool {
    FIRST_PERSON_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Deterministic cast extraction by Han-name frequency, used when the
/// provider is disabled.
pub fn fallback_character_analysis(text: &str) -> Vec<Character> {
    let mut names: Vec<String> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    for run in han_runs(text) {
        let chars: Vec<char> = run.chars().collect();
        let mut cursor = 0usize;
        while cursor < chars.len() {
            let remaining = chars.len() - cursor;
            let take = if remaining >= 3 {
                3
            } else if remaining == 2 {
                2
            } else {
                break;
            };
            let name: String = chars[cursor..cursor + take].iter().collect();
            cursor += take;
            if NAME_STOPWORDS.contains(&name.as_str()) {
                continue;
            }
            if seen.insert(name.clone()) {
                names.push(name);
            }
            if names.len() >= 5 {
                break;
            }
        }
        if names.len() >= 5 {
            break;
        }
    }

    if names.is_empty() {
        names.push("旁白".to_string());
    }

    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let role = if index == 0 { "主角" } else { "配角" };
            let personality = if index == 0 { "冷静、果断" } else { "温和、友善" };
            let voice = recommend_voice(role, personality);
            Character {
                name: name.clone(),
                role: role.to_string(),
                importance: (10u8.saturating_sub(index as u8)).max(5),
                is_main_character: false,
                is_story_self: false,
                appearance: String::new(),
                personality: personality.to_string(),
                base_prompt: format!("{name}，{personality}，小说场景人物肖像"),
                reference_image_path: None,
                voice_id: voice.to_string(),
            }
        })
        .collect()
}

fn han_runs(text: &str) -> Vec<String> {
    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if ('\u{4e00}'..='\u{9fff}').contains(&c) {
            current.push(c);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Build the per-segment prompt bundle: image prompt, scene metadata,
/// and character assignment. Never fails; provider problems yield the
/// deterministic fallback bundle.
#[allow(clippy::too_many_arguments)]
pub async fn build_segment_image_bundle(
    client: &LlmClient,
    character: &Character,
    segment_text: &str,
    adjacent_segments: &[String],
    character_candidates: &[Character],
    default_assignment: &CharacterAssignment,
    story_world_context: Option<&str>,
    model_id: Option<&str>,
) -> PromptBundle {
    let guard = build_character_identity_guard(
        &character.name,
        &character.appearance,
        &character.personality,
        character.has_reference(),
    );

    if !client.is_enabled() {
        return fallback_bundle(&guard, segment_text, story_world_context, default_assignment);
    }

    let candidates_json: Vec<Value> = character_candidates
        .iter()
        .enumerate()
        .map(|(index, c)| {
            serde_json::json!({
                "index": index,
                "name": c.name,
                "role": c.role,
                "importance": c.importance,
                "appearance": c.appearance,
                "has_reference_image": c.has_reference(),
            })
        })
        .collect();

    let user_prompt = serde_json::json!({
        "task": "build_segment_image_bundle",
        "rules": SEGMENT_IMAGE_BUNDLE_RULES,
        "character": {
            "name": character.name,
            "role": character.role,
            "appearance": character.appearance,
            "personality": character.personality,
            "base_prompt": character.base_prompt,
            "has_reference_image": character.has_reference(),
        },
        "character_candidates": candidates_json,
        "default_primary_index": default_assignment.primary_index,
        "default_related_indexes": default_assignment.related_indexes,
        "segment_text": truncate_chars(segment_text, 2000),
        "adjacent_segments": adjacent_segments
            .iter()
            .map(|s| truncate_chars(s, 400))
            .collect::<Vec<_>>(),
        "story_world_context": story_world_context.unwrap_or(""),
        "output_schema": {
            "prompt": "",
            "metadata": {
                "action_hint": "",
                "location_hint": "",
                "scene_elements": [],
                "action_keywords": [],
                "location_keywords": [],
                "mood": "",
                "shot_type": "",
                "is_scene_only": false
            },
            "character_assignment": {
                "primary_index": 0,
                "related_indexes": [],
                "confidence": 0.0,
                "reason": ""
            }
        }
    });

    let response = client
        .chat_json(
            model_id,
            STRICT_JSON_SYSTEM_PROMPT,
            &user_prompt.to_string(),
            0.3,
            SEGMENT_BUNDLE_TIMEOUT_SECS,
        )
        .await;

    let value = match response {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Segment bundle call failed, using fallback bundle");
            return fallback_bundle(&guard, segment_text, story_world_context, default_assignment);
        }
    };

    let candidate_prompt = str_field(&value, "prompt");
    if candidate_prompt.is_empty() {
        return fallback_bundle(&guard, segment_text, story_world_context, default_assignment);
    }

    let metadata = value
        .get("metadata")
        .map(parse_scene_metadata)
        .unwrap_or_else(|| fallback_scene_metadata(segment_text));
    let assignment = value
        .get("character_assignment")
        .map(|raw| parse_assignment(raw, character_candidates.len(), default_assignment))
        .unwrap_or_else(|| default_assignment.clone());

    debug!(
        action = %metadata.action_hint,
        scene_only = metadata.is_scene_only,
        "Segment bundle built"
    );

    PromptBundle {
        prompt: build_final_segment_image_prompt(
            &guard,
            segment_text,
            &candidate_prompt,
            story_world_context,
        ),
        metadata,
        assignment,
    }
}

fn parse_scene_metadata(raw: &Value) -> SceneMetadata {
    SceneMetadata {
        action_hint: str_field(raw, "action_hint"),
        location_hint: str_field(raw, "location_hint"),
        scene_elements: string_list_field(raw, "scene_elements"),
        action_keywords: string_list_field(raw, "action_keywords"),
        location_keywords: string_list_field(raw, "location_keywords"),
        mood: str_field(raw, "mood"),
        shot_type: str_field(raw, "shot_type"),
        is_scene_only: bool_field(raw, "is_scene_only"),
    }
}

fn parse_assignment(
    raw: &Value,
    candidate_count: usize,
    default_assignment: &CharacterAssignment,
) -> CharacterAssignment {
    let primary_index = raw
        .get("primary_index")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .filter(|index| *index < candidate_count);
    if primary_index.is_none() {
        return default_assignment.clone();
    }

    let related_indexes: Vec<usize> = raw
        .get("related_indexes")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_u64)
                .map(|v| v as usize)
                .filter(|index| *index < candidate_count && Some(*index) != primary_index)
                .collect()
        })
        .unwrap_or_default();

    CharacterAssignment {
        primary_index,
        related_indexes,
        confidence: f64_field(raw, "confidence", 0.0).clamp(0.0, 1.0) as f32,
        reason: str_field(raw, "reason"),
    }
}

fn fallback_bundle(
    guard: &str,
    segment_text: &str,
    story_world_context: Option<&str>,
    default_assignment: &CharacterAssignment,
) -> PromptBundle {
    PromptBundle {
        prompt: build_fallback_segment_image_prompt(guard, segment_text, story_world_context),
        metadata: fallback_scene_metadata(segment_text),
        assignment: default_assignment.clone(),
    }
}

/// Best-effort metadata without the LLM: first punctuation-delimited
/// phrase as the action hint, location from a fixed marker list.
pub fn fallback_scene_metadata(segment_text: &str) -> SceneMetadata {
    let sentence: String = segment_text.split_whitespace().collect::<Vec<_>>().join(" ");
    let parts: Vec<&str> = sentence
        .split(['。', '！', '？', '；', '，', ',', '!', '?', ';'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let action_hint = parts
        .first()
        .map(|part| truncate_chars(part, 180).to_string())
        .unwrap_or_else(|| truncate_chars(&sentence, 180).to_string());

    let location_hint = parts
        .iter()
        .skip(1)
        .find(|part| LOCATION_MARKERS.iter().any(|marker| part.contains(marker)))
        .map(|part| truncate_chars(part, 180).to_string())
        .unwrap_or_default();

    SceneMetadata {
        action_hint,
        location_hint,
        ..SceneMetadata::default()
    }
}

/// LLM-planned segmentation. Errors bubble so the caller can fall back
/// to deterministic grouping.
pub async fn smart_segments(
    client: &LlmClient,
    text: &str,
    model_id: Option<&str>,
) -> LlmResult<Vec<String>> {
    let prompt = build_smart_segmentation_prompt(text);
    let value = client
        .chat_json(
            model_id,
            STRICT_JSON_SYSTEM_PROMPT,
            &prompt,
            0.2,
            SMART_SEGMENT_TIMEOUT_SECS,
        )
        .await?;
    let segments = string_list_field(&value, "segments");
    if segments.is_empty() {
        return Err(LlmError::Unparseable("empty segments list".to_string()));
    }
    Ok(segments)
}

/// Suggest novel aliases: exactly `count` strings of 4–8 Han
/// characters, no digits/letters/punctuation, stopword-filtered.
/// No silent fallback; provider and validation failures bubble.
pub async fn suggest_aliases(
    client: &LlmClient,
    text: &str,
    count: u32,
    model_id: Option<&str>,
) -> LlmResult<Vec<String>> {
    let count = count.clamp(1, 20);
    let prompt = build_alias_prompt(text, count);
    let value = client
        .chat_json(
            model_id,
            STRICT_JSON_SYSTEM_PROMPT,
            &prompt,
            0.6,
            ALIAS_TIMEOUT_SECS,
        )
        .await?;

    let mut aliases: Vec<String> = Vec::new();
    for alias in string_list_field(&value, "aliases") {
        if !is_valid_alias(&alias) {
            continue;
        }
        if NAME_STOPWORDS.contains(&alias.as_str()) {
            continue;
        }
        if !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }

    if (aliases.len() as u32) < count {
        return Err(LlmError::Unparseable(format!(
            "expected {count} aliases, got {}",
            aliases.len()
        )));
    }
    aliases.truncate(count as usize);
    Ok(aliases)
}

fn is_valid_alias(alias: &str) -> bool {
    let chars: Vec<char> = alias.chars().collect();
    (4..=8).contains(&chars.len())
        && chars.iter().all(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, importance: u8) -> Character {
        let mut c = Character::narrator();
        c.name = name.to_string();
        c.importance = importance;
        c.is_main_character = false;
        c
    }

    #[test]
    fn test_enforce_flags_picks_highest_importance_main() {
        let mut cast = vec![named("甲", 4), named("乙", 9), named("丙", 6)];
        enforce_identity_flags(&mut cast, "第三人称故事。");
        assert_eq!(cast.iter().filter(|c| c.is_main_character).count(), 1);
        assert!(cast[1].is_main_character);
        assert_eq!(cast.iter().filter(|c| c.is_story_self).count(), 0);
    }

    #[test]
    fn test_enforce_flags_demotes_duplicate_mains() {
        let mut cast = vec![named("甲", 4), named("乙", 9)];
        cast[0].is_main_character = true;
        cast[1].is_main_character = true;
        enforce_identity_flags(&mut cast, "他们的故事。");
        assert_eq!(cast.iter().filter(|c| c.is_main_character).count(), 1);
        assert!(cast[0].is_main_character);
    }

    #[test]
    fn test_enforce_flags_sets_story_self_for_first_person() {
        let mut cast = vec![named("甲", 4), named("乙", 9)];
        enforce_identity_flags(&mut cast, "我推开门，看见乙站在那里。");
        assert_eq!(cast.iter().filter(|c| c.is_story_self).count(), 1);
        assert!(cast[1].is_story_self);
    }

    #[test]
    fn test_fallback_analysis_extracts_names() {
        let cast = fallback_character_analysis("林远看着苏晚。林远笑了。");
        assert!(!cast.is_empty());
        assert!(cast.len() <= 5);
        assert_eq!(cast[0].role, "主角");
        assert!(cast[0].importance >= 5);
    }

    #[test]
    fn test_fallback_analysis_empty_text_yields_narrator() {
        let cast = fallback_character_analysis("abc 123");
        assert_eq!(cast[0].name, "旁白");
    }

    #[test]
    fn test_fallback_metadata_action_and_location() {
        let metadata = fallback_scene_metadata("林远拔刀，在森林里狂奔。");
        assert_eq!(metadata.action_hint, "林远拔刀");
        assert_eq!(metadata.location_hint, "在森林里狂奔");
        assert!(!metadata.is_scene_only);
    }

    #[test]
    fn test_fallback_metadata_without_location() {
        let metadata = fallback_scene_metadata("他大笑。");
        assert_eq!(metadata.action_hint, "他大笑");
        assert!(metadata.location_hint.is_empty());
    }

    #[test]
    fn test_alias_validation() {
        assert!(is_valid_alias("雪夜孤灯"));
        assert!(!is_valid_alias("雪夜"));
        assert!(!is_valid_alias("snow夜孤灯"));
        assert!(!is_valid_alias("雪夜孤灯照九州路远"));
    }

    #[tokio::test]
    async fn test_bundle_fallback_when_disabled() {
        let client = LlmClient::new("http://localhost:1", "", "gpt-4o-mini");
        let character = named("林远", 9);
        let assignment = CharacterAssignment {
            primary_index: Some(0),
            ..CharacterAssignment::default()
        };
        let bundle = build_segment_image_bundle(
            &client,
            &character,
            "林远拔刀，在森林里狂奔。",
            &[],
            std::slice::from_ref(&character),
            &assignment,
            None,
            None,
        )
        .await;
        assert!(bundle.prompt.contains("林远拔刀"));
        assert_eq!(bundle.metadata.action_hint, "林远拔刀");
        assert_eq!(bundle.assignment.primary_index, Some(0));
    }
}
