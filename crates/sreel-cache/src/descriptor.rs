//! Scene descriptors and match profiles.
//!
//! A descriptor is the normalized structured form of a scene used for
//! cache keying; the match profile precomputes token sets and the
//! character key so lookups never re-derive them.

use serde::{Deserialize, Serialize};

use sreel_models::Character;

/// Size caps applied during normalization.
const SCENE_ELEMENTS_CAP: usize = 12;
const ACTION_KEYWORDS_CAP: usize = 10;
const LOCATION_KEYWORDS_CAP: usize = 8;
const SHORT_TEXT_CAP: usize = 80;
const HINT_CAP: usize = 180;
const SEGMENT_EXCERPT_CAP: usize = 600;

/// Token caps for the match profile.
const ACTION_TOKENS_CAP: usize = 24;
const LOCATION_TOKENS_CAP: usize = 16;
const SCENE_TOKENS_CAP: usize = 40;

/// Normalized structured form of a scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub character_name: String,
    pub character_role: String,
    #[serde(default)]
    pub reference_image_paths: Vec<String>,
    #[serde(default)]
    pub reference_image_ids: Vec<String>,
    pub action_hint: String,
    pub location_hint: String,
    pub segment_text: String,
    #[serde(default)]
    pub scene_elements: Vec<String>,
    #[serde(default)]
    pub action_keywords: Vec<String>,
    #[serde(default)]
    pub location_keywords: Vec<String>,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub shot_type: String,
    #[serde(default)]
    pub is_scene_only: bool,
}

/// Precomputed token sets and character key for one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchProfile {
    #[serde(default)]
    pub action_tokens: Vec<String>,
    #[serde(default)]
    pub location_tokens: Vec<String>,
    #[serde(default)]
    pub scene_tokens: Vec<String>,
    /// md5 of the first reference-image id, else the first reference
    /// path; empty without references
    #[serde(default)]
    pub character_key: String,
}

/// Lowercase and collapse whitespace runs to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn cap_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

/// Normalize a reference path: forward slashes, lowercased.
pub fn normalize_reference_path(path: &str) -> String {
    path.trim().replace('\\', "/").to_lowercase()
}

/// Derive the stable reference-image id: the file stem's suffix after
/// the last `_`, lowercased. The id only changes when the reference
/// file itself is replaced, surviving renames of the path prefix.
pub fn reference_image_id(path: &str) -> Option<String> {
    let normalized = normalize_reference_path(path);
    let basename = normalized.rsplit('/').next()?;
    let stem = basename.rsplit_once('.').map(|(s, _)| s).unwrap_or(basename);
    if stem.is_empty() {
        return None;
    }
    let id = stem.rsplit('_').next().unwrap_or(stem);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Dedup by lowercase while preserving first-seen order, capping size.
fn normalize_keyword_list(items: &[String], cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let normalized = normalize_text(item);
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
        if out.len() >= cap {
            break;
        }
    }
    out
}

/// Tokenize mixed CJK/ASCII text: ASCII word runs of length >= 2 are
/// tokens; CJK runs emit the full run plus every character bigram so
/// common-token counting works for Chinese phrases.
pub fn tokenize(text: &str) -> Vec<String> {
    enum Run {
        Ascii(String),
        Cjk(Vec<char>),
    }

    let normalized = normalize_text(text);
    let mut runs: Vec<Run> = Vec::new();
    for c in normalized.chars() {
        if c.is_ascii_alphanumeric() {
            match runs.last_mut() {
                Some(Run::Ascii(run)) => run.push(c),
                _ => runs.push(Run::Ascii(c.to_string())),
            }
        } else if ('\u{4e00}'..='\u{9fff}').contains(&c) {
            match runs.last_mut() {
                Some(Run::Cjk(run)) => run.push(c),
                _ => runs.push(Run::Cjk(vec![c])),
            }
        } else {
            // Any other char breaks the current run.
            runs.push(Run::Ascii(String::new()));
        }
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut push = |token: String, tokens: &mut Vec<String>| {
        if token.chars().count() >= 2 && seen.insert(token.clone()) {
            tokens.push(token);
        }
    };

    for run in &runs {
        match run {
            Run::Ascii(word) => push(word.clone(), &mut tokens),
            Run::Cjk(chars) => {
                push(chars.iter().collect(), &mut tokens);
                for pair in chars.windows(2) {
                    push(pair.iter().collect(), &mut tokens);
                }
            }
        }
    }
    tokens
}

fn capped_tokens(sources: &[&str], cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for source in sources {
        for token in tokenize(source) {
            if seen.insert(token.clone()) {
                out.push(token);
            }
            if out.len() >= cap {
                return out;
            }
        }
    }
    out
}

/// Build the normalized descriptor for one segment's scene.
pub fn build_scene_descriptor(
    character: &Character,
    related_characters: &[&Character],
    segment_text: &str,
    action_hint: &str,
    location_hint: &str,
    scene_elements: &[String],
    action_keywords: &[String],
    location_keywords: &[String],
    mood: &str,
    shot_type: &str,
    is_scene_only: bool,
) -> SceneDescriptor {
    let mut reference_image_paths: Vec<String> = Vec::new();
    for candidate in std::iter::once(character).chain(related_characters.iter().copied()) {
        if let Some(path) = candidate.reference_image_path.as_deref() {
            let normalized = normalize_reference_path(path);
            if !normalized.is_empty() && !reference_image_paths.contains(&normalized) {
                reference_image_paths.push(normalized);
            }
        }
    }
    let reference_image_ids: Vec<String> = {
        let mut ids = Vec::new();
        for path in &reference_image_paths {
            if let Some(id) = reference_image_id(path) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    };

    SceneDescriptor {
        character_name: normalize_text(&character.name),
        character_role: normalize_text(&character.role),
        reference_image_paths,
        reference_image_ids,
        action_hint: cap_chars(&normalize_text(action_hint), HINT_CAP),
        location_hint: cap_chars(&normalize_text(location_hint), HINT_CAP),
        segment_text: cap_chars(&normalize_text(segment_text), SEGMENT_EXCERPT_CAP),
        scene_elements: normalize_keyword_list(scene_elements, SCENE_ELEMENTS_CAP),
        action_keywords: normalize_keyword_list(action_keywords, ACTION_KEYWORDS_CAP),
        location_keywords: normalize_keyword_list(location_keywords, LOCATION_KEYWORDS_CAP),
        mood: cap_chars(&normalize_text(mood), SHORT_TEXT_CAP),
        shot_type: cap_chars(&normalize_text(shot_type), SHORT_TEXT_CAP),
        is_scene_only,
    }
}

/// Precompute the match profile for a descriptor.
pub fn build_match_profile(descriptor: &SceneDescriptor) -> MatchProfile {
    let action_keyword_text = descriptor.action_keywords.join(" ");
    let location_keyword_text = descriptor.location_keywords.join(" ");
    let scene_element_text = descriptor.scene_elements.join(" ");

    let character_key = descriptor
        .reference_image_ids
        .first()
        .or(descriptor.reference_image_paths.first())
        .map(|seed| format!("{:x}", md5::compute(seed.as_bytes())))
        .unwrap_or_default();

    MatchProfile {
        action_tokens: capped_tokens(
            &[descriptor.action_hint.as_str(), action_keyword_text.as_str()],
            ACTION_TOKENS_CAP,
        ),
        location_tokens: capped_tokens(
            &[
                descriptor.location_hint.as_str(),
                location_keyword_text.as_str(),
            ],
            LOCATION_TOKENS_CAP,
        ),
        scene_tokens: capped_tokens(
            &[
                scene_element_text.as_str(),
                descriptor.mood.as_str(),
                descriptor.shot_type.as_str(),
                descriptor.segment_text.as_str(),
            ],
            SCENE_TOKENS_CAP,
        ),
        character_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello   World "), "hello world");
        assert_eq!(normalize_text("她 走 了"), "她 走 了");
    }

    #[test]
    fn test_reference_image_id_from_suffix() {
        assert_eq!(
            reference_image_id("assets/refs/hero_ref_A1b2.png"),
            Some("a1b2".to_string())
        );
        assert_eq!(
            reference_image_id("C:\\Refs\\Hero_77.JPG"),
            Some("77".to_string())
        );
        assert_eq!(reference_image_id("refs/plain.png"), Some("plain".to_string()));
    }

    #[test]
    fn test_reference_id_survives_prefix_rename() {
        let a = reference_image_id("old/dir/hero_ref_a1b2.png");
        let b = reference_image_id("new/other/renamed_a1b2.png");
        assert_eq!(a, b);
    }

    #[test]
    fn test_keyword_caps_and_dedup() {
        let raw: Vec<String> = (0..20).map(|i| format!("元素{i}")).collect();
        let mut with_dup = raw.clone();
        with_dup.push("元素0".to_string());
        let capped = normalize_keyword_list(&with_dup, 12);
        assert_eq!(capped.len(), 12);
        assert_eq!(capped[0], "元素0");
    }

    #[test]
    fn test_tokenize_cjk_bigrams() {
        let tokens = tokenize("拔刀狂奔");
        assert!(tokens.contains(&"拔刀狂奔".to_string()));
        assert!(tokens.contains(&"拔刀".to_string()));
        assert!(tokens.contains(&"狂奔".to_string()));
    }

    #[test]
    fn test_tokenize_ascii_words() {
        let tokens = tokenize("dark Forest, a Tower");
        assert!(tokens.contains(&"dark".to_string()));
        assert!(tokens.contains(&"forest".to_string()));
        assert!(tokens.contains(&"tower".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
    }

    #[test]
    fn test_character_key_prefers_reference_id() {
        let mut character = Character::narrator();
        character.reference_image_path = Some("refs/hero_ref_a1.png".to_string());
        let descriptor = build_scene_descriptor(
            &character,
            &[],
            "seg",
            "act",
            "",
            &[],
            &[],
            &[],
            "",
            "",
            false,
        );
        assert_eq!(descriptor.reference_image_ids, vec!["a1"]);
        let profile = build_match_profile(&descriptor);
        assert_eq!(profile.character_key, format!("{:x}", md5::compute(b"a1")));
    }

    #[test]
    fn test_character_key_empty_without_references() {
        let descriptor = build_scene_descriptor(
            &Character::narrator(),
            &[],
            "seg",
            "act",
            "",
            &[],
            &[],
            &[],
            "",
            "",
            false,
        );
        let profile = build_match_profile(&descriptor);
        assert!(profile.character_key.is_empty());
    }

    #[test]
    fn test_profile_token_caps() {
        let long_text: String = (0..200).map(|i| format!("word{i} ")).collect();
        let descriptor = SceneDescriptor {
            action_hint: long_text.clone(),
            segment_text: long_text,
            ..SceneDescriptor::default()
        };
        let profile = build_match_profile(&descriptor);
        assert!(profile.action_tokens.len() <= 24);
        assert!(profile.scene_tokens.len() <= 40);
    }
}
