//! Cast characters supplied with a generation request.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::voice::NARRATOR_VOICE_ID;

/// A character in the story cast.
///
/// At most one character may carry `is_main_character` and at most one
/// `is_story_self`; character analysis enforces this after the LLM
/// call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Character {
    /// Display name as it appears in the text
    pub name: String,

    /// Role label (e.g. protagonist, supporting)
    #[serde(default = "default_role")]
    pub role: String,

    /// Importance in [1, 10]
    #[serde(default = "default_importance")]
    pub importance: u8,

    /// True for the single lead character
    #[serde(default)]
    pub is_main_character: bool,

    /// True when this character is the first-person narrator "I"
    #[serde(default)]
    pub is_story_self: bool,

    /// Visual appearance anchors for image prompts
    #[serde(default)]
    pub appearance: String,

    /// Personality notes for voice recommendation and prompts
    #[serde(default)]
    pub personality: String,

    /// Base image prompt fragment for this character
    #[serde(default)]
    pub base_prompt: String,

    /// Optional on-disk reference image used for facial identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_path: Option<String>,

    /// Voice ID from the fixed catalog
    #[serde(default = "default_voice")]
    pub voice_id: String,
}

fn default_role() -> String {
    "supporting".to_string()
}

fn default_importance() -> u8 {
    5
}

fn default_voice() -> String {
    NARRATOR_VOICE_ID.to_string()
}

impl Character {
    /// Minimal character used when the cast is empty.
    pub fn narrator() -> Self {
        Self {
            name: "narrator".to_string(),
            role: "narrator".to_string(),
            importance: 5,
            is_main_character: false,
            is_story_self: false,
            appearance: String::new(),
            personality: String::new(),
            base_prompt: String::new(),
            reference_image_path: None,
            voice_id: NARRATOR_VOICE_ID.to_string(),
        }
    }

    /// Clamp importance into [1, 10].
    pub fn clamp_importance(&mut self) {
        self.importance = self.importance.clamp(1, 10);
    }

    /// Whether this character carries a usable reference image path.
    pub fn has_reference(&self) -> bool {
        self.reference_image_path
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let character: Character = serde_json::from_str(r#"{"name":"林远"}"#).unwrap();
        assert_eq!(character.role, "supporting");
        assert_eq!(character.importance, 5);
        assert_eq!(character.voice_id, NARRATOR_VOICE_ID);
        assert!(!character.is_main_character);
        assert!(!character.has_reference());
    }

    #[test]
    fn test_clamp_importance() {
        let mut character = Character::narrator();
        character.importance = 40;
        character.clamp_importance();
        assert_eq!(character.importance, 10);
    }
}
