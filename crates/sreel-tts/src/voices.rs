//! Voice sanitization before rendering begins.
//!
//! Each character's voice is validated against the catalog. Conflicts
//! resolve by keeping distinct ids when possible, then role/
//! personality recommendation, then any free catalog voice, else the
//! narrator. The narrator voice is reserved and never handed to a
//! character that did not already carry it through exhaustion.

use sreel_models::{is_catalog_voice, recommend_voice, Character, VOICES};

/// Sanitize character voices in place, highest importance first.
pub fn sanitize_character_voices(characters: &mut [Character], narrator_voice: &str) {
    if characters.is_empty() {
        return;
    }

    let narrator = if is_catalog_voice(narrator_voice) {
        narrator_voice.to_string()
    } else {
        VOICES[0].id.to_string()
    };

    let mut used: std::collections::HashSet<String> = std::collections::HashSet::new();
    used.insert(narrator.clone());

    let mut order: Vec<usize> = (0..characters.len()).collect();
    order.sort_by_key(|&index| std::cmp::Reverse(characters[index].importance));

    for index in order {
        let character = &mut characters[index];
        let current = character.voice_id.trim().to_string();

        if !current.is_empty() && is_catalog_voice(&current) && !used.contains(&current) {
            used.insert(current);
            continue;
        }

        let recommended = recommend_voice(&character.role, &character.personality).to_string();
        if is_catalog_voice(&recommended) && !used.contains(&recommended) {
            character.voice_id = recommended.clone();
            used.insert(recommended);
            continue;
        }

        if let Some(free) = VOICES.iter().find(|voice| !used.contains(voice.id)) {
            character.voice_id = free.id.to_string();
            used.insert(free.id.to_string());
            continue;
        }

        // Catalog exhausted: keep a valid current id, else narrator.
        character.voice_id = if is_catalog_voice(&current) {
            current
        } else {
            narrator.clone()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sreel_models::NARRATOR_VOICE_ID;

    fn character(name: &str, voice: &str, importance: u8) -> Character {
        let mut c = Character::narrator();
        c.name = name.to_string();
        c.voice_id = voice.to_string();
        c.importance = importance;
        c
    }

    #[test]
    fn test_distinct_valid_voices_kept() {
        let mut cast = vec![
            character("甲", "zh-CN-XiaoxiaoNeural", 9),
            character("乙", "zh-CN-YunjianNeural", 5),
        ];
        sanitize_character_voices(&mut cast, NARRATOR_VOICE_ID);
        assert_eq!(cast[0].voice_id, "zh-CN-XiaoxiaoNeural");
        assert_eq!(cast[1].voice_id, "zh-CN-YunjianNeural");
    }

    #[test]
    fn test_duplicate_voices_resolved() {
        let mut cast = vec![
            character("甲", "zh-CN-XiaoxiaoNeural", 9),
            character("乙", "zh-CN-XiaoxiaoNeural", 5),
        ];
        sanitize_character_voices(&mut cast, NARRATOR_VOICE_ID);
        assert_ne!(cast[0].voice_id, cast[1].voice_id);
        assert_eq!(cast[0].voice_id, "zh-CN-XiaoxiaoNeural");
    }

    #[test]
    fn test_narrator_voice_reassigned() {
        // A character holding the reserved narrator voice gets a
        // different one while the catalog has free entries.
        let mut cast = vec![character("甲", NARRATOR_VOICE_ID, 9)];
        sanitize_character_voices(&mut cast, NARRATOR_VOICE_ID);
        assert_ne!(cast[0].voice_id, NARRATOR_VOICE_ID);
        assert!(is_catalog_voice(&cast[0].voice_id));
    }

    #[test]
    fn test_invalid_voice_replaced_by_recommendation() {
        let mut cast = vec![character("女主", "not-a-voice", 9)];
        cast[0].role = "女主".to_string();
        cast[0].personality = "活潑".to_string();
        sanitize_character_voices(&mut cast, NARRATOR_VOICE_ID);
        assert_eq!(cast[0].voice_id, "zh-CN-XiaoyiNeural");
    }

    #[test]
    fn test_no_duplicates_until_catalog_exhausted() {
        let mut cast: Vec<Character> = (0..9)
            .map(|i| character(&format!("角色{i}"), "", (9 - i) as u8))
            .collect();
        sanitize_character_voices(&mut cast, NARRATOR_VOICE_ID);

        let mut voices: Vec<&str> = cast.iter().map(|c| c.voice_id.as_str()).collect();
        voices.sort();
        voices.dedup();
        assert_eq!(voices.len(), 9);
        assert!(cast.iter().all(|c| c.voice_id != NARRATOR_VOICE_ID));
    }

    #[test]
    fn test_exhausted_catalog_falls_back_to_narrator() {
        let mut cast: Vec<Character> = (0..12)
            .map(|i| character(&format!("角色{i}"), "", 5))
            .collect();
        sanitize_character_voices(&mut cast, NARRATOR_VOICE_ID);
        assert!(cast
            .iter()
            .any(|c| c.voice_id == NARRATOR_VOICE_ID));
    }
}
