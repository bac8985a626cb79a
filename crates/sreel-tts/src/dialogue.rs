//! Dialogue/narration splitting and voice routing.
//!
//! Paired quote blocks (ASCII `"` and CJK `“”`) become dialogue
//! pieces; the surrounding text stays with the narrator. Dialogue
//! rotates through the non-narrator character voices by dialogue
//! index, and adjacent pieces sharing a voice merge.

use sreel_models::Character;

/// One synthesis piece: text plus the voice that speaks it.
pub type TtsPiece = (String, String);

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('“', '”')];

/// Extract paired quote blocks as `(text, start, end)` char indexes.
pub fn extract_quote_blocks(text: &str) -> Vec<(String, usize, usize)> {
    let chars: Vec<char> = text.trim().chars().collect();
    let mut blocks = Vec::new();
    let mut index = 0usize;

    while index < chars.len() {
        let opener = chars[index];
        let Some(&(_, closer)) = QUOTE_PAIRS.iter().find(|(open, _)| *open == opener) else {
            index += 1;
            continue;
        };

        let Some(offset) = chars[index + 1..].iter().position(|&c| c == closer) else {
            index += 1;
            continue;
        };
        let end = index + 1 + offset;
        if end <= index + 1 {
            index += 1;
            continue;
        }

        let quoted: String = chars[index + 1..end].iter().collect();
        let trimmed = quoted.trim().to_string();
        if !trimmed.is_empty() {
            blocks.push((trimmed, index, end));
        }
        index = end + 1;
    }
    blocks
}

/// Rotate through characters that have a usable non-narrator voice.
pub fn pick_dialogue_voice(
    characters: &[Character],
    dialog_index: usize,
    narrator_voice: &str,
) -> String {
    let available: Vec<&Character> = characters
        .iter()
        .filter(|c| {
            let voice = c.voice_id.trim();
            !voice.is_empty() && voice != narrator_voice
        })
        .collect();
    if available.is_empty() {
        return narrator_voice.to_string();
    }
    available[dialog_index % available.len()].voice_id.clone()
}

/// Merge adjacent pieces sharing the same voice.
pub fn merge_pieces(pieces: Vec<TtsPiece>, narrator_voice: &str) -> Vec<TtsPiece> {
    let mut merged: Vec<TtsPiece> = Vec::new();
    for (text, voice) in pieces {
        let text = text.trim().to_string();
        if text.is_empty() {
            continue;
        }
        let voice = {
            let v = voice.trim();
            if v.is_empty() {
                narrator_voice.to_string()
            } else {
                v.to_string()
            }
        };
        match merged.last_mut() {
            Some((last_text, last_voice)) if *last_voice == voice => {
                last_text.push_str(&text);
            }
            _ => merged.push((text, voice)),
        }
    }
    merged
}

/// Split a segment into ordered `(text, voice)` pieces: narration on
/// the narrator voice, each dialogue block on a rotating character
/// voice.
pub fn build_tts_pieces(
    text: &str,
    characters: &[Character],
    narrator_voice: &str,
) -> Vec<TtsPiece> {
    let clean = text.trim();
    if clean.is_empty() {
        return Vec::new();
    }

    let quotes = extract_quote_blocks(clean);
    if quotes.is_empty() {
        return vec![(clean.to_string(), narrator_voice.to_string())];
    }

    let chars: Vec<char> = clean.chars().collect();
    let mut pieces: Vec<TtsPiece> = Vec::new();
    let mut cursor = 0usize;
    let mut dialog_index = 0usize;

    for (quoted, quote_start, quote_end) in quotes {
        if quote_start < cursor || quote_end <= quote_start {
            continue;
        }

        let narration: String = chars[cursor..quote_start].iter().collect();
        let narration = narration.trim().to_string();
        if !narration.is_empty() {
            pieces.push((narration, narrator_voice.to_string()));
        }

        pieces.push((
            quoted,
            pick_dialogue_voice(characters, dialog_index, narrator_voice),
        ));
        dialog_index += 1;
        cursor = quote_end + 1;
    }

    let tail: String = chars[cursor.min(chars.len())..].iter().collect();
    let tail = tail.trim().to_string();
    if !tail.is_empty() {
        pieces.push((tail, narrator_voice.to_string()));
    }

    if pieces.is_empty() {
        return vec![(clean.to_string(), narrator_voice.to_string())];
    }
    merge_pieces(pieces, narrator_voice)
}
