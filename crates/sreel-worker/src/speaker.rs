//! Default speaking-character selection for a segment.
//!
//! Heuristics run in order; the first that reaches a decision wins:
//! name mentions in the current segment (speaker-verb proximity, then
//! position and importance as tiebreaks), first-person self when the
//! story-self character is marked and the narration reads first
//! person, carry-over for dialogue-heavy segments, then a weighted
//! score over the current and adjacent segments.

use sreel_models::Character;
use sreel_tts::extract_quote_blocks;

/// Verbs that bind a nearby name to the following dialogue.
const SPEAKER_VERBS: &[&str] = &["说", "道", "喊", "问", "答", "笑道", "叫", "念"];

/// First-person markers scanned outside quotes.
const FIRST_PERSON_MARKERS: &[&str] = &["我", "我们"];

/// How many chars between a name and a speaker verb still count as
/// proximity.
const VERB_PROXIMITY_CHARS: usize = 3;

/// Dialogue ratio above which a segment counts as dialogue-heavy.
const DIALOGUE_HEAVY_RATIO: f64 = 0.6;

/// Pick the default speaking character for a segment. Returns an
/// index into `characters`; empty casts yield `None`.
pub fn pick_default_character(
    characters: &[Character],
    segment_text: &str,
    adjacent_segments: &[&str],
    previous_pick: Option<usize>,
) -> Option<usize> {
    if characters.is_empty() {
        return None;
    }

    // 1. Name mentions in the current segment.
    let mentions = name_mentions(characters, segment_text);
    if !mentions.is_empty() {
        if mentions.len() == 1 {
            return Some(mentions[0].0);
        }
        // Speaker-verb proximity decides among several mentions.
        let with_verb: Vec<&(usize, usize)> = mentions
            .iter()
            .filter(|(index, position)| {
                name_has_speaker_marker(segment_text, &characters[*index].name, *position)
            })
            .collect();
        if with_verb.len() == 1 {
            return Some(with_verb[0].0);
        }
        // Position first, then importance.
        let best = mentions
            .iter()
            .min_by_key(|(index, position)| (*position, std::cmp::Reverse(characters[*index].importance)))
            .expect("non-empty mentions");
        return Some(best.0);
    }

    // 2. First-person self.
    if let Some(self_index) = characters.iter().position(|c| c.is_story_self) {
        if narration_outside_quotes_is_first_person(segment_text) {
            return Some(self_index);
        }
    }

    let dialogue_heavy = dialogue_ratio(segment_text) >= DIALOGUE_HEAVY_RATIO;

    // 3. Carry-over for dialogue-heavy segments.
    if dialogue_heavy {
        if let Some(previous) = previous_pick.filter(|index| *index < characters.len()) {
            return Some(previous);
        }
    }

    // 4. Weighted score over the current and adjacent segments.
    let mut best_index = default_main_index(characters);
    let mut best_score = f64::MIN;
    for (index, character) in characters.iter().enumerate() {
        if character.name.trim().is_empty() {
            continue;
        }
        let current_hits = count_occurrences(segment_text, &character.name);
        let adjacent_hits: usize = adjacent_segments
            .iter()
            .map(|segment| count_occurrences(segment, &character.name))
            .sum();
        let mut score = current_hits as f64 * 2.0
            + adjacent_hits as f64
            + character.importance as f64 * 0.1;
        if dialogue_heavy && previous_pick == Some(index) {
            score += 1.5;
        }
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }
    Some(best_index)
}

/// Index of the main character, falling back to the highest
/// importance, then the first entry.
pub fn default_main_index(characters: &[Character]) -> usize {
    characters
        .iter()
        .position(|c| c.is_main_character)
        .or_else(|| {
            characters
                .iter()
                .enumerate()
                .max_by_key(|(_, c)| c.importance)
                .map(|(index, _)| index)
        })
        .unwrap_or(0)
}

/// `(character index, first mention position)` for every cast name
/// appearing in the segment.
fn name_mentions(characters: &[Character], text: &str) -> Vec<(usize, usize)> {
    let mut mentions: Vec<(usize, usize)> = characters
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.name.trim().is_empty())
        .filter_map(|(index, c)| text.find(&c.name).map(|position| (index, position)))
        .collect();
    mentions.sort_by_key(|(_, position)| *position);
    mentions
}

/// A name counts as marked when a speaker verb or a colon follows it
/// within a few characters.
fn name_has_speaker_marker(text: &str, name: &str, byte_position: usize) -> bool {
    let after_start = byte_position + name.len();
    if after_start >= text.len() {
        return false;
    }
    let window: String = text[after_start..].chars().take(VERB_PROXIMITY_CHARS).collect();
    if window.starts_with(':') || window.starts_with('：') {
        return true;
    }
    SPEAKER_VERBS.iter().any(|verb| window.contains(verb))
}

/// Fraction of the segment that sits inside paired quotes.
fn dialogue_ratio(text: &str) -> f64 {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return 0.0;
    }
    let quoted: usize = extract_quote_blocks(text)
        .iter()
        .map(|(quoted, _, _)| quoted.chars().filter(|c| !c.is_whitespace()).count())
        .sum();
    quoted as f64 / total as f64
}

/// Whether the narration (text outside paired quotes) carries
/// first-person markers.
fn narration_outside_quotes_is_first_person(text: &str) -> bool {
    let chars: Vec<char> = text.trim().chars().collect();
    let blocks = extract_quote_blocks(text);
    let mut narration = String::new();
    let mut cursor = 0usize;
    for (_, start, end) in &blocks {
        if *start > cursor {
            narration.extend(&chars[cursor..*start]);
        }
        cursor = end + 1;
    }
    if cursor < chars.len() {
        narration.extend(&chars[cursor..]);
    }
    FIRST_PERSON_MARKERS
        .iter()
        .any(|marker| narration.contains(marker))
}

fn count_occurrences(text: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    text.matches(needle).count()
}
