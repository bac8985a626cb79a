//! Strict and lenient lookup over the scene cache index.
//!
//! The strict lookup is the primary path consulted before generating
//! a frame; the lenient lookup is the forced pick used when generation
//! already failed. Both pre-filter by reference identity, rank by
//! token overlap, and only then consult the LLM selector, whose pick
//! is re-verified before being trusted.

use std::collections::HashSet;
use std::path::PathBuf;

use serde_json::json;
use tracing::{debug, info};

use sreel_llm::{select_scene_candidate, LlmClient, SelectorMode};

use crate::descriptor::{build_match_profile, MatchProfile, SceneDescriptor};
use crate::error::CacheResult;
use crate::index::{SceneCacheEntry, SceneCacheIndex};

/// Shortlist size for the strict lookup without reference narrowing.
const STRICT_SHORTLIST: usize = 5;
/// Shortlist size when a reference id/path narrows the pool.
const STRICT_SHORTLIST_WITH_REFERENCE: usize = 20;
/// Lenient shortlist sizes.
const LENIENT_SHORTLIST: usize = 50;
const LENIENT_SHORTLIST_WITH_REFERENCE: usize = 200;

/// Weight added to the lenient score when the character matches.
const LENIENT_CHARACTER_BONUS: i64 = 1000;

/// Minimum length (in chars) of the shorter side for the substring
/// rule to count as a hint match.
const SUBSTRING_GUARD_CHARS: usize = 4;

/// How a reuse decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Bit-identical action and location text
    TextExact,
    /// LLM selector pick on the strict path
    Llm,
    /// Conservative byte-equality fallback after the selector passed
    Conservative,
    /// LLM selector pick on the lenient (generation-failed) path
    ForcedLlm,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::TextExact => "text-exact",
            MatchType::Llm => "llm",
            MatchType::Conservative => "conservative",
            MatchType::ForcedLlm => "forced-llm",
        }
    }
}

/// A reuse decision.
#[derive(Debug, Clone)]
pub struct SceneMatch {
    pub entry_id: String,
    pub image_path: PathBuf,
    pub match_type: MatchType,
    pub confidence: f32,
    pub reason: String,
}

/// Full comparison verdict between a lookup target and one candidate.
#[derive(Debug, Clone, Default)]
pub struct MatchVerdict {
    pub character_match: bool,
    pub exact_action: bool,
    pub action_match: bool,
    pub location_applicable: bool,
    pub location_match: bool,
    pub scene_match: bool,
    pub action_common: usize,
    pub location_common: usize,
    pub scene_common: usize,
    pub scene_element_common: usize,
    pub text_exact: bool,
}

impl MatchVerdict {
    /// Ranking score: action overlap dominates, then location, then
    /// scene.
    pub fn rank_score(&self) -> i64 {
        self.action_common as i64 * 100 + self.location_common as i64 * 10 + self.scene_common as i64
    }

    /// All strict conditions hold.
    pub fn accepts_strict(&self) -> bool {
        self.character_match
            && self.action_match
            && (!self.location_applicable || self.location_match)
            && self.scene_match
    }

    /// Lenient acceptance: character still required, action OR scene
    /// overlap suffices, location relaxed when the scene matches.
    pub fn accepts_lenient(&self) -> bool {
        self.character_match
            && (self.action_match || self.scene_match)
            && (!self.location_applicable || self.location_match || self.scene_match)
    }
}

fn common_count(a: &[String], b: &[String]) -> usize {
    let b_set: HashSet<&String> = b.iter().collect();
    a.iter().filter(|token| b_set.contains(token)).count()
}

fn shares_any(a: &[String], b: &[String]) -> bool {
    a.iter().any(|item| b.contains(item))
}

fn hint_matches(target: &str, candidate: &str, common_tokens: usize) -> (bool, bool) {
    if target.is_empty() || candidate.is_empty() {
        return (false, false);
    }
    let exact = target == candidate;
    if exact {
        return (true, true);
    }
    let shorter = target.chars().count().min(candidate.chars().count());
    let substring =
        shorter >= SUBSTRING_GUARD_CHARS && (target.contains(candidate) || candidate.contains(target));
    (false, substring || common_tokens >= 2)
}

/// Compute the verdict for one candidate against the lookup target.
pub fn compute_verdict(
    target: &SceneDescriptor,
    target_profile: &MatchProfile,
    candidate: &SceneCacheEntry,
) -> MatchVerdict {
    let cand = &candidate.descriptor;
    let cand_profile = &candidate.profile;

    let shared_reference = shares_any(&target.reference_image_ids, &cand.reference_image_ids)
        || shares_any(&target.reference_image_paths, &cand.reference_image_paths);
    let key_match = !target_profile.character_key.is_empty()
        && target_profile.character_key == cand_profile.character_key;
    let scene_only_pair = target.is_scene_only && cand.is_scene_only;
    let character_match = shared_reference || key_match || scene_only_pair;

    let action_common = common_count(&target_profile.action_tokens, &cand_profile.action_tokens);
    let (exact_action, action_partial) =
        hint_matches(&target.action_hint, &cand.action_hint, action_common);
    let action_match = exact_action || action_partial;

    let location_applicable = !target.location_hint.is_empty() && !cand.location_hint.is_empty();
    let location_common =
        common_count(&target_profile.location_tokens, &cand_profile.location_tokens);
    let (exact_location, location_partial) =
        hint_matches(&target.location_hint, &cand.location_hint, location_common);
    let location_match = exact_location || location_partial;

    let scene_common = common_count(&target_profile.scene_tokens, &cand_profile.scene_tokens);
    let scene_element_common = common_count(&target.scene_elements, &cand.scene_elements);
    let scene_match = scene_common >= 2 || scene_element_common >= 1 || action_match;

    let text_exact = !target.action_hint.is_empty()
        && target.action_hint == cand.action_hint
        && target.location_hint == cand.location_hint;

    MatchVerdict {
        character_match,
        exact_action,
        action_match,
        location_applicable,
        location_match,
        scene_match,
        action_common,
        location_common,
        scene_common,
        scene_element_common,
        text_exact,
    }
}

fn target_has_reference(target: &SceneDescriptor) -> bool {
    !target.reference_image_ids.is_empty() || !target.reference_image_paths.is_empty()
}

/// A selector pick crosses reference identity when the target carries
/// ids/paths the candidate does not share. Such picks are rejected
/// outright.
fn crosses_reference(target: &SceneDescriptor, candidate: &SceneCacheEntry) -> bool {
    if !target.reference_image_ids.is_empty()
        && !shares_any(
            &target.reference_image_ids,
            &candidate.descriptor.reference_image_ids,
        )
    {
        return true;
    }
    if !target.reference_image_paths.is_empty()
        && !shares_any(
            &target.reference_image_paths,
            &candidate.descriptor.reference_image_paths,
        )
    {
        return true;
    }
    false
}

fn candidate_json(entry: &SceneCacheEntry, verdict: &MatchVerdict, score: i64) -> serde_json::Value {
    json!({
        "id": entry.id,
        "descriptor": entry.descriptor,
        "summary": entry.summary,
        "heuristic_score": score,
        "action_common": verdict.action_common,
        "scene_common": verdict.scene_common,
    })
}

fn to_match(entry: &SceneCacheEntry, match_type: MatchType, confidence: f32, reason: impl Into<String>) -> SceneMatch {
    SceneMatch {
        entry_id: entry.id.clone(),
        image_path: entry.image_path.clone(),
        match_type,
        confidence,
        reason: reason.into(),
    }
}

/// Strict primary lookup.
///
/// Returns a reuse decision only when the candidate passes every
/// check: character identity, action, location (when both sides carry
/// one), and scene overlap — then text-exact short-circuit, overlap
/// gate, LLM selection with re-verification, and finally a
/// conservative byte-equality fallback.
pub async fn find_reusable_scene_image(
    index: &SceneCacheIndex,
    llm: &LlmClient,
    target: &SceneDescriptor,
    disallow_entry_ids: &HashSet<String>,
    model_id: Option<&str>,
) -> CacheResult<Option<SceneMatch>> {
    let target_profile = build_match_profile(target);
    let candidates = index.candidates_for(target, disallow_entry_ids)?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut scored: Vec<(SceneCacheEntry, MatchVerdict)> = candidates
        .into_iter()
        .map(|entry| {
            let verdict = compute_verdict(target, &target_profile, &entry);
            (entry, verdict)
        })
        .filter(|(_, verdict)| verdict.accepts_strict())
        .collect();
    if scored.is_empty() {
        return Ok(None);
    }

    scored.sort_by_key(|(_, verdict)| std::cmp::Reverse(verdict.rank_score()));
    let shortlist_len = if target_has_reference(target) {
        STRICT_SHORTLIST_WITH_REFERENCE
    } else {
        STRICT_SHORTLIST
    };
    scored.truncate(shortlist_len);

    if let Some((entry, _)) = scored.iter().find(|(_, verdict)| verdict.text_exact) {
        debug!(entry_id = %entry.id, "Scene cache text-exact hit");
        return Ok(Some(to_match(
            entry,
            MatchType::TextExact,
            1.0,
            "identical action and location text",
        )));
    }

    // Overlap gate: without solid action and scene overlap on the best
    // candidate, reuse is not worth asking the selector about.
    let (best_entry, best_verdict) = &scored[0];
    let action_strong = best_verdict.exact_action || best_verdict.action_common >= 3;
    let scene_strong = best_verdict.scene_common >= 2 || best_verdict.scene_element_common >= 1;
    if !(action_strong && scene_strong) {
        return Ok(None);
    }

    let target_json = serde_json::to_value(target)?;
    let candidates_json: Vec<serde_json::Value> = scored
        .iter()
        .map(|(entry, verdict)| candidate_json(entry, verdict, verdict.rank_score()))
        .collect();

    if let Some(verdict) =
        select_scene_candidate(llm, &target_json, &candidates_json, SelectorMode::Strict, model_id)
            .await
    {
        if let Some((entry, heuristics)) = scored
            .iter()
            .find(|(entry, _)| entry.id == verdict.selected_id)
        {
            if !crosses_reference(target, entry) && heuristics.accepts_strict() {
                info!(entry_id = %entry.id, confidence = verdict.confidence, "Scene cache LLM hit");
                return Ok(Some(to_match(
                    entry,
                    MatchType::Llm,
                    verdict.confidence,
                    verdict.reason,
                )));
            }
            debug!(entry_id = %entry.id, "Selector pick rejected by verification");
        }
    }

    // Conservative fallback: only byte-equal action and location text
    // is trusted without the selector's blessing.
    if best_verdict.text_exact {
        return Ok(Some(to_match(
            best_entry,
            MatchType::Conservative,
            1.0,
            "byte-equal action and location",
        )));
    }
    Ok(None)
}

/// Lenient lookup used by the generation-failure fallback.
///
/// Same pre-filter and ranking, but the score carries a large bonus
/// for character matches, the shortlist is widened, and the selector
/// runs in non-strict mode. The pick is still rejected when it crosses
/// reference ids/paths.
pub async fn force_llm_select_scene_image(
    index: &SceneCacheIndex,
    llm: &LlmClient,
    target: &SceneDescriptor,
    disallow_entry_ids: &HashSet<String>,
    model_id: Option<&str>,
) -> CacheResult<Option<SceneMatch>> {
    let target_profile = build_match_profile(target);
    let candidates = index.candidates_for(target, disallow_entry_ids)?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut scored: Vec<(SceneCacheEntry, MatchVerdict, i64)> = candidates
        .into_iter()
        .map(|entry| {
            let verdict = compute_verdict(target, &target_profile, &entry);
            let mut score = verdict.rank_score();
            if verdict.character_match {
                score += LENIENT_CHARACTER_BONUS;
            }
            (entry, verdict, score)
        })
        .collect();

    scored.sort_by_key(|(_, _, score)| std::cmp::Reverse(*score));
    let shortlist_len = if target_has_reference(target) {
        LENIENT_SHORTLIST_WITH_REFERENCE
    } else {
        LENIENT_SHORTLIST
    };
    scored.truncate(shortlist_len);

    let target_json = serde_json::to_value(target)?;
    let candidates_json: Vec<serde_json::Value> = scored
        .iter()
        .map(|(entry, verdict, score)| candidate_json(entry, verdict, *score))
        .collect();

    let Some(verdict) = select_scene_candidate(
        llm,
        &target_json,
        &candidates_json,
        SelectorMode::Lenient,
        model_id,
    )
    .await
    else {
        return Ok(None);
    };

    let Some((entry, heuristics, _)) = scored
        .iter()
        .find(|(entry, _, _)| entry.id == verdict.selected_id)
    else {
        return Ok(None);
    };

    if crosses_reference(target, entry) || !heuristics.accepts_lenient() {
        debug!(entry_id = %entry.id, "Lenient selector pick rejected by verification");
        return Ok(None);
    }

    info!(entry_id = %entry.id, "Scene cache forced-LLM pick");
    Ok(Some(to_match(
        entry,
        MatchType::ForcedLlm,
        verdict.confidence,
        verdict.reason,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::build_scene_descriptor;
    use sreel_models::Character;
    use std::path::Path;

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"fake").unwrap();
        path
    }

    fn character(name: &str, reference: Option<&str>) -> Character {
        let mut c = Character::narrator();
        c.name = name.to_string();
        c.reference_image_path = reference.map(|s| s.to_string());
        c
    }

    fn descriptor(
        name: &str,
        reference: Option<&str>,
        action: &str,
        location: &str,
        elements: &[&str],
    ) -> SceneDescriptor {
        let c = character(name, reference);
        build_scene_descriptor(
            &c,
            &[],
            "一段文字",
            action,
            location,
            &elements.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &[],
            &[],
            "",
            "",
            false,
        )
    }

    fn disabled_llm() -> LlmClient {
        LlmClient::new("http://localhost:1", "", "m")
    }

    fn open_index(dir: &Path) -> SceneCacheIndex {
        SceneCacheIndex::open(dir.join("cache.db"), dir.join("images")).unwrap()
    }

    #[test]
    fn test_verdict_character_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let src = write_image(dir.path(), "s.png");

        let cand = descriptor("乙", Some("refs/hero_ref_b.png"), "拔刀", "", &[]);
        let entry = index.save_entry(&cand, &src, "").unwrap();

        let target = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀", "", &[]);
        let profile = build_match_profile(&target);
        let verdict = compute_verdict(&target, &profile, &entry);
        assert!(!verdict.character_match);
        assert!(!verdict.accepts_strict());
    }

    #[test]
    fn test_verdict_text_exact() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let src = write_image(dir.path(), "s.png");

        let cand = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        let entry = index.save_entry(&cand, &src, "").unwrap();

        let target = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        let profile = build_match_profile(&target);
        let verdict = compute_verdict(&target, &profile, &entry);
        assert!(verdict.character_match);
        assert!(verdict.exact_action);
        assert!(verdict.text_exact);
        assert!(verdict.accepts_strict());
    }

    #[tokio::test]
    async fn test_strict_lookup_text_exact_hit() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let src = write_image(dir.path(), "s.png");

        let cand = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        index.save_entry(&cand, &src, "").unwrap();

        let target = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        let hit = find_reusable_scene_image(&index, &disabled_llm(), &target, &HashSet::new(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.match_type, MatchType::TextExact);
        assert!((hit.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_strict_lookup_rejects_cross_reference() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let src = write_image(dir.path(), "s.png");

        let cand = descriptor("乙", Some("refs/hero_ref_b.png"), "拔刀狂奔", "在森林", &[]);
        index.save_entry(&cand, &src, "").unwrap();

        let target = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        let hit = find_reusable_scene_image(&index, &disabled_llm(), &target, &HashSet::new(), None)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_strict_lookup_respects_disallow_window() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let src = write_image(dir.path(), "s.png");

        let cand = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        let saved = index.save_entry(&cand, &src, "").unwrap();

        let target = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        let mut disallow = HashSet::new();
        disallow.insert(saved.id.clone());
        let hit = find_reusable_scene_image(&index, &disabled_llm(), &target, &disallow, None)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_lenient_lookup_needs_selector() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let src = write_image(dir.path(), "s.png");

        let cand = descriptor("甲", Some("refs/hero_ref_a.png"), "拔刀狂奔", "在森林", &[]);
        index.save_entry(&cand, &src, "").unwrap();

        // With the selector disabled the lenient path never picks.
        let target = descriptor("甲", Some("refs/hero_ref_a.png"), "挥剑", "在森林", &[]);
        let hit = force_llm_select_scene_image(&index, &disabled_llm(), &target, &HashSet::new(), None)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_weak_overlap_fails_gate() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let src = write_image(dir.path(), "s.png");

        // Same reference, overlapping action tokens, but no scene
        // overlap at all: fails the overlap gate and, without a
        // selector, returns none.
        let cand = build_scene_descriptor(
            &character("甲", Some("refs/hero_ref_a.png")),
            &[],
            "wolves howl",
            "knight riding horse",
            "",
            &[],
            &[],
            &[],
            "",
            "",
            false,
        );
        index.save_entry(&cand, &src, "").unwrap();

        let target = build_scene_descriptor(
            &character("甲", Some("refs/hero_ref_a.png")),
            &[],
            "storm clouds gather",
            "knight walking slowly",
            "",
            &[],
            &[],
            &[],
            "",
            "",
            false,
        );
        let hit = find_reusable_scene_image(&index, &disabled_llm(), &target, &HashSet::new(), None)
            .await
            .unwrap();
        assert!(hit.is_none());
    }
}
