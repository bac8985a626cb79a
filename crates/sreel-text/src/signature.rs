//! Stable request signature for client-side precomputed segmentation.

use sha2::{Digest, Sha256};

/// SHA-256 hex over the canonical JSON of the segmentation inputs.
///
/// Keys are sorted and the encoding carries no whitespace, so the
/// signature is stable across clients and processes.
pub fn build_request_signature(
    text: &str,
    method: &str,
    sentences_per_segment: u32,
    fixed_size: u32,
    model_id: &str,
) -> String {
    // serde_json's default map is a BTreeMap, which sorts keys.
    let canonical = serde_json::json!({
        "text": text.trim(),
        "method": if method.is_empty() { "sentence" } else { method },
        "sentences_per_segment": sentences_per_segment.max(1),
        "fixed_size": fixed_size.max(20),
        "model_id": model_id.trim(),
    });
    let packed = serde_json::to_string(&canonical).expect("canonical JSON");
    let digest = Sha256::digest(packed.as_bytes());
    hex::encode(digest)
}

/// Return the precomputed segments verbatim (after per-item trim) if
/// and only if the provided signature equals the recomputation.
pub fn resolve_precomputed_segments(
    text: &str,
    method: &str,
    sentences_per_segment: u32,
    fixed_size: u32,
    model_id: &str,
    request_signature: Option<&str>,
    precomputed_segments: &[String],
) -> Option<Vec<String>> {
    let provided = request_signature?.trim();
    if provided.is_empty() {
        return None;
    }
    let expected = build_request_signature(text, method, sentences_per_segment, fixed_size, model_id);
    if provided != expected {
        return None;
    }

    let cleaned: Vec<String> = precomputed_segments
        .iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = build_request_signature("A。B。C。D。", "sentence", 2, 120, "");
        let b = build_request_signature("A。B。C。D。", "sentence", 2, 120, "");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_varies_with_inputs() {
        let base = build_request_signature("text", "sentence", 5, 120, "");
        assert_ne!(base, build_request_signature("text", "fixed", 5, 120, ""));
        assert_ne!(base, build_request_signature("text", "sentence", 4, 120, ""));
        assert_ne!(base, build_request_signature("text", "sentence", 5, 200, ""));
        assert_ne!(base, build_request_signature("text", "sentence", 5, 120, "gpt-4o"));
    }

    #[test]
    fn test_precomputed_returned_verbatim_on_match() {
        let sig = build_request_signature("A。B。C。D。", "sentence", 2, 120, "");
        let precomputed = vec!["A。B。".to_string(), "C。D。".to_string()];
        let resolved = resolve_precomputed_segments(
            "A。B。C。D。",
            "sentence",
            2,
            120,
            "",
            Some(&sig),
            &precomputed,
        );
        assert_eq!(resolved, Some(precomputed));
    }

    #[test]
    fn test_precomputed_rejected_on_mismatch() {
        let sig = build_request_signature("other text", "sentence", 2, 120, "");
        let resolved = resolve_precomputed_segments(
            "A。B。C。D。",
            "sentence",
            2,
            120,
            "",
            Some(&sig),
            &["A。B。".to_string()],
        );
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_precomputed_items_are_trimmed() {
        let sig = build_request_signature("A。B。", "sentence", 1, 120, "");
        let resolved = resolve_precomputed_segments(
            "A。B。",
            "sentence",
            1,
            120,
            "",
            Some(&sig),
            &[" A。 ".to_string(), "  ".to_string(), "B。".to_string()],
        );
        assert_eq!(resolved, Some(vec!["A。".to_string(), "B。".to_string()]));
    }
}
