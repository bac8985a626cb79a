//! Segment planning: precomputed reuse, the three segmentation
//! methods, range selection, and the group cap.

use tracing::{debug, warn};

use sreel_llm::{smart_segments, LlmClient};
use sreel_models::{GenerateVideoRequest, SegmentMethod};
use sreel_text::{
    build_request_signature, group_sentences, resolve_precomputed_segments, segment_by_fixed,
    select_segments_by_range, split_sentences,
};

use crate::error::{WorkerError, WorkerResult};

/// Resolved segmentation for one job.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    pub segments: Vec<String>,
    /// Sentence count for the sentence method, 0 otherwise
    pub total_sentences: usize,
    pub request_signature: String,
}

/// Build the segment plan for a request.
///
/// A matching request signature returns the client's precomputed
/// vector verbatim and skips every other path (including the LLM).
pub async fn build_segment_plan(
    llm: &LlmClient,
    payload: &GenerateVideoRequest,
) -> WorkerResult<SegmentPlan> {
    let method = payload.segment_method;
    let model_id = payload.model_id.as_deref().unwrap_or("");
    let signature = build_request_signature(
        &payload.text,
        method.as_str(),
        payload.sentences_per_segment,
        payload.fixed_size,
        model_id,
    );

    if let Some(precomputed) = resolve_precomputed_segments(
        &payload.text,
        method.as_str(),
        payload.sentences_per_segment,
        payload.fixed_size,
        model_id,
        payload.request_signature.as_deref(),
        &payload.precomputed_segments,
    ) {
        debug!(
            segments = precomputed.len(),
            "Using client-precomputed segments (signature match)"
        );
        return finalize_plan(payload, precomputed, 0, signature);
    }

    let (segments, total_sentences) = match method {
        SegmentMethod::Fixed => (
            segment_by_fixed(&payload.text, payload.fixed_size as usize),
            0,
        ),
        SegmentMethod::Smart => {
            let segments = match smart_segments(llm, &payload.text, payload.model_id.as_deref())
                .await
            {
                Ok(segments) => segments,
                Err(err) => {
                    warn!(error = %err, "Smart segmentation failed, grouping sentences instead");
                    let sentences = split_sentences(&payload.text);
                    group_sentences(&sentences, 5)
                }
            };
            (segments, 0)
        }
        SegmentMethod::Sentence => {
            let sentences = split_sentences(&payload.text);
            let count = sentences.len();
            (
                group_sentences(&sentences, payload.sentences_per_segment as usize),
                count,
            )
        }
    };

    finalize_plan(payload, segments, total_sentences, signature)
}

fn finalize_plan(
    payload: &GenerateVideoRequest,
    segments: Vec<String>,
    total_sentences: usize,
    request_signature: String,
) -> WorkerResult<SegmentPlan> {
    let mut segments = select_segments_by_range(&segments, payload.segment_range.as_deref())?;
    if payload.max_segment_groups > 0 {
        segments.truncate(payload.max_segment_groups as usize);
    }
    if segments.is_empty() {
        return Err(WorkerError::validation("no segment groups produced"));
    }
    Ok(SegmentPlan {
        segments,
        total_sentences,
        request_signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_llm() -> LlmClient {
        LlmClient::new("http://localhost:1", "", "m")
    }

    fn request(text: &str) -> GenerateVideoRequest {
        GenerateVideoRequest::for_text(text)
    }

    #[tokio::test]
    async fn test_sentence_plan_groups() {
        let mut payload = request("A。B。C。D。E。");
        payload.sentences_per_segment = 2;
        let plan = build_segment_plan(&disabled_llm(), &payload).await.unwrap();
        assert_eq!(plan.segments, vec!["A。B。", "C。D。", "E。"]);
        assert_eq!(plan.total_sentences, 5);
    }

    #[tokio::test]
    async fn test_precomputed_reuse_skips_recompute() {
        let mut payload = request("A。B。C。D。");
        payload.sentences_per_segment = 2;
        payload.request_signature = Some(build_request_signature(
            &payload.text,
            "sentence",
            2,
            payload.fixed_size,
            "",
        ));
        payload.precomputed_segments = vec!["A。B。".to_string(), "C。D。".to_string()];

        let plan = build_segment_plan(&disabled_llm(), &payload).await.unwrap();
        assert_eq!(plan.segments, payload.precomputed_segments);
    }

    #[tokio::test]
    async fn test_mismatched_signature_recomputes() {
        let mut payload = request("A。B。C。D。");
        payload.sentences_per_segment = 2;
        payload.request_signature = Some("0".repeat(64));
        payload.precomputed_segments = vec!["bogus".to_string()];

        let plan = build_segment_plan(&disabled_llm(), &payload).await.unwrap();
        assert_eq!(plan.segments, vec!["A。B。", "C。D。"]);
    }

    #[tokio::test]
    async fn test_smart_falls_back_to_groups_of_five() {
        let mut payload = request("一。二。三。四。五。六。七。");
        payload.segment_method = SegmentMethod::Smart;
        let plan = build_segment_plan(&disabled_llm(), &payload).await.unwrap();
        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.segments[0], "一。二。三。四。五。");
    }

    #[tokio::test]
    async fn test_range_and_cap_applied() {
        let mut payload = request("A。B。C。D。E。F。");
        payload.sentences_per_segment = 1;
        payload.segment_range = Some("2,4-6".to_string());
        payload.max_segment_groups = 3;
        let plan = build_segment_plan(&disabled_llm(), &payload).await.unwrap();
        assert_eq!(plan.segments, vec!["B。", "D。", "E。"]);
    }

    #[tokio::test]
    async fn test_empty_result_is_validation_error() {
        let payload = request("   ");
        let err = build_segment_plan(&disabled_llm(), &payload).await.unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
    }
}
