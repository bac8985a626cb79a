//! Per-segment image provenance report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a segment's frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSource {
    /// Strict scene-cache hit
    Cache,
    /// Fresh provider generation
    Generated,
    /// Lenient LLM-selected cache entry after generation failed
    FallbackLlm,
    /// Strict re-lookup hit after generation failed
    FallbackCache,
    /// Random cache entry sharing the segment character
    FallbackCharacterCache,
    /// Random scene-only cache entry
    FallbackSceneOnlyCache,
    /// Character reference image copied verbatim
    FallbackReference,
    /// Any random live cache entry
    FallbackRandomCache,
    /// Anything not covered above
    Other,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Cache => "cache",
            ImageSource::Generated => "generated",
            ImageSource::FallbackLlm => "fallback-llm",
            ImageSource::FallbackCache => "fallback-cache",
            ImageSource::FallbackCharacterCache => "fallback-character-cache",
            ImageSource::FallbackSceneOnlyCache => "fallback-scene-only-cache",
            ImageSource::FallbackReference => "fallback-reference",
            ImageSource::FallbackRandomCache => "fallback-random-cache",
            ImageSource::Other => "other",
        }
    }
}

/// Cumulative tally of image provenance for one job.
///
/// Persisted with the job row and restored on resume so repeated
/// resumptions keep cumulative totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageSourceReport {
    #[serde(default)]
    pub cache: u32,
    #[serde(default)]
    pub generated: u32,
    #[serde(default)]
    pub fallback_llm: u32,
    #[serde(default)]
    pub fallback_cache: u32,
    #[serde(default)]
    pub fallback_character_cache: u32,
    #[serde(default)]
    pub fallback_scene_only_cache: u32,
    #[serde(default)]
    pub fallback_reference: u32,
    #[serde(default)]
    pub fallback_random_cache: u32,
    #[serde(default)]
    pub other: u32,
}

impl ImageSourceReport {
    /// Record one resolved segment.
    pub fn record(&mut self, source: ImageSource) {
        let slot = match source {
            ImageSource::Cache => &mut self.cache,
            ImageSource::Generated => &mut self.generated,
            ImageSource::FallbackLlm => &mut self.fallback_llm,
            ImageSource::FallbackCache => &mut self.fallback_cache,
            ImageSource::FallbackCharacterCache => &mut self.fallback_character_cache,
            ImageSource::FallbackSceneOnlyCache => &mut self.fallback_scene_only_cache,
            ImageSource::FallbackReference => &mut self.fallback_reference,
            ImageSource::FallbackRandomCache => &mut self.fallback_random_cache,
            ImageSource::Other => &mut self.other,
        };
        *slot += 1;
    }

    /// Sum across every bucket.
    pub fn total(&self) -> u32 {
        self.cache
            + self.generated
            + self.fallback_llm
            + self.fallback_cache
            + self.fallback_character_cache
            + self.fallback_scene_only_cache
            + self.fallback_reference
            + self.fallback_random_cache
            + self.other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_total() {
        let mut report = ImageSourceReport::default();
        report.record(ImageSource::Cache);
        report.record(ImageSource::Cache);
        report.record(ImageSource::Generated);
        report.record(ImageSource::FallbackReference);
        assert_eq!(report.cache, 2);
        assert_eq!(report.generated, 1);
        assert_eq!(report.fallback_reference, 1);
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn test_json_round_trip_preserves_counts() {
        let mut report = ImageSourceReport::default();
        report.record(ImageSource::FallbackLlm);
        report.record(ImageSource::FallbackSceneOnlyCache);
        let json = serde_json::to_string(&report).unwrap();
        let restored: ImageSourceReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, report);
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(ImageSource::FallbackCharacterCache.as_str(), "fallback-character-cache");
        assert_eq!(ImageSource::Cache.as_str(), "cache");
    }
}
