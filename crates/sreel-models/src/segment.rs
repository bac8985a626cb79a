//! Ordered text units produced by segmentation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One ordered text unit fed to a single scene render.
///
/// Immutable once the job starts; clip files are named by the 0-based
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// 0-based position in the segment vector
    pub index: u32,

    /// Segment text
    pub text: String,

    /// Sentence count for the sentence method, 0 otherwise
    #[serde(default)]
    pub sentence_count: u32,
}

impl Segment {
    pub fn new(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            sentence_count: 0,
        }
    }

    /// Per-segment clip filename, e.g. `clip_0003.mp4`.
    pub fn clip_filename(&self) -> String {
        format!("clip_{:04}.mp4", self.index)
    }

    /// Per-segment image filename, e.g. `segment_0003.png`.
    pub fn image_filename(&self) -> String {
        format!("segment_{:04}.png", self.index)
    }

    /// Per-segment audio filename, e.g. `segment_0003.mp3`.
    pub fn audio_filename(&self) -> String {
        format!("segment_{:04}.mp3", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_filenames() {
        let segment = Segment::new(7, "她转身离开。");
        assert_eq!(segment.clip_filename(), "clip_0007.mp4");
        assert_eq!(segment.image_filename(), "segment_0007.png");
        assert_eq!(segment.audio_filename(), "segment_0007.mp3");
    }
}
