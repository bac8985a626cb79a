#![deny(unreachable_patterns)]
//! Deterministic text processing for the StoryReel pipeline.
//!
//! Everything in this crate is pure and reproducible: the sentence
//! splitter, sentence grouping, fixed-size slicing, caption units, the
//! segmentation request signature, and 1-based range selection. The
//! LLM-planned "smart" method lives with the prompt builder; its
//! deterministic fallback (groups of five sentences) is built from the
//! primitives here.

pub mod range;
pub mod signature;
pub mod splitter;

pub use range::{select_segments_by_range, RangeError};
pub use signature::{build_request_signature, resolve_precomputed_segments};
pub use splitter::{
    count_sentences, group_sentences, normalize_for_split, segment_by_fixed, split_caption_units,
    split_sentences,
};
