#![deny(unreachable_patterns)]
//! Scene-image reuse cache for the StoryReel core.
//!
//! This crate provides:
//! - Descriptor normalization and match-profile precomputation
//! - The SQLite index with its reference-binding side table
//! - Strict and lenient lookups with LLM selection and re-verification
//! - Random picks for the image resolver's fallback cascade
//! - Cached-frame materialization at pipeline paths

pub mod descriptor;
pub mod error;
pub mod index;
pub mod matching;
pub mod render;

pub use descriptor::{
    build_match_profile, build_scene_descriptor, normalize_reference_path, normalize_text,
    reference_image_id, tokenize, MatchProfile, SceneDescriptor,
};
pub use error::{CacheError, CacheResult};
pub use index::{SceneCacheEntry, SceneCacheIndex};
pub use matching::{
    compute_verdict, find_reusable_scene_image, force_llm_select_scene_image, MatchType,
    MatchVerdict, SceneMatch,
};
pub use render::render_cached_image_to_output;
