#![deny(unreachable_patterns)]
//! Provider clients and prompt building for the StoryReel core.
//!
//! This crate provides:
//! - An OpenAI-compatible chat-completions client with strict-JSON
//!   extraction (fence stripping, then outermost-object fallback)
//! - The prompt builder: world summary, character analysis, segment
//!   image bundles, aliases, smart segmentation
//! - The scene-reuse selector used by the scene cache
//! - The streaming image provider client

pub mod builder;
pub mod client;
pub mod error;
pub mod image;
pub mod json;
pub mod prompts;
pub mod selector;

pub use builder::{
    analyze_characters, build_segment_image_bundle, contains_first_person,
    enforce_identity_flags, fallback_character_analysis, fallback_scene_metadata,
    smart_segments, suggest_aliases, summarize_story_world_context, CharacterAssignment,
    PromptBundle, SceneMetadata,
};
pub use client::{LlmClient, SCENE_REUSE_SELECTOR_SYSTEM_PROMPT, STRICT_JSON_SYSTEM_PROMPT};
pub use error::{ImageGenError, ImageGenResult, LlmError, LlmResult};
pub use image::{extract_first_url, ImageClient};
pub use json::extract_json_object;
pub use selector::{select_scene_candidate, SelectorMode, SelectorVerdict};
