#![deny(unreachable_patterns)]
//! Speech synthesis for the StoryReel core.
//!
//! This crate provides:
//! - Dialogue/narration splitting with per-voice routing
//! - The three-tier synthesis chain: remote HTTP, local engine
//!   process, silent WAV (TTS is never fatal)
//! - Whole-segment assembly via the encoder's concat demuxer
//! - Voice sanitization against the fixed catalog

pub mod dialogue;
pub mod error;
pub mod segment;
pub mod synth;
pub mod voices;

pub use dialogue::{build_tts_pieces, extract_quote_blocks, merge_pieces, pick_dialogue_voice};
pub use error::{TtsError, TtsResult};
pub use segment::synthesize_segment_tts;
pub use synth::{estimate_duration_by_text, resolve_duration, write_silent_wav, TtsEngine};
pub use voices::sanitize_character_voices;
