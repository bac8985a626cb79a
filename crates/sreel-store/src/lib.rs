#![deny(unreachable_patterns)]
//! Durable job state for the StoryReel core.
//!
//! This crate provides:
//! - A transactional SQLite table of job status rows
//! - A side table for full serialized request payloads
//! - A separate cancel-flag table (level-triggered, survives status
//!   updates, cleared by the scheduler at job end)
//! - Additive schema evolution via detect-and-alter

pub mod error;
pub mod jobs;

pub use error::{StoreError, StoreResult};
pub use jobs::JobStore;
