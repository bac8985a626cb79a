#![deny(unreachable_patterns)]
//! Video generation worker.
//!
//! This crate provides:
//! - The per-job pipeline (segment, prompt∥TTS, image resolve, clip
//!   render, compose) with checkpoint persistence
//! - Default speaking-character selection
//! - The image resolver with its multi-tier fallback cascade
//! - Job lifecycle entry points and startup crash recovery
//! - The active-runner set preventing duplicate workers per job

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod plan;
pub mod recovery;
pub mod resolver;
pub mod runner;
pub mod speaker;

pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use plan::{build_segment_plan, SegmentPlan};
pub use recovery::{
    cancel_job, create_job, delete_job, recover_incomplete_jobs, remix_job_bgm, resume_job,
    spawn_worker,
};
pub use resolver::{resolve_segment_image, ImageRequest, ResolvedImage};
pub use runner::run_video_job;
pub use speaker::{default_main_index, pick_default_character};
