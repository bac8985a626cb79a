//! Job identity, lifecycle state, and durable status snapshots.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::report::ImageSourceReport;

/// Minimum byte size of a final output file for a job to count as
/// completed. Anything smaller is treated as a truncated artifact.
pub const FINAL_VIDEO_MIN_BYTES: u64 = 16 * 1024;

/// Unique identifier for a generation job (opaque 128-bit hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job row exists, worker not started yet
    #[default]
    Queued,
    /// A worker is driving the pipeline
    Running,
    /// Final video exists on disk
    Completed,
    /// Pipeline failed; terminal until explicitly resumed
    Failed,
    /// Cancel flag was observed by the worker
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Parse from the snake_case form stored in the job table.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// States that startup recovery re-enters a worker for.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable status snapshot of a generation job.
///
/// The scheduler owns the in-memory progress; the job store owns these
/// rows. Once `completed` with a non-empty output path of at least
/// [`FINAL_VIDEO_MIN_BYTES`], the on-disk artifacts are authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub job_id: JobId,

    /// Lifecycle state
    pub status: JobState,

    /// Progress in [0, 1]
    #[serde(default)]
    pub progress: f32,

    /// Human-readable step label (e.g. "segment", "render-segment")
    #[serde(default)]
    pub step: String,

    /// Human-readable message for the current step
    #[serde(default)]
    pub message: String,

    /// 0-based index of the segment currently being processed
    #[serde(default)]
    pub current_segment: u32,

    /// Total segment count for this job
    #[serde(default)]
    pub total_segments: u32,

    /// Download URL of the final video, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_video_url: Option<String>,

    /// On-disk path of the final video, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_video_path: Option<String>,

    /// Number of per-segment clips finalized so far
    #[serde(default)]
    pub clip_count: u32,

    /// Preview URLs derived from `clip_count`, clamped by the
    /// configured preview limit (limit 0 emits none)
    #[serde(default)]
    pub clip_preview_urls: Vec<String>,

    /// Cumulative tally of image provenance per segment; restored on
    /// resume so repeated resumptions don't under-count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_source_report: Option<ImageSourceReport>,

    /// Creation timestamp (preserved across updates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a fresh queued snapshot for a new job.
    pub fn queued(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobState::Queued,
            progress: 0.0,
            step: "queued".to_string(),
            message: "Job queued".to_string(),
            current_segment: 0,
            total_segments: 0,
            output_video_url: None,
            output_video_path: None,
            clip_count: 0,
            clip_preview_urls: Vec::new(),
            image_source_report: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Clamp progress into [0, 1].
    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = progress.clamp(0.0, 1.0);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
