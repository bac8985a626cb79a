//! Job lifecycle entry points: creation, cancellation, explicit
//! resume, deletion, and startup recovery of interrupted jobs.

use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use sreel_media::{remove_dir_quietly, remove_file_quietly};
use sreel_models::{GenerateVideoRequest, Job, JobId, JobState};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::runner::run_video_job;

/// Validate a request, persist the queued row and payload, and start
/// the per-job worker. The payload save must succeed before the worker
/// starts, else a crash could never resume.
pub fn create_job(
    ctx: &Arc<ProcessingContext>,
    payload: GenerateVideoRequest,
    base_url: &str,
) -> WorkerResult<JobId> {
    payload
        .validate()
        .map_err(|err| WorkerError::validation(err.to_string()))?;
    if payload.text.trim().is_empty() {
        return Err(WorkerError::validation("text is required"));
    }

    let job_id = JobId::new();
    ctx.store.set(&Job::queued(job_id.clone()))?;
    ctx.store.save_payload(&job_id, &payload, base_url)?;

    spawn_worker(ctx, job_id.clone(), payload, base_url.to_string());
    Ok(job_id)
}

/// Spawn the worker task for a job unless one is already running.
pub fn spawn_worker(
    ctx: &Arc<ProcessingContext>,
    job_id: JobId,
    payload: GenerateVideoRequest,
    base_url: String,
) -> bool {
    if !ctx.try_claim(&job_id) {
        warn!(job_id = %job_id, "Worker already active for job, not spawning another");
        return false;
    }
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        run_video_job(ctx, job_id, payload, base_url).await;
    });
    true
}

/// Raise the cancel flag and reflect it on the job row when the job is
/// still in flight. Returns false for unknown jobs.
pub fn cancel_job(ctx: &Arc<ProcessingContext>, job_id: &JobId) -> WorkerResult<bool> {
    if !ctx.store.cancel(job_id)? {
        return Ok(false);
    }
    if let Some(current) = ctx.store.get(job_id)? {
        if current.status.is_recoverable() {
            let mut snapshot = current;
            snapshot.status = JobState::Cancelled;
            snapshot.step = "cancelled".to_string();
            snapshot.message = "Cancel request accepted, stopping".to_string();
            ctx.store.set(&snapshot)?;
        }
    }
    Ok(true)
}

/// Explicitly resume a job from its saved payload. Finished clips are
/// skipped by the worker; a terminal `completed` job resumes as a
/// no-op that re-verifies its artifact.
pub fn resume_job(ctx: &Arc<ProcessingContext>, job_id: &JobId) -> WorkerResult<bool> {
    let Some((payload, base_url)) = ctx.store.load_payload(job_id)? else {
        return Ok(false);
    };
    ctx.store.clear_cancel(job_id)?;
    Ok(spawn_worker(ctx, job_id.clone(), payload, base_url))
}

/// Delete a job's rows and artifacts: the durable rows, the temp tree
/// (clips included), and the final video.
pub fn delete_job(ctx: &Arc<ProcessingContext>, job_id: &JobId) -> WorkerResult<bool> {
    let existed = ctx.store.delete_job(job_id)?;
    remove_dir_quietly(ctx.config.job_temp_dir(job_id));
    remove_file_quietly(ctx.config.job_output_path(job_id));
    Ok(existed)
}

/// Recompose a completed job's final video from its surviving clips
/// with fresh BGM settings. Returns false when the job is not in a
/// remixable state (missing row, not completed, clips gone).
pub async fn remix_job_bgm(
    ctx: &Arc<ProcessingContext>,
    job_id: &JobId,
    bgm_enabled: bool,
    bgm_volume: f32,
) -> WorkerResult<bool> {
    let Some(current) = ctx.store.get(job_id)? else {
        return Ok(false);
    };
    if current.status != JobState::Completed || current.output_video_path.is_none() {
        return Ok(false);
    }

    let Some((payload, _)) = ctx.store.load_payload(job_id)? else {
        return Ok(false);
    };
    let clips_dir = ctx.config.job_clips_dir(job_id);
    let mut clip_paths: Vec<std::path::PathBuf> = std::fs::read_dir(&clips_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| name.starts_with("clip_") && name.ends_with(".mp4"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    if clip_paths.is_empty() {
        return Ok(false);
    }
    clip_paths.sort();

    let settings = sreel_media::ComposeSettings {
        render_mode: payload.render_mode,
        bgm_enabled,
        bgm_volume,
        bgm_path: ctx.config.resolve_bgm_path(),
        novel_alias: payload.novel_alias.clone(),
        watermark: crate::runner::watermark_config(&payload),
        subtitle_font: ctx.config.subtitle_font_path.clone(),
    };
    sreel_media::remix_final_video(&clip_paths, &ctx.config.job_output_path(job_id), &settings)
        .await?;
    Ok(true)
}

/// Enumerate incomplete jobs oldest first and restart each from its
/// stored payload. A job row without a payload row is marked failed
/// with a clear message.
pub fn recover_incomplete_jobs(ctx: &Arc<ProcessingContext>) -> WorkerResult<usize> {
    let job_ids = ctx.store.list_incomplete_job_ids()?;
    let mut resumed = 0usize;

    for job_id in job_ids {
        match ctx.store.load_payload(&job_id)? {
            Some((payload, base_url)) => {
                info!(job_id = %job_id, "Recovering interrupted job");
                if spawn_worker(ctx, job_id, payload, base_url) {
                    resumed += 1;
                }
            }
            None => {
                warn!(job_id = %job_id, "Job payload missing, marking failed");
                let mut job = ctx
                    .store
                    .get(&job_id)?
                    .unwrap_or_else(|| Job::queued(job_id.clone()));
                job.status = JobState::Failed;
                job.progress = 1.0;
                job.step = "error".to_string();
                job.message = "Job payload missing; cannot resume".to_string();
                ctx.store.set(&job)?;
            }
        }
    }
    Ok(resumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;

    fn context() -> (tempfile::TempDir, Arc<ProcessingContext>) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ProcessingContext::new(WorkerConfig::rooted_at(dir.path())).unwrap());
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_create_job_rejects_empty_text() {
        let (_dir, ctx) = context();
        let err = create_job(&ctx, GenerateVideoRequest::for_text("  "), "").unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_job_persists_payload_before_start() {
        let (_dir, ctx) = context();
        let job_id = create_job(
            &ctx,
            GenerateVideoRequest::for_text("第一段。第二段。"),
            "http://localhost:8000",
        )
        .unwrap();

        let (payload, base_url) = ctx.store.load_payload(&job_id).unwrap().unwrap();
        assert_eq!(payload.text, "第一段。第二段。");
        assert_eq!(base_url, "http://localhost:8000");
        assert!(ctx.store.get(&job_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (_dir, ctx) = context();
        assert!(!cancel_job(&ctx, &JobId::new()).unwrap());
    }

    #[tokio::test]
    async fn test_recovery_marks_payloadless_job_failed() {
        let (_dir, ctx) = context();
        let job_id = JobId::new();
        let mut job = Job::queued(job_id.clone());
        job.status = JobState::Running;
        ctx.store.set(&job).unwrap();

        let resumed = recover_incomplete_jobs(&ctx).unwrap();
        assert_eq!(resumed, 0);

        let recovered = ctx.store.get(&job_id).unwrap().unwrap();
        assert_eq!(recovered.status, JobState::Failed);
        assert!(recovered.message.contains("payload missing"));
    }

    #[tokio::test]
    async fn test_duplicate_spawn_prevented() {
        let (_dir, ctx) = context();
        let job_id = JobId::new();
        assert!(ctx.try_claim(&job_id));

        let spawned = spawn_worker(
            &ctx,
            job_id.clone(),
            GenerateVideoRequest::for_text("x"),
            String::new(),
        );
        assert!(!spawned);
    }

    #[tokio::test]
    async fn test_delete_job_removes_artifacts() {
        let (_dir, ctx) = context();
        let job_id = JobId::new();
        ctx.store.set(&Job::queued(job_id.clone())).unwrap();

        let clips = ctx.config.job_clips_dir(&job_id);
        std::fs::create_dir_all(&clips).unwrap();
        std::fs::write(clips.join("clip_0000.mp4"), b"clip").unwrap();
        std::fs::write(ctx.config.job_output_path(&job_id), b"video").unwrap();

        assert!(delete_job(&ctx, &job_id).unwrap());
        assert!(!ctx.config.job_temp_dir(&job_id).exists());
        assert!(!ctx.config.job_output_path(&job_id).exists());
        assert!(ctx.store.get(&job_id).unwrap().is_none());
    }
}
