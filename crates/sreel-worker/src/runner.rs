//! The per-job worker: drives segmentation, the per-segment pipeline,
//! and final composition, persisting progress at checkpoint
//! granularity so a crash resumes at the first missing clip.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use sreel_cache::build_scene_descriptor;
use sreel_llm::{
    build_segment_image_bundle, summarize_story_world_context, CharacterAssignment,
};
use sreel_media::{
    compose_final_video, file_at_least, remove_file_quietly, render_clip, ComposeSettings,
    WatermarkConfig,
};
use sreel_models::{
    parse_resolution, Character, GenerateVideoRequest, ImageSourceReport, Job, JobId, JobState,
    Segment, FINAL_VIDEO_MIN_BYTES, NARRATOR_VOICE_ID,
};
use sreel_tts::{sanitize_character_voices, synthesize_segment_tts};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::plan::build_segment_plan;
use crate::resolver::{resolve_segment_image, ImageRequest};
use crate::speaker::{default_main_index, pick_default_character};

/// Progress weights: segmentation ends at 0.10, the per-segment loop
/// spans up to 0.85, composition up to 0.95, done is 1.0.
const PROGRESS_SEGMENTED: f32 = 0.10;
const PROGRESS_RENDER_SPAN: f32 = 0.75;
const PROGRESS_COMPOSE: f32 = 0.85;

/// Entry point for one job's worker. Owns the job until it reaches a
/// terminal state; always clears the cancel flag and releases the
/// active-runner claim on the way out.
pub async fn run_video_job(
    ctx: Arc<ProcessingContext>,
    job_id: JobId,
    payload: GenerateVideoRequest,
    base_url: String,
) {
    let logger = JobLogger::new(&job_id, "video_generation");
    logger.log_start("driving generation pipeline");

    let result = drive_pipeline(&ctx, &job_id, &payload, &base_url, &logger).await;
    match result {
        Ok(()) => {}
        Err(err) => {
            logger.log_error(&err.to_string());
            // Keep whatever counters the last checkpoint persisted.
            let mut job = ctx
                .store
                .get(&job_id)
                .ok()
                .flatten()
                .unwrap_or_else(|| Job::queued(job_id.clone()));
            job.status = JobState::Failed;
            job.progress = 1.0;
            job.step = "error".to_string();
            job.message = err.job_message();
            if let Err(store_err) = ctx.store.set(&job) {
                logger.log_error(&format!("failed to persist failure state: {store_err}"));
            }
        }
    }

    if let Err(err) = ctx.store.clear_cancel(&job_id) {
        logger.log_warning(&format!("failed to clear cancel flag: {err}"));
    }
    ctx.release(&job_id);
}

struct Checkpoint<'a> {
    ctx: &'a ProcessingContext,
    job_id: &'a JobId,
    base_url: &'a str,
    total_segments: u32,
}

impl Checkpoint<'_> {
    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        status: JobState,
        progress: f32,
        step: &str,
        message: String,
        current_segment: u32,
        clip_count: u32,
        report: Option<&ImageSourceReport>,
        output_path: Option<&Path>,
    ) -> WorkerResult<()> {
        let output_video_url = output_path.and_then(|_| {
            if self.base_url.is_empty() {
                None
            } else {
                Some(format!(
                    "{}/api/jobs/{}/video",
                    self.base_url,
                    self.job_id.as_str()
                ))
            }
        });
        let job = Job {
            job_id: self.job_id.clone(),
            status,
            progress: progress.clamp(0.0, 1.0),
            step: step.to_string(),
            message,
            current_segment,
            total_segments: self.total_segments,
            output_video_url,
            output_video_path: output_path.map(|p| p.to_string_lossy().to_string()),
            clip_count,
            clip_preview_urls: Vec::new(),
            image_source_report: report.cloned(),
            created_at: None,
            updated_at: None,
        };
        self.ctx.store.set(&job)?;
        Ok(())
    }
}

async fn drive_pipeline(
    ctx: &Arc<ProcessingContext>,
    job_id: &JobId,
    payload: &GenerateVideoRequest,
    base_url: &str,
    logger: &JobLogger,
) -> WorkerResult<()> {
    let temp_dir = ctx.config.job_temp_dir(job_id);
    let clips_dir = ctx.config.job_clips_dir(job_id);
    std::fs::create_dir_all(&clips_dir)?;

    let mut checkpoint = Checkpoint {
        ctx: ctx.as_ref(),
        job_id,
        base_url,
        total_segments: 0,
    };
    checkpoint.write(
        JobState::Running,
        0.05,
        "segment",
        "Segmenting text".to_string(),
        0,
        0,
        None,
        None,
    )?;

    let plan = build_segment_plan(&ctx.llm, payload).await?;
    let segments = plan.segments;
    let total = segments.len();
    checkpoint.total_segments = total as u32;

    let resolution = parse_resolution(&payload.resolution);
    let mut characters: Vec<Character> = payload.characters.clone();
    for character in &mut characters {
        character.clamp_importance();
    }
    sanitize_character_voices(&mut characters, NARRATOR_VOICE_ID);

    let world_context =
        summarize_story_world_context(&ctx.llm, &payload.text, payload.model_id.as_deref()).await;

    // Restored so repeated resumptions keep cumulative totals.
    let mut report: ImageSourceReport = ctx
        .store
        .get(job_id)?
        .and_then(|job| job.image_source_report)
        .unwrap_or_default();

    let window = payload.scene_reuse_no_repeat_window as usize;
    let mut recent_entry_ids: VecDeque<String> = VecDeque::new();
    let mut previous_pick: Option<usize> = None;
    let mut clip_count: u32 = 0;

    for (index, segment_text) in segments.iter().enumerate() {
        if ctx.store.is_cancelled(job_id)? {
            logger.log_progress("cancel flag observed, stopping before next segment");
            checkpoint.write(
                JobState::Cancelled,
                1.0,
                "cancelled",
                "Job cancelled".to_string(),
                index as u32,
                clip_count,
                Some(&report),
                None,
            )?;
            return Ok(());
        }

        let segment = Segment::new(index as u32, segment_text.clone());
        let clip_path = clips_dir.join(segment.clip_filename());
        if file_at_least(&clip_path, 1) {
            // Crash-resume: this scene is already finalized.
            clip_count += 1;
            continue;
        }

        let progress = PROGRESS_SEGMENTED + (index as f32 / total as f32) * PROGRESS_RENDER_SPAN;
        checkpoint.write(
            JobState::Running,
            progress,
            "render-segment",
            format!(
                "Rendering segment {}/{total} (sentences: {})",
                index + 1,
                if plan.total_sentences > 0 {
                    plan.total_sentences.to_string()
                } else {
                    "-".to_string()
                }
            ),
            index as u32,
            clip_count,
            Some(&report),
            None,
        )?;

        let adjacent: Vec<&str> = [
            index.checked_sub(1).map(|i| segments[i].as_str()),
            segments.get(index + 1).map(String::as_str),
        ]
        .into_iter()
        .flatten()
        .collect();

        let picked = pick_default_character(&characters, segment_text, &adjacent, previous_pick)
            .unwrap_or_else(|| default_main_index(&characters));
        let default_assignment = CharacterAssignment {
            primary_index: Some(picked),
            related_indexes: Vec::new(),
            confidence: 0.0,
            reason: String::new(),
        };

        let image_path = temp_dir.join(segment.image_filename());
        let audio_path = temp_dir.join(segment.audio_filename());

        let fallback_character = Character::narrator();
        let primary = characters.get(picked).unwrap_or(&fallback_character);
        let adjacent_owned: Vec<String> = adjacent.iter().map(|s| s.to_string()).collect();

        // Prompt building and TTS run concurrently; the image resolve
        // below needs the finished bundle.
        let (bundle, tts_result) = tokio::join!(
            build_segment_image_bundle(
                &ctx.llm,
                primary,
                segment_text,
                &adjacent_owned,
                &characters,
                &default_assignment,
                world_context.as_deref(),
                payload.model_id.as_deref(),
            ),
            synthesize_segment_tts(
                &ctx.tts,
                segment_text,
                &characters,
                &audio_path,
                NARRATOR_VOICE_ID,
            )
        );
        let (audio_file, audio_duration) = tts_result?;

        // The LLM's character assignment overrides the heuristic pick
        // when it returns valid candidate indexes.
        let assignment = &bundle.assignment;
        let primary_index = assignment
            .primary_index
            .filter(|i| *i < characters.len())
            .unwrap_or(picked);
        previous_pick = Some(primary_index);
        let primary = characters.get(primary_index).unwrap_or(&fallback_character);
        let related: Vec<&Character> = assignment
            .related_indexes
            .iter()
            .filter(|i| **i < characters.len() && **i != primary_index)
            .map(|i| &characters[*i])
            .collect();

        let metadata = &bundle.metadata;
        let descriptor = build_scene_descriptor(
            primary,
            &related,
            segment_text,
            &metadata.action_hint,
            &metadata.location_hint,
            &metadata.scene_elements,
            &metadata.action_keywords,
            &metadata.location_keywords,
            &metadata.mood,
            &metadata.shot_type,
            metadata.is_scene_only,
        );

        let mut reference_paths: Vec<PathBuf> = Vec::new();
        for candidate in std::iter::once(primary).chain(related.iter().copied()) {
            if let Some(path) = candidate.reference_image_path.as_deref() {
                let path = PathBuf::from(path);
                if path.exists() && !reference_paths.contains(&path) {
                    reference_paths.push(path);
                }
            }
            if reference_paths.len() >= 2 {
                break;
            }
        }

        let disallow: HashSet<String> = recent_entry_ids.iter().cloned().collect();
        let resolved = resolve_segment_image(
            &ctx.cache,
            &ctx.llm,
            &ctx.image,
            &ImageRequest {
                descriptor: &descriptor,
                prompt: &bundle.prompt,
                reference_paths,
                aspect_ratio: payload.image_aspect_ratio.as_deref(),
                output_path: &image_path,
                enable_scene_reuse: payload.enable_scene_image_reuse,
                disallow_entry_ids: &disallow,
                model_id: payload.model_id.as_deref(),
            },
        )
        .await?;

        report.record(resolved.source);
        info!(
            job_id = %job_id,
            segment = index + 1,
            source = resolved.source.as_str(),
            "Segment image resolved"
        );
        if window > 0 {
            if let Some(entry_id) = &resolved.cache_entry_id {
                recent_entry_ids.push_back(entry_id.clone());
                while recent_entry_ids.len() > window {
                    recent_entry_ids.pop_front();
                }
            }
        }

        render_clip(
            &resolved.path,
            &audio_file,
            segment_text,
            audio_duration.max(1.0),
            &clip_path,
            payload.fps,
            resolution,
            payload.subtitle_style,
            payload.camera_motion,
            payload.render_mode,
            ctx.config.subtitle_font_path.as_deref(),
        )
        .await?;
        clip_count += 1;

        // Per-segment media is owned by the scheduler and dies with
        // the finalized clip; the clip itself survives until the job
        // is deleted.
        remove_file_quietly(&image_path);
        remove_file_quietly(&audio_file);
        remove_file_quietly(audio_path.with_extension("wav"));

        checkpoint.write(
            JobState::Running,
            PROGRESS_SEGMENTED + ((index + 1) as f32 / total as f32) * PROGRESS_RENDER_SPAN,
            "render-segment",
            format!("Rendered segment {}/{total}", index + 1),
            (index + 1) as u32,
            clip_count,
            Some(&report),
            None,
        )?;
    }

    if ctx.store.is_cancelled(job_id)? {
        checkpoint.write(
            JobState::Cancelled,
            1.0,
            "cancelled",
            "Job cancelled".to_string(),
            total as u32,
            clip_count,
            Some(&report),
            None,
        )?;
        return Ok(());
    }

    // Every clip must exist before composition; resume fills gaps.
    let mut clip_paths: Vec<PathBuf> = Vec::with_capacity(total);
    for index in 0..total {
        let clip_path = clips_dir.join(format!("clip_{index:04}.mp4"));
        if !clip_path.exists() {
            return Err(WorkerError::job_failed(format!(
                "scene clip missing before compose: {}",
                clip_path.display()
            )));
        }
        clip_paths.push(clip_path);
    }

    let output_path = ctx.config.job_output_path(job_id);
    if !file_at_least(&output_path, FINAL_VIDEO_MIN_BYTES) {
        checkpoint.write(
            JobState::Running,
            PROGRESS_COMPOSE,
            "compose",
            "Composing final video".to_string(),
            total as u32,
            clip_count,
            Some(&report),
            None,
        )?;

        let watermark = watermark_config(payload);
        let settings = ComposeSettings {
            render_mode: payload.render_mode,
            bgm_enabled: payload.bgm_enabled,
            bgm_volume: payload.bgm_volume,
            bgm_path: ctx.config.resolve_bgm_path(),
            novel_alias: payload.novel_alias.clone(),
            watermark,
            subtitle_font: ctx.config.subtitle_font_path.clone(),
        };
        compose_final_video(&clip_paths, &output_path, &settings).await?;

        if ctx.store.is_cancelled(job_id)? {
            checkpoint.write(
                JobState::Cancelled,
                1.0,
                "cancelled",
                "Job cancelled during compose stage".to_string(),
                total as u32,
                clip_count,
                Some(&report),
                None,
            )?;
            return Ok(());
        }
    } else {
        logger.log_progress("final video already on disk, skipping compose");
    }

    checkpoint.write(
        JobState::Completed,
        1.0,
        "done",
        "Video generation completed".to_string(),
        total as u32,
        clip_count,
        Some(&report),
        Some(&output_path),
    )?;
    logger.log_completion("final video persisted");
    Ok(())
}

/// Watermark settings from the payload.
pub(crate) fn watermark_config(payload: &GenerateVideoRequest) -> WatermarkConfig {
    if let Some(image_path) = payload
        .watermark_image_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
    {
        return WatermarkConfig::with_image(image_path);
    }
    if payload.watermark_text.trim().is_empty() {
        WatermarkConfig::default()
    } else {
        WatermarkConfig::with_text(payload.watermark_text.trim())
    }
}
