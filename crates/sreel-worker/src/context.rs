//! Shared processing context: stores, clients, and the active-runner
//! set that prevents duplicate workers per job.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use sreel_cache::SceneCacheIndex;
use sreel_llm::{ImageClient, LlmClient};
use sreel_models::JobId;
use sreel_store::JobStore;
use sreel_tts::TtsEngine;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Everything a per-job worker needs.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<JobStore>,
    pub cache: Arc<SceneCacheIndex>,
    pub llm: LlmClient,
    pub image: ImageClient,
    pub tts: TtsEngine,
    active_jobs: Mutex<HashSet<String>>,
}

impl ProcessingContext {
    /// Open the durable stores and provider clients.
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        config.ensure_directories()?;

        let store = Arc::new(JobStore::open(
            &config.jobs_db_path,
            config.job_clip_preview_limit,
        )?);
        let cache = Arc::new(SceneCacheIndex::open(
            &config.scene_cache_db_path,
            &config.scene_cache_dir,
        )?);
        let llm = LlmClient::new(
            &config.llm_api_base_url,
            &config.llm_api_key,
            &config.llm_default_model,
        );
        let image = ImageClient::new(&config.image_api_url, &config.image_api_key, &config.image_model);
        let tts = TtsEngine::new(config.tts_api_url.clone());

        Ok(Self {
            config,
            store,
            cache,
            llm,
            image,
            tts,
            active_jobs: Mutex::new(HashSet::new()),
        })
    }

    /// Claim a job for a worker. Returns false when a worker is
    /// already running for this id (duplicate resume requests, startup
    /// recovery racing an explicit resume).
    pub fn try_claim(&self, job_id: &JobId) -> bool {
        self.active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job_id.as_str().to_string())
    }

    /// Release a claimed job at worker end.
    pub fn release(&self, job_id: &JobId) {
        self.active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(job_id.as_str());
    }

    /// Whether a worker is currently running for this id.
    pub fn is_active(&self, job_id: &JobId) -> bool {
        self.active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(job_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_release_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ProcessingContext::new(WorkerConfig::rooted_at(dir.path())).unwrap();
        let job_id = JobId::new();

        assert!(ctx.try_claim(&job_id));
        assert!(ctx.is_active(&job_id));
        assert!(!ctx.try_claim(&job_id));

        ctx.release(&job_id);
        assert!(!ctx.is_active(&job_id));
        assert!(ctx.try_claim(&job_id));
    }
}
