//! Worker configuration.

use std::path::{Path, PathBuf};

use sreel_models::JobId;

/// Worker configuration, env-driven with the on-disk layout defaults.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Project root all relative paths resolve against
    pub root: PathBuf,

    /// Final videos: `output/<job_id>.mp4`
    pub output_dir: PathBuf,
    /// Per-job scratch: `temp/<job_id>/…`
    pub temp_dir: PathBuf,
    /// Jobs database: `assets/jobs/jobs.db`
    pub jobs_db_path: PathBuf,
    /// Scene cache database: `assets/scene_cache/scene_cache.db`
    pub scene_cache_db_path: PathBuf,
    /// Scene cache images: `assets/scene_cache/images/`
    pub scene_cache_dir: PathBuf,
    /// BGM library: `assets/bgm/*.mp3`
    pub bgm_dir: PathBuf,
    /// "Current" BGM pointer copy: `assets/bgm.mp3`
    pub bgm_current_path: PathBuf,

    pub llm_api_base_url: String,
    pub llm_api_key: String,
    pub llm_default_model: String,

    pub image_api_url: String,
    pub image_api_key: String,
    pub image_model: String,

    /// Optional remote TTS endpoint
    pub tts_api_url: Option<String>,
    /// Optional subtitle font override
    pub subtitle_font_path: Option<String>,

    /// Max preview URLs embedded per job row; 0 emits none
    pub job_clip_preview_limit: u32,
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let root = PathBuf::from(env_string("STORYREEL_ROOT", "."));
        let join = |raw: String| -> PathBuf {
            let path = PathBuf::from(raw);
            if path.is_absolute() {
                path
            } else {
                root.join(path)
            }
        };

        Self {
            output_dir: join(env_string("OUTPUT_DIR", "output")),
            temp_dir: join(env_string("TEMP_DIR", "temp")),
            jobs_db_path: join(env_string("JOBS_DB_PATH", "assets/jobs/jobs.db")),
            scene_cache_db_path: join(env_string(
                "SCENE_CACHE_DB_PATH",
                "assets/scene_cache/scene_cache.db",
            )),
            scene_cache_dir: join(env_string("SCENE_CACHE_DIR", "assets/scene_cache/images")),
            bgm_dir: join(env_string("BGM_DIR", "assets/bgm")),
            bgm_current_path: join(env_string("BGM_CURRENT_PATH", "assets/bgm.mp3")),
            root,

            llm_api_base_url: env_string("LLM_API_BASE_URL", "https://api.openai.com/v1"),
            llm_api_key: env_string("LLM_API_KEY", ""),
            llm_default_model: env_string("LLM_DEFAULT_MODEL", "gpt-4o-mini"),

            image_api_url: env_string("IMAGE_API_URL", "https://api.poe.com/v1"),
            image_api_key: env_string("IMAGE_API_KEY", ""),
            image_model: env_string("IMAGE_MODEL", "nano-banana"),

            tts_api_url: env_opt("TTS_API_URL"),
            subtitle_font_path: env_opt("SUBTITLE_FONT_PATH"),

            job_clip_preview_limit: std::env::var("JOB_CLIP_PREVIEW_LIMIT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(200),
        }
    }

    /// Config rooted at an explicit directory, for tests.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            output_dir: root.join("output"),
            temp_dir: root.join("temp"),
            jobs_db_path: root.join("assets/jobs/jobs.db"),
            scene_cache_db_path: root.join("assets/scene_cache/scene_cache.db"),
            scene_cache_dir: root.join("assets/scene_cache/images"),
            bgm_dir: root.join("assets/bgm"),
            bgm_current_path: root.join("assets/bgm.mp3"),
            root,
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_api_key: String::new(),
            llm_default_model: "gpt-4o-mini".to_string(),
            image_api_url: "https://api.poe.com/v1".to_string(),
            image_api_key: String::new(),
            image_model: "nano-banana".to_string(),
            tts_api_url: None,
            subtitle_font_path: None,
            job_clip_preview_limit: 200,
        }
    }

    /// Create every directory the pipeline writes under.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.temp_dir)?;
        std::fs::create_dir_all(&self.scene_cache_dir)?;
        std::fs::create_dir_all(&self.bgm_dir)?;
        if let Some(parent) = self.jobs_db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.scene_cache_db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Per-job scratch directory: `temp/<job_id>/`.
    pub fn job_temp_dir(&self, job_id: &JobId) -> PathBuf {
        self.temp_dir.join(job_id.as_str())
    }

    /// Per-job clip directory: `temp/<job_id>/clips/`.
    pub fn job_clips_dir(&self, job_id: &JobId) -> PathBuf {
        self.job_temp_dir(job_id).join("clips")
    }

    /// Final video path: `output/<job_id>.mp4`.
    pub fn job_output_path(&self, job_id: &JobId) -> PathBuf {
        self.output_dir.join(format!("{}.mp4", job_id.as_str()))
    }

    /// Resolve the active BGM source: the "current" pointer copy when
    /// present, else the first library file.
    pub fn resolve_bgm_path(&self) -> Option<PathBuf> {
        if self.bgm_current_path.exists() {
            return Some(self.bgm_current_path.clone());
        }
        let mut library: Vec<PathBuf> = std::fs::read_dir(&self.bgm_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("mp3"))
                    .unwrap_or(false)
            })
            .collect();
        library.sort();
        library.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scoped_paths() {
        let config = WorkerConfig::rooted_at("/data/storyreel");
        let job_id = JobId::from_string("abc123");
        assert_eq!(
            config.job_clips_dir(&job_id),
            PathBuf::from("/data/storyreel/temp/abc123/clips")
        );
        assert_eq!(
            config.job_output_path(&job_id),
            PathBuf::from("/data/storyreel/output/abc123.mp4")
        );
    }

    #[test]
    fn test_bgm_pointer_preferred_over_library() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::rooted_at(dir.path());
        config.ensure_directories().unwrap();

        std::fs::write(config.bgm_dir.join("a_track.mp3"), b"mp3").unwrap();
        assert_eq!(
            config.resolve_bgm_path(),
            Some(config.bgm_dir.join("a_track.mp3"))
        );

        std::fs::write(&config.bgm_current_path, b"mp3").unwrap();
        assert_eq!(config.resolve_bgm_path(), Some(config.bgm_current_path.clone()));
    }

    #[test]
    fn test_bgm_none_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::rooted_at(dir.path());
        config.ensure_directories().unwrap();
        assert_eq!(config.resolve_bgm_path(), None);
    }
}
