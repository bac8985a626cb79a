//! Durable table of jobs keyed by job id, plus a side table for full
//! serialized payloads and a separate table for cancel flags.
//!
//! One writer at a time per process: every operation takes the single
//! connection mutex. Job writes are low-rate (checkpoint granularity)
//! so this never becomes the bottleneck.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;

use sreel_models::{GenerateVideoRequest, ImageSourceReport, Job, JobId, JobState};

use crate::error::{StoreError, StoreResult};

/// SQLite-backed job store.
pub struct JobStore {
    conn: Mutex<Connection>,
    /// Max preview URLs embedded per job row; 0 emits none
    preview_limit: u32,
}

impl JobStore {
    /// Open (or create) the store at `db_path` and run schema setup.
    pub fn open(db_path: impl AsRef<Path>, preview_limit: u32) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
            preview_limit,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory(preview_limit: u32) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            preview_limit,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                progress REAL NOT NULL,
                step TEXT NOT NULL,
                message TEXT NOT NULL,
                current_segment INTEGER NOT NULL DEFAULT 0,
                total_segments INTEGER NOT NULL DEFAULT 0,
                output_video_url TEXT,
                output_video_path TEXT,
                clip_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE TABLE IF NOT EXISTS job_payloads (
                job_id TEXT PRIMARY KEY,
                payload_json TEXT NOT NULL,
                base_url TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS job_cancel_flags (
                job_id TEXT PRIMARY KEY,
                cancelled_at TEXT NOT NULL
            );",
        )?;
        // Additive columns go through detect-and-alter, never a hard
        // migration, so older databases stay readable.
        Self::ensure_jobs_column(&conn, "image_source_report_json", "TEXT")?;
        Ok(())
    }

    fn ensure_jobs_column(
        conn: &Connection,
        column_name: &str,
        column_ddl: &str,
    ) -> StoreResult<()> {
        let mut stmt = conn.prepare("PRAGMA table_info(jobs)")?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;
        if existing.iter().any(|name| name == column_name) {
            return Ok(());
        }
        if let Err(err) = conn.execute(
            &format!("ALTER TABLE jobs ADD COLUMN {column_name} {column_ddl}"),
            [],
        ) {
            warn!(column = column_name, error = %err, "Failed to add jobs column");
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Upsert all mutable fields of a job row. `updated_at` is set to
    /// now; `created_at` is preserved on update.
    pub fn set(&self, job: &Job) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let report_json = match &job.image_source_report {
            Some(report) => Some(serde_json::to_string(report)?),
            None => None,
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (
                job_id, status, progress, step, message,
                current_segment, total_segments,
                output_video_url, output_video_path,
                clip_count, image_source_report_json,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ON CONFLICT(job_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                step = excluded.step,
                message = excluded.message,
                current_segment = excluded.current_segment,
                total_segments = excluded.total_segments,
                output_video_url = excluded.output_video_url,
                output_video_path = excluded.output_video_path,
                clip_count = excluded.clip_count,
                image_source_report_json = excluded.image_source_report_json,
                updated_at = excluded.updated_at",
            params![
                job.job_id.as_str(),
                job.status.as_str(),
                f64::from(job.progress.clamp(0.0, 1.0)),
                job.step,
                job.message,
                job.current_segment,
                job.total_segments,
                job.output_video_url,
                job.output_video_path,
                job.clip_count,
                report_json,
                now,
            ],
        )?;
        Ok(())
    }

    /// Read the current snapshot of a job, if any.
    pub fn get(&self, job_id: &JobId) -> StoreResult<Option<Job>> {
        let conn = self.lock();
        let job = conn
            .query_row(
                "SELECT job_id, status, progress, step, message,
                        current_segment, total_segments,
                        output_video_url, output_video_path,
                        clip_count, image_source_report_json,
                        created_at, updated_at
                 FROM jobs WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| self.row_to_job(row),
            )
            .optional()?;
        Ok(job)
    }

    /// Recent jobs ordered by `(created_at desc, updated_at desc)`.
    /// The limit is clamped to [1, 500].
    pub fn list_recent(&self, limit: u32) -> StoreResult<Vec<Job>> {
        let safe_limit = limit.clamp(1, 500);
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT job_id, status, progress, step, message,
                    current_segment, total_segments,
                    output_video_url, output_video_path,
                    clip_count, image_source_report_json,
                    created_at, updated_at
             FROM jobs
             ORDER BY created_at DESC, updated_at DESC
             LIMIT ?1",
        )?;
        let jobs = stmt
            .query_map(params![safe_limit], |row| self.row_to_job(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Job ids with status queued or running, oldest first. Used at
    /// startup to enumerate recoverable jobs.
    pub fn list_incomplete_job_ids(&self) -> StoreResult<Vec<JobId>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT job_id FROM jobs
             WHERE status IN ('queued', 'running')
             ORDER BY updated_at ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(JobId::from_string).collect())
    }

    /// Persist the full request payload. Must succeed before the job
    /// starts, else resume is impossible.
    pub fn save_payload(
        &self,
        job_id: &JobId,
        payload: &GenerateVideoRequest,
        base_url: &str,
    ) -> StoreResult<()> {
        let payload_json = serde_json::to_string(payload)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO job_payloads (job_id, payload_json, base_url, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(job_id) DO UPDATE SET
                payload_json = excluded.payload_json,
                base_url = excluded.base_url,
                updated_at = excluded.updated_at",
            params![job_id.as_str(), payload_json, base_url, now],
        )?;
        Ok(())
    }

    /// Load the request payload and base URL saved for a job.
    pub fn load_payload(
        &self,
        job_id: &JobId,
    ) -> StoreResult<Option<(GenerateVideoRequest, String)>> {
        let conn = self.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT payload_json, base_url FROM job_payloads WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        drop(conn);

        match row {
            None => Ok(None),
            Some((payload_json, base_url)) => {
                let payload: GenerateVideoRequest = serde_json::from_str(&payload_json)?;
                Ok(Some((payload, base_url)))
            }
        }
    }

    /// Raise the cancel flag for a job. Returns false when the job row
    /// does not exist. The flag lives in its own table so it survives
    /// status updates until the scheduler clears it.
    pub fn cancel(&self, job_id: &JobId) -> StoreResult<bool> {
        let conn = self.lock();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM jobs WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }
        conn.execute(
            "INSERT OR REPLACE INTO job_cancel_flags (job_id, cancelled_at) VALUES (?1, ?2)",
            params![job_id.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(true)
    }

    /// Whether the cancel flag is raised for a job.
    pub fn is_cancelled(&self, job_id: &JobId) -> StoreResult<bool> {
        let conn = self.lock();
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM job_cancel_flags WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    /// Clear the cancel flag; called by the scheduler at job end.
    pub fn clear_cancel(&self, job_id: &JobId) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM job_cancel_flags WHERE job_id = ?1",
            params![job_id.as_str()],
        )?;
        Ok(())
    }

    /// Remove the job row, payload row, and cancel flag atomically.
    /// Returns whether the job row existed.
    pub fn delete_job(&self, job_id: &JobId) -> StoreResult<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM jobs WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id.as_str()])?;
        tx.execute(
            "DELETE FROM job_payloads WHERE job_id = ?1",
            params![job_id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM job_cancel_flags WHERE job_id = ?1",
            params![job_id.as_str()],
        )?;
        tx.commit()?;
        Ok(exists.is_some())
    }

    fn row_to_job(&self, row: &Row<'_>) -> rusqlite::Result<Job> {
        let job_id: String = row.get(0)?;
        let status_raw: String = row.get(1)?;
        let clip_count: u32 = row.get::<_, i64>(9)?.max(0) as u32;
        let report_json: Option<String> = row.get(10)?;
        let created_at: Option<String> = row.get(11)?;
        let updated_at: Option<String> = row.get(12)?;

        let image_source_report = report_json
            .as_deref()
            .and_then(|raw| serde_json::from_str::<ImageSourceReport>(raw).ok());

        Ok(Job {
            job_id: JobId::from_string(job_id.clone()),
            status: JobState::parse(&status_raw).unwrap_or(JobState::Failed),
            progress: row.get::<_, f64>(2)? as f32,
            step: row.get(3)?,
            message: row.get(4)?,
            current_segment: row.get::<_, i64>(5)?.max(0) as u32,
            total_segments: row.get::<_, i64>(6)?.max(0) as u32,
            output_video_url: row.get(7)?,
            output_video_path: row.get(8)?,
            clip_count,
            clip_preview_urls: self.build_preview_urls(&job_id, clip_count),
            image_source_report,
            created_at: parse_timestamp(created_at),
            updated_at: parse_timestamp(updated_at),
        })
    }

    /// Preview URLs for the first clips, clamped by the configured
    /// limit. Limit 0 means "none", not "unlimited".
    fn build_preview_urls(&self, job_id: &str, clip_count: u32) -> Vec<String> {
        let preview_count = clip_count.min(self.preview_limit);
        (0..preview_count)
            .map(|index| format!("/api/jobs/{job_id}/clips/{index}"))
            .collect()
    }
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref()
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
}
