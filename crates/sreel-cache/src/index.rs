//! SQLite-backed scene cache index.
//!
//! Rows carry the descriptor and match profile as JSON blobs alongside
//! indexed columns for the query-critical fields. A bindings
//! side-table maps entries to their reference-image ids and paths so
//! reference-scoped pre-filters are indexed; it is backfilled when
//! absent. All mutations and index reads share one mutex so the
//! bindings stay consistent with the main rows; pruning happens inside
//! the write mutex.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rand::seq::SliceRandom;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::descriptor::{build_match_profile, MatchProfile, SceneDescriptor};
use crate::error::{CacheError, CacheResult};

/// Entries beyond this count are pruned oldest-first on every write.
const MAX_ENTRIES: usize = 3000;

/// One cached scene frame.
#[derive(Debug, Clone)]
pub struct SceneCacheEntry {
    pub id: String,
    pub created_at: String,
    pub image_path: PathBuf,
    pub summary: String,
    pub descriptor: SceneDescriptor,
    pub profile: MatchProfile,
}

/// Content-addressed store of previously generated scene frames.
pub struct SceneCacheIndex {
    conn: Mutex<Connection>,
    image_root: PathBuf,
}

impl SceneCacheIndex {
    /// Open (or create) the index and its image directory.
    pub fn open(db_path: impl AsRef<Path>, image_root: impl AsRef<Path>) -> CacheResult<Self> {
        let db_path = db_path.as_ref();
        let image_root = image_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&image_root)?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let index = Self {
            conn: Mutex::new(conn),
            image_root,
        };
        index.init_schema()?;
        index.backfill_bindings()?;
        Ok(index)
    }

    fn init_schema(&self) -> CacheResult<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scene_entries (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                image_path TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                descriptor_json TEXT NOT NULL,
                profile_json TEXT NOT NULL,
                character_name TEXT NOT NULL DEFAULT '',
                character_key TEXT NOT NULL DEFAULT '',
                action_hint TEXT NOT NULL DEFAULT '',
                location_hint TEXT NOT NULL DEFAULT '',
                is_scene_only INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_scene_entries_created ON scene_entries(created_at);
            CREATE INDEX IF NOT EXISTS idx_scene_entries_character ON scene_entries(character_name);
            CREATE TABLE IF NOT EXISTS scene_ref_bindings (
                entry_id TEXT NOT NULL,
                ref_image_id TEXT NOT NULL DEFAULT '',
                ref_path TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_bindings_ref_id ON scene_ref_bindings(ref_image_id);
            CREATE INDEX IF NOT EXISTS idx_bindings_ref_path ON scene_ref_bindings(ref_path);
            CREATE INDEX IF NOT EXISTS idx_bindings_entry ON scene_ref_bindings(entry_id);",
        )?;
        Ok(())
    }

    /// Rebuild the bindings table from descriptors when it is empty
    /// but entries exist (index produced by an older build).
    fn backfill_bindings(&self) -> CacheResult<()> {
        let conn = self.lock();
        let bindings: i64 =
            conn.query_row("SELECT COUNT(*) FROM scene_ref_bindings", [], |row| row.get(0))?;
        let entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM scene_entries", [], |row| row.get(0))?;
        if bindings > 0 || entries == 0 {
            return Ok(());
        }

        debug!(entries, "Backfilling scene cache reference bindings");
        let rows: Vec<(String, String)> = {
            let mut stmt = conn.prepare("SELECT id, descriptor_json FROM scene_entries")?;
            let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            mapped.collect::<Result<_, _>>()?
        };
        for (entry_id, descriptor_json) in rows {
            let Ok(descriptor) = serde_json::from_str::<SceneDescriptor>(&descriptor_json) else {
                continue;
            };
            Self::insert_bindings(&conn, &entry_id, &descriptor)?;
        }
        Ok(())
    }

    fn insert_bindings(
        conn: &Connection,
        entry_id: &str,
        descriptor: &SceneDescriptor,
    ) -> CacheResult<()> {
        for ref_id in &descriptor.reference_image_ids {
            conn.execute(
                "INSERT INTO scene_ref_bindings (entry_id, ref_image_id, ref_path)
                 VALUES (?1, ?2, '')",
                params![entry_id, ref_id],
            )?;
        }
        for ref_path in &descriptor.reference_image_paths {
            conn.execute(
                "INSERT INTO scene_ref_bindings (entry_id, ref_image_id, ref_path)
                 VALUES (?1, '', ?2)",
                params![entry_id, ref_path],
            )?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy the source image into the cache directory under a
    /// timestamped unique name, insert the row with its descriptor and
    /// match profile, rebind references, and prune to the newest
    /// [`MAX_ENTRIES`].
    pub fn save_entry(
        &self,
        descriptor: &SceneDescriptor,
        source_image_path: &Path,
        summary: &str,
    ) -> CacheResult<SceneCacheEntry> {
        if !source_image_path.exists() {
            return Err(CacheError::ImageMissing(source_image_path.to_path_buf()));
        }

        let suffix = source_image_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "png".to_string());
        let filename = format!(
            "scene_{}_{}.{suffix}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8],
        );
        let target = self.image_root.join(filename);
        std::fs::copy(source_image_path, &target)?;

        let profile = build_match_profile(descriptor);
        let entry = SceneCacheEntry {
            id: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now().to_rfc3339(),
            image_path: target,
            summary: summary.chars().take(200).collect(),
            descriptor: descriptor.clone(),
            profile,
        };

        let conn = self.lock();
        conn.execute(
            "INSERT INTO scene_entries (
                id, created_at, image_path, summary,
                descriptor_json, profile_json,
                character_name, character_key,
                action_hint, location_hint, is_scene_only
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.id,
                entry.created_at,
                entry.image_path.to_string_lossy(),
                entry.summary,
                serde_json::to_string(&entry.descriptor)?,
                serde_json::to_string(&entry.profile)?,
                entry.descriptor.character_name,
                entry.profile.character_key,
                entry.descriptor.action_hint,
                entry.descriptor.location_hint,
                entry.descriptor.is_scene_only as i64,
            ],
        )?;
        Self::insert_bindings(&conn, &entry.id, &entry.descriptor)?;
        self.prune_locked(&conn)?;
        Ok(entry)
    }

    /// Delete the oldest rows (and their images) beyond the cap.
    fn prune_locked(&self, conn: &Connection) -> CacheResult<()> {
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM scene_entries", [], |row| row.get(0))?;
        let excess = total - MAX_ENTRIES as i64;
        if excess <= 0 {
            return Ok(());
        }

        let victims: Vec<(String, String)> = {
            let mut stmt = conn.prepare(
                "SELECT id, image_path FROM scene_entries
                 ORDER BY created_at ASC LIMIT ?1",
            )?;
            let mapped = stmt.query_map(params![excess], |row| Ok((row.get(0)?, row.get(1)?)))?;
            mapped.collect::<Result<_, _>>()?
        };
        for (id, image_path) in victims {
            conn.execute("DELETE FROM scene_entries WHERE id = ?1", params![id])?;
            conn.execute(
                "DELETE FROM scene_ref_bindings WHERE entry_id = ?1",
                params![id],
            )?;
            if let Err(err) = std::fs::remove_file(&image_path) {
                warn!(image_path, error = %err, "Failed to remove pruned cache image");
            }
        }
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn materialize(raw: (String, String, String, String, String, String)) -> Option<SceneCacheEntry> {
        let (id, created_at, image_path, summary, descriptor_json, profile_json) = raw;
        let descriptor = serde_json::from_str(&descriptor_json).ok()?;
        let profile = serde_json::from_str(&profile_json).ok()?;
        Some(SceneCacheEntry {
            id,
            created_at,
            image_path: PathBuf::from(image_path),
            summary,
            descriptor,
            profile,
        })
    }

    fn load_entries_where(
        &self,
        where_clause: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> CacheResult<Vec<SceneCacheEntry>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT id, created_at, image_path, summary, descriptor_json, profile_json
             FROM scene_entries {where_clause} ORDER BY created_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(bind, Self::row_to_entry)?;
        let raw: Vec<_> = rows.collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);
        Ok(raw.into_iter().filter_map(Self::materialize).collect())
    }

    /// All live entries (image file still on disk), newest first,
    /// minus the disallowed ids. Entries whose image file vanished are
    /// dead at read time.
    pub fn live_entries(&self, disallow: &HashSet<String>) -> CacheResult<Vec<SceneCacheEntry>> {
        let entries = self.load_entries_where("", &[])?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.image_path.exists() && !disallow.contains(&entry.id))
            .collect())
    }

    /// Pre-filtered candidates for a lookup target: entries sharing a
    /// reference-image id when the target has ids, else entries
    /// sharing a reference path, else every live entry.
    pub fn candidates_for(
        &self,
        descriptor: &SceneDescriptor,
        disallow: &HashSet<String>,
    ) -> CacheResult<Vec<SceneCacheEntry>> {
        let ids = self.binding_entry_ids(descriptor)?;
        let entries = match ids {
            Some(entry_ids) => {
                let mut out = Vec::new();
                for entry_id in entry_ids {
                    if let Some(entry) = self.get_entry(&entry_id)? {
                        out.push(entry);
                    }
                }
                out
            }
            None => self.load_entries_where("", &[])?,
        };
        Ok(entries
            .into_iter()
            .filter(|entry| entry.image_path.exists() && !disallow.contains(&entry.id))
            .collect())
    }

    /// Entry ids bound to any of the target's reference ids/paths, or
    /// None when the target carries no references.
    fn binding_entry_ids(
        &self,
        descriptor: &SceneDescriptor,
    ) -> CacheResult<Option<Vec<String>>> {
        let conn = self.lock();
        if !descriptor.reference_image_ids.is_empty() {
            let mut ids: Vec<String> = Vec::new();
            let mut stmt = conn.prepare(
                "SELECT DISTINCT entry_id FROM scene_ref_bindings WHERE ref_image_id = ?1",
            )?;
            for ref_id in &descriptor.reference_image_ids {
                let rows = stmt.query_map(params![ref_id], |row| row.get::<_, String>(0))?;
                for row in rows {
                    let entry_id = row?;
                    if !ids.contains(&entry_id) {
                        ids.push(entry_id);
                    }
                }
            }
            return Ok(Some(ids));
        }
        if !descriptor.reference_image_paths.is_empty() {
            let mut ids: Vec<String> = Vec::new();
            let mut stmt = conn.prepare(
                "SELECT DISTINCT entry_id FROM scene_ref_bindings WHERE ref_path = ?1",
            )?;
            for ref_path in &descriptor.reference_image_paths {
                let rows = stmt.query_map(params![ref_path], |row| row.get::<_, String>(0))?;
                for row in rows {
                    let entry_id = row?;
                    if !ids.contains(&entry_id) {
                        ids.push(entry_id);
                    }
                }
            }
            return Ok(Some(ids));
        }
        Ok(None)
    }

    /// Load one entry by id.
    pub fn get_entry(&self, entry_id: &str) -> CacheResult<Option<SceneCacheEntry>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT id, created_at, image_path, summary, descriptor_json, profile_json
                 FROM scene_entries WHERE id = ?1",
                params![entry_id],
                Self::row_to_entry,
            )
            .optional()?;
        drop(conn);
        Ok(raw.and_then(Self::materialize))
    }

    /// Random live entry whose character matches by name or by a
    /// shared reference path.
    pub fn random_character_match(
        &self,
        character_name: &str,
        reference_paths: &[String],
        disallow: &HashSet<String>,
    ) -> CacheResult<Option<SceneCacheEntry>> {
        let live = self.live_entries(disallow)?;
        let matches: Vec<SceneCacheEntry> = live
            .into_iter()
            .filter(|entry| {
                (!character_name.is_empty() && entry.descriptor.character_name == character_name)
                    || entry
                        .descriptor
                        .reference_image_paths
                        .iter()
                        .any(|path| reference_paths.contains(path))
            })
            .collect();
        Ok(matches.choose(&mut rand::thread_rng()).cloned())
    }

    /// Random live scene-only entry.
    pub fn random_scene_only(
        &self,
        disallow: &HashSet<String>,
    ) -> CacheResult<Option<SceneCacheEntry>> {
        let live = self.live_entries(disallow)?;
        let matches: Vec<SceneCacheEntry> = live
            .into_iter()
            .filter(|entry| entry.descriptor.is_scene_only)
            .collect();
        Ok(matches.choose(&mut rand::thread_rng()).cloned())
    }

    /// Any random live entry.
    pub fn random_any(&self, disallow: &HashSet<String>) -> CacheResult<Option<SceneCacheEntry>> {
        let live = self.live_entries(disallow)?;
        Ok(live.choose(&mut rand::thread_rng()).cloned())
    }

    /// Number of rows (live or dead).
    pub fn len(&self) -> CacheResult<usize> {
        let conn = self.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM scene_entries", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::build_scene_descriptor;
    use sreel_models::Character;

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"\x89PNG fake").unwrap();
        path
    }

    fn descriptor_for(name: &str, reference: Option<&str>, action: &str) -> SceneDescriptor {
        let mut character = Character::narrator();
        character.name = name.to_string();
        character.reference_image_path = reference.map(|s| s.to_string());
        build_scene_descriptor(
            &character,
            &[],
            "segment text",
            action,
            "",
            &[],
            &[],
            &[],
            "",
            "",
            false,
        )
    }

    fn open_index(dir: &Path) -> SceneCacheIndex {
        SceneCacheIndex::open(dir.join("scene_cache.db"), dir.join("images")).unwrap()
    }

    #[test]
    fn test_save_and_reload_entry() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let source = write_image(dir.path(), "src.png");

        let descriptor = descriptor_for("林远", Some("refs/hero_ref_a1.png"), "拔刀");
        let saved = index.save_entry(&descriptor, &source, "拔刀场景").unwrap();
        assert!(saved.image_path.exists());
        assert!(saved
            .image_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("scene_"));

        let loaded = index.get_entry(&saved.id).unwrap().unwrap();
        assert_eq!(loaded.descriptor.character_name, "林远");
        assert_eq!(loaded.descriptor.reference_image_ids, vec!["a1"]);
        assert!(!loaded.profile.character_key.is_empty());
    }

    #[test]
    fn test_candidates_prefiltered_by_reference_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let source = write_image(dir.path(), "src.png");

        let with_a = descriptor_for("甲", Some("refs/hero_ref_aa.png"), "拔刀");
        let with_b = descriptor_for("乙", Some("refs/hero_ref_bb.png"), "拔刀");
        index.save_entry(&with_a, &source, "").unwrap();
        index.save_entry(&with_b, &source, "").unwrap();

        let target = descriptor_for("甲", Some("other/prefix_renamed_aa.png"), "拔刀");
        let candidates = index.candidates_for(&target, &HashSet::new()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].descriptor.character_name, "甲");
    }

    #[test]
    fn test_dead_entries_filtered_at_read_time() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let source = write_image(dir.path(), "src.png");

        let descriptor = descriptor_for("甲", None, "走路");
        let saved = index.save_entry(&descriptor, &source, "").unwrap();
        std::fs::remove_file(&saved.image_path).unwrap();

        let live = index.live_entries(&HashSet::new()).unwrap();
        assert!(live.is_empty());
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn test_disallow_excludes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let source = write_image(dir.path(), "src.png");

        let saved = index
            .save_entry(&descriptor_for("甲", None, "走路"), &source, "")
            .unwrap();
        let mut disallow = HashSet::new();
        disallow.insert(saved.id.clone());
        assert!(index.random_any(&disallow).unwrap().is_none());
        assert!(index.random_any(&HashSet::new()).unwrap().is_some());
    }

    #[test]
    fn test_random_character_match_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let source = write_image(dir.path(), "src.png");

        index
            .save_entry(&descriptor_for("林远", None, "走路"), &source, "")
            .unwrap();
        index
            .save_entry(&descriptor_for("苏晚", None, "读书"), &source, "")
            .unwrap();

        let pick = index
            .random_character_match("林远", &[], &HashSet::new())
            .unwrap()
            .unwrap();
        assert_eq!(pick.descriptor.character_name, "林远");
        assert!(index
            .random_character_match("不存在", &[], &HashSet::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scene_only_pick() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path());
        let source = write_image(dir.path(), "src.png");

        let mut scene_only = descriptor_for("", None, "空镜");
        scene_only.is_scene_only = true;
        index.save_entry(&scene_only, &source, "").unwrap();
        index
            .save_entry(&descriptor_for("甲", None, "走路"), &source, "")
            .unwrap();

        let pick = index.random_scene_only(&HashSet::new()).unwrap().unwrap();
        assert!(pick.descriptor.is_scene_only);
    }
}
