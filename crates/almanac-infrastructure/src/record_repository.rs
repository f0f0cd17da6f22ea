//! File-backed session record repository.
//!
//! One MessagePack file per session key under a base directory. Writes go
//! through a temp file + fsync + rename so a crash mid-write leaves the
//! previous generation intact. Cross-process mutual exclusion uses a
//! sibling advisory lock file.

use crate::dto::{RecordV1_0_0, RecordV2_0_0, RecordV3_0_0};
use almanac_core::record::SessionRecord;
use almanac_core::repository::{LoadedRecord, RecordLock, RecordRepository};
use almanac_core::{AlmanacError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use version_migrate::{FromDomain, IntoDomain, MigratesTo};

const RECORD_EXTENSION: &str = "rec";

pub struct FileRecordRepository {
    base_dir: PathBuf,
}

impl FileRecordRepository {
    /// Opens a repository rooted at `base_dir`, creating it if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Platform data directory, falling back to the system temp dir when
    /// no per-user location exists (containers, stripped-down CI).
    pub fn default_location() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("almanac")
            .join("session_storage")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Session keys are URL-safe base64; anything else is refused before
    /// it can become a path component.
    fn record_path(&self, session_key: &str) -> Result<PathBuf> {
        if session_key.is_empty()
            || !session_key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(AlmanacError::not_found("session", session_key));
        }
        Ok(self
            .base_dir
            .join(format!("{session_key}.{RECORD_EXTENSION}")))
    }

    fn lock_path(&self, session_key: &str) -> Result<PathBuf> {
        Ok(self
            .record_path(session_key)?
            .with_extension("lock"))
    }
}

/// Whether the raw map carries a value in the legacy `preview_mockup`
/// field. A V2 record with no projects and no cart also satisfies the V3
/// shape (every V3 discriminator lives inside those lists), so the field
/// V3 dropped is the only thing telling the two apart. A nil value needs
/// no fold and is safe to read as V3.
fn has_legacy_mockup(bytes: &[u8]) -> bool {
    #[derive(serde::Deserialize)]
    struct LegacyMarker {
        preview_mockup: Option<serde_json::Value>,
    }
    rmp_serde::from_slice::<LegacyMarker>(bytes)
        .map(|m| m.preview_mockup.is_some())
        .unwrap_or(false)
}

/// Decodes raw bytes against the schema chain, newest first.
///
/// Returns the current-generation record plus whether a migration ran
/// (the caller persists migrated records back so the upgrade happens
/// once). `None` means no generation matched.
fn decode_with_fallback(bytes: &[u8]) -> Option<(RecordV3_0_0, bool)> {
    if !has_legacy_mockup(bytes) {
        if let Ok(v3) = rmp_serde::from_slice::<RecordV3_0_0>(bytes) {
            return Some((v3, false));
        }
    }
    if let Ok(v2) = rmp_serde::from_slice::<RecordV2_0_0>(bytes) {
        tracing::info!("migrating session record from schema 2.0.0");
        return Some((v2.migrate(), true));
    }
    if let Ok(v1) = rmp_serde::from_slice::<RecordV1_0_0>(bytes) {
        tracing::info!("migrating session record from schema 1.0.0");
        let v2: RecordV2_0_0 = v1.migrate();
        return Some((v2.migrate(), true));
    }
    None
}

impl RecordRepository for FileRecordRepository {
    fn load(&self, session_key: &str) -> Result<Option<LoadedRecord>> {
        let path = self.record_path(session_key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                tracing::warn!(%session_key, error = %e, "failed to read session record");
                return Ok(None);
            }
        };

        match decode_with_fallback(&bytes) {
            Some((dto, migrated)) => Ok(Some(LoadedRecord {
                record: dto.into_domain(),
                migrated,
            })),
            None => {
                // Corrupt files are treated as absent; the caller starts a
                // fresh record rather than failing the request
                tracing::warn!(%session_key, "session record did not match any known schema");
                Ok(None)
            }
        }
    }

    fn save(&self, session_key: &str, record: &SessionRecord) -> Result<()> {
        let path = self.record_path(session_key)?;
        let dto = RecordV3_0_0::from_domain(record.clone());
        let bytes = rmp_serde::to_vec_named(&dto)
            .map_err(|e| AlmanacError::Serialization {
                format: "msgpack".to_string(),
                message: e.to_string(),
            })?;

        let tmp_path = self
            .base_dir
            .join(format!(".{session_key}.{RECORD_EXTENSION}.tmp"));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, session_key: &str) -> Result<()> {
        let path = self.record_path(session_key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn lock(&self, session_key: &str) -> Result<RecordLock> {
        let lock_path = self.lock_path(session_key)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| AlmanacError::io(format!("failed to lock {session_key}: {e}")))?;
        }

        Ok(RecordLock::held(file, lock_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{MonthV1_0_0, ProjectMetaV1_0_0, RecordV2_0_0};
    use almanac_core::generation::GenerationStage;
    use almanac_core::record::SessionRecord;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn repo() -> (TempDir, FileRecordRepository) {
        let dir = TempDir::new().unwrap();
        let repo = FileRecordRepository::new(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_load_absent_returns_none() {
        let (_dir, repo) = repo();
        assert!(repo.load("missing-key").unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, repo) = repo();
        let mut record = SessionRecord::new("p1".to_string());
        record.projects[0].status = "processing".to_string();

        repo.save("key-a", &record).unwrap();
        let loaded = repo.load("key-a").unwrap().unwrap();

        assert!(!loaded.migrated);
        assert_eq!(loaded.record, record);
    }

    #[test]
    fn test_corrupt_file_treated_as_absent() {
        let (dir, repo) = repo();
        std::fs::write(dir.path().join("bad.rec"), b"not msgpack at all").unwrap();
        assert!(repo.load("bad").unwrap().is_none());
    }

    #[test]
    fn test_legacy_record_migrates_on_load() {
        let (dir, repo) = repo();
        let legacy = RecordV1_0_0 {
            project: ProjectMetaV1_0_0 {
                id: Some("legacy".to_string()),
                status: "new".to_string(),
                created_at: Some(chrono::Utc::now()),
            },
            images: Vec::new(),
            months: vec![MonthV1_0_0 {
                month_number: 1,
                prompt: "jan".to_string(),
                title: String::new(),
                description: String::new(),
                generation_status: "completed".to_string(),
                master_image_data: Some(vec![7, 7]),
                error_message: None,
                generated_at: None,
            }],
            preferences: None,
            order: None,
            preview_mockup: None,
            preview_mockups: HashMap::new(),
        };
        let bytes = rmp_serde::to_vec_named(&legacy).unwrap();
        std::fs::write(dir.path().join("old.rec"), bytes).unwrap();

        let loaded = repo.load("old").unwrap().unwrap();
        assert!(loaded.migrated);
        assert_eq!(loaded.record.active_project_id, "legacy");
        let month = &loaded.record.projects[0].months[0];
        assert_eq!(month.selected_image(), Some(&[7u8, 7][..]));
        assert_eq!(
            loaded.record.projects[0].generation_stage,
            GenerationStage::PreviewOnly
        );
    }

    #[test]
    fn test_empty_multi_project_record_still_folds_legacy_mockup() {
        let (dir, repo) = repo();
        // No projects and no cart lines, so nothing inside the record
        // distinguishes the schema generations structurally
        let v2 = RecordV2_0_0 {
            projects: Vec::new(),
            active_project_id: "gone".to_string(),
            cart: Vec::new(),
            order: None,
            preview_mockups: HashMap::new(),
            preview_mockup: Some(serde_json::json!({"mockup_url": "https://m/x.png"})),
            delivery_image: None,
        };
        let bytes = rmp_serde::to_vec_named(&v2).unwrap();
        std::fs::write(dir.path().join("empty.rec"), bytes).unwrap();

        let loaded = repo.load("empty").unwrap().unwrap();
        assert!(loaded.migrated);
        let mockup = loaded.record.preview_mockups.get("calendar_2026").unwrap();
        assert_eq!(mockup.mockup_url.as_deref(), Some("https://m/x.png"));
    }

    #[test]
    fn test_list_keys_skips_foreign_files() {
        let (dir, repo) = repo();
        repo.save("aaa", &SessionRecord::new("p".to_string())).unwrap();
        repo.save("bbb", &SessionRecord::new("p".to_string())).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join(".ccc.rec.tmp"), b"x").unwrap();

        assert_eq!(repo.list_keys().unwrap(), vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, repo) = repo();
        repo.save("gone", &SessionRecord::new("p".to_string())).unwrap();
        repo.delete("gone").unwrap();
        repo.delete("gone").unwrap();
        assert!(repo.load("gone").unwrap().is_none());
    }

    #[test]
    fn test_path_traversal_refused() {
        let (_dir, repo) = repo();
        assert!(repo.load("../escape").is_err());
        assert!(repo.save("a/b", &SessionRecord::new("p".to_string())).is_err());
    }

    #[test]
    fn test_lock_creates_and_removes_guard_file() {
        let (dir, repo) = repo();
        let lock_path = dir.path().join("kk.lock");
        {
            let _guard = repo.lock("kk").unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }
}
