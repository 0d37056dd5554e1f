//! Durable session storage
//!
//! One JSON file per session, named by session id. Saves go through a
//! temporary file followed by an atomic rename so a concurrent reader
//! observes either the previous or the new complete document, never a
//! truncated one. A save that cannot reach disk is fatal to the caller: a
//! checkpoint that did not persist cannot be trusted for resumption.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::fs;
use uuid::Uuid;

use crate::constants::SESSION_FILE_EXTENSION;
use crate::error::{BenchError, BenchResult};
use crate::models::Session;
use crate::utils::validation::validate_session_id;

/// File-backed store of session checkpoints
pub struct SessionStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// Create a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure the backing directory exists and eagerly load every valid
    /// session into memory, so crash-recovery discovery is immediate.
    pub async fn initialize(&self) -> BenchResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let sessions = self.scan_directory().await?;
        let mut cache = self.cache.lock().expect("session cache poisoned");
        for session in sessions {
            cache.insert(session.id.clone(), session);
        }
        tracing::debug!(count = cache.len(), dir = %self.dir.display(), "session store initialized");
        Ok(())
    }

    /// Persist a session, overwriting any previous checkpoint.
    ///
    /// Disk failures propagate to the caller.
    pub async fn save(&self, session: &Session) -> BenchResult<()> {
        validate_session_id(&session.id)?;

        let payload = serde_json::to_vec_pretty(session)?;
        let final_path = self.session_path(&session.id);
        let tmp_path = self
            .dir
            .join(format!(".{}.tmp-{}", session.id, Uuid::new_v4()));

        fs::write(&tmp_path, &payload).await?;
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            // The temp file must not linger when the rename fails
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        self.cache
            .lock()
            .expect("session cache poisoned")
            .insert(session.id.clone(), session.clone());

        tracing::trace!(session_id = %session.id, "session checkpoint persisted");
        Ok(())
    }

    /// Load a session by id. A missing session is `Ok(None)`, not an error;
    /// a file that exists but cannot be parsed is a corruption error.
    pub async fn load(&self, id: &str) -> BenchResult<Option<Session>> {
        validate_session_id(id)?;

        if let Some(session) = self.cache.lock().expect("session cache poisoned").get(id) {
            return Ok(Some(session.clone()));
        }

        let path = self.session_path(id);
        match fs::read(&path).await {
            Ok(raw) => {
                let session = Self::parse(&path, &raw)?;
                self.cache
                    .lock()
                    .expect("session cache poisoned")
                    .insert(session.id.clone(), session.clone());
                Ok(Some(session))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate all valid sessions. Corrupt or unparsable files are logged
    /// and skipped; enumeration itself never fails because of one bad file.
    pub async fn list(&self) -> BenchResult<Vec<Session>> {
        let mut sessions = self.scan_directory().await?;
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    async fn scan_directory(&self) -> BenchResult<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_FILE_EXTENSION) {
                continue;
            }
            match fs::read(&path).await {
                Ok(raw) => match Self::parse(&path, &raw) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "skipping corrupt session file: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable session file: {e}");
                }
            }
        }
        Ok(sessions)
    }

    fn parse(path: &Path, raw: &[u8]) -> BenchResult<Session> {
        serde_json::from_slice(raw).map_err(|e| BenchError::SessionCorruption {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{SESSION_FILE_EXTENSION}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::models::{SessionConfig, TestCaseResult};

    fn sample_session() -> Session {
        Session::new(
            "replay",
            SessionConfig {
                models: vec!["m1".to_string()],
                dataset: "demo".to_string(),
                backend: BackendKind::Process,
                max_retries: 3,
                timeout_ms: 30_000,
                memory_limit: None,
            },
            4,
        )
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.initialize().await.unwrap();

        let mut session = sample_session();
        let mut result = TestCaseResult::pending("t1", "m1");
        result.mark_completed();
        session.record_result(result);
        store.save(&session).await.unwrap();

        // A fresh store must recover the session from disk, timestamps intact
        let fresh = SessionStore::new(dir.path());
        fresh.initialize().await.unwrap();
        let loaded = fresh.load(&session.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.start_time, session.start_time);
        assert_eq!(loaded.progress.completed_test_cases, 1);
        assert_eq!(loaded.results.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.initialize().await.unwrap();

        let loaded = store
            .load("00000000-0000-0000-0000-000000000000")
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_skipped_during_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.initialize().await.unwrap();

        let session = sample_session();
        store.save(&session).await.unwrap();
        fs::write(dir.path().join("broken.json"), b"{not json")
            .await
            .unwrap();

        let sessions = store.list().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session.id);
    }

    #[tokio::test]
    async fn test_save_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.initialize().await.unwrap();

        let mut session = sample_session();
        store.save(&session).await.unwrap();

        for i in 0..5 {
            let mut result = TestCaseResult::pending(format!("t{i}"), "m1");
            result.mark_completed();
            session.record_result(result);
            store.save(&session).await.unwrap();

            // Every observation parses as a complete document
            let raw = fs::read(dir.path().join(format!("{}.json", session.id)))
                .await
                .unwrap();
            let parsed: Session = serde_json::from_slice(&raw).unwrap();
            assert_eq!(parsed.results.len(), i + 1);
        }
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.initialize().await.unwrap();
        store.save(&sample_session()).await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.initialize().await.unwrap();

        assert!(store.load("../outside").await.is_err());
    }
}
