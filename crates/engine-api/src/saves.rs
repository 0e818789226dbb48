//! Per-session JSON save files: `saves/<session_id>/<sanitized_name>.json`,
//! whole-file writes, a bounded slot count, and ` (n)` disambiguation for
//! duplicate names.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use contracts::api::{SaveFile, SaveFileMeta};
use contracts::state::SessionState;
use contracts::ErrorCode;

pub const DEFAULT_SAVE_ROOT: &str = "saves";
pub const ENV_SAVE_ROOT: &str = "SAVE_ROOT";
const MAX_NAME_LEN: usize = 30;

#[derive(Debug)]
pub enum SaveError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    InvalidName,
    LimitExceeded,
    NotFound(String),
    InvalidFile(String),
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "save io error: {err}"),
            Self::Serde(err) => write!(f, "save serde error: {err}"),
            Self::InvalidName => write!(f, "save name is empty after sanitization"),
            Self::LimitExceeded => write!(f, "save slot limit reached"),
            Self::NotFound(name) => write!(f, "no save named {name}"),
            Self::InvalidFile(name) => write!(f, "save file {name} did not parse"),
        }
    }
}

impl std::error::Error for SaveError {}

impl From<std::io::Error> for SaveError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SaveError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl SaveError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::SaveFailed,
            Self::Serde(_) => ErrorCode::SaveFailed,
            Self::InvalidName => ErrorCode::InvalidSaveName,
            Self::LimitExceeded => ErrorCode::SaveLimitExceeded,
            Self::NotFound(_) => ErrorCode::SaveNotFound,
            Self::InvalidFile(_) => ErrorCode::InvalidSaveFile,
        }
    }
}

/// Strips everything outside `[A-Za-z0-9 ]`, trims, caps at 30 characters.
pub fn sanitize_save_name(raw: &str) -> Result<String, SaveError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(SaveError::InvalidName);
    }
    Ok(trimmed.chars().take(MAX_NAME_LEN).collect::<String>().trim().to_string())
}

#[derive(Debug)]
pub struct SaveStore {
    root: PathBuf,
    max_slots: usize,
}

impl SaveStore {
    pub fn new(root: impl AsRef<Path>, max_slots: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_slots,
        }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn existing_names(&self, session_id: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.session_dir(session_id)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// Writes the whole file; a second save under the same name lands in
    /// `"name (1)"`, `"name (2)"`, …
    pub fn save(
        &self,
        session_id: &str,
        raw_name: &str,
        state: &SessionState,
        timestamp: &str,
    ) -> Result<String, SaveError> {
        let base = sanitize_save_name(raw_name)?;
        let existing = self.existing_names(session_id);
        if existing.len() >= self.max_slots {
            return Err(SaveError::LimitExceeded);
        }

        let mut resolved = base.clone();
        let mut suffix = 1;
        while existing.iter().any(|name| *name == resolved) {
            resolved = format!("{base} ({suffix})");
            suffix += 1;
        }

        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)?;
        let envelope = SaveFile {
            game_state: state.clone(),
            timestamp: timestamp.to_string(),
            session_id: session_id.to_string(),
            save_name: resolved.clone(),
        };
        let payload = serde_json::to_vec(&envelope)?;
        fs::write(dir.join(format!("{resolved}.json")), payload)?;
        Ok(resolved)
    }

    pub fn load(&self, session_id: &str, raw_name: &str) -> Result<SaveFile, SaveError> {
        let name = sanitize_save_name(raw_name)?;
        let path = self.session_dir(session_id).join(format!("{name}.json"));
        if !path.exists() {
            return Err(SaveError::NotFound(name));
        }
        let payload = fs::read(&path)?;
        serde_json::from_slice::<SaveFile>(&payload)
            .map_err(|_| SaveError::InvalidFile(name))
    }

    pub fn list(&self, session_id: &str) -> Result<Vec<SaveFileMeta>, SaveError> {
        let dir = self.session_dir(session_id);
        let mut saves = Vec::new();
        let Ok(entries) = fs::read_dir(&dir) else {
            return Ok(saves);
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(name) = file_name.strip_suffix(".json") else {
                continue;
            };
            let bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            let timestamp = fs::read(entry.path())
                .ok()
                .and_then(|payload| serde_json::from_slice::<SaveFile>(&payload).ok())
                .map(|envelope| envelope.timestamp)
                .unwrap_or_default();
            saves.push(SaveFileMeta {
                save_name: name.to_string(),
                timestamp,
                bytes,
            });
        }
        saves.sort_by(|a, b| a.save_name.cmp(&b.save_name));
        Ok(saves)
    }

    /// Next free autosave-style name for `GET /api/newsave`.
    pub fn next_free_name(&self, session_id: &str) -> Result<String, SaveError> {
        let existing = self.existing_names(session_id);
        if existing.len() >= self.max_slots {
            return Err(SaveError::LimitExceeded);
        }
        for slot in 1..=self.max_slots {
            let candidate = format!("save {slot}");
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(SaveError::LimitExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use contracts::EngineConfig;
    use engine_core::session::new_session_state;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T12:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    fn temp_store(tag: &str) -> SaveStore {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        SaveStore::new(
            std::env::temp_dir().join(format!("world_saves_{tag}_{nanos}")),
            5,
        )
    }

    #[test]
    fn sanitization_strips_and_caps() {
        assert_eq!(sanitize_save_name("  my save! #1  ").expect("valid"), "my save 1");
        assert_eq!(
            sanitize_save_name("x".repeat(64).as_str()).expect("valid").len(),
            30
        );
        assert!(matches!(
            sanitize_save_name("!!!"),
            Err(SaveError::InvalidName)
        ));
    }

    #[test]
    fn save_load_round_trip_is_exact() {
        let store = temp_store("round_trip");
        let state = new_session_state(&EngineConfig::default(), 1337, fixed_now());
        let name = store
            .save("session_a", "one", &state, "2026-08-01T12:00:00Z")
            .expect("save succeeds");
        assert_eq!(name, "one");

        let loaded = store.load("session_a", "one").expect("load succeeds");
        assert_eq!(loaded.game_state, state);
        assert_eq!(loaded.save_name, "one");
        assert_eq!(loaded.session_id, "session_a");
    }

    #[test]
    fn duplicate_names_get_numbered_suffixes() {
        let store = temp_store("suffix");
        let state = new_session_state(&EngineConfig::default(), 1, fixed_now());
        let first = store
            .save("session_b", "one", &state, "t1")
            .expect("first save");
        let second = store
            .save("session_b", "one", &state, "t2")
            .expect("second save");
        assert_eq!(first, "one");
        assert_eq!(second, "one (1)");
        let names: Vec<String> = store
            .list("session_b")
            .expect("list")
            .into_iter()
            .map(|meta| meta.save_name)
            .collect();
        assert_eq!(names, vec!["one".to_string(), "one (1)".to_string()]);
    }

    #[test]
    fn sixth_save_fails_with_limit() {
        let store = temp_store("limit");
        let state = new_session_state(&EngineConfig::default(), 2, fixed_now());
        for slot in 0..5 {
            store
                .save("session_c", &format!("slot {slot}"), &state, "t")
                .expect("save within limit");
        }
        let err = store
            .save("session_c", "overflow", &state, "t")
            .expect_err("limit enforced");
        assert!(matches!(err, SaveError::LimitExceeded));
        assert_eq!(err.error_code(), ErrorCode::SaveLimitExceeded);
    }

    #[test]
    fn missing_and_corrupt_files_have_distinct_errors() {
        let store = temp_store("errors");
        assert!(matches!(
            store.load("session_d", "ghost"),
            Err(SaveError::NotFound(_))
        ));

        let dir = store.session_dir("session_d");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("broken.json"), b"not json").expect("write");
        assert!(matches!(
            store.load("session_d", "broken"),
            Err(SaveError::InvalidFile(_))
        ));
    }

    #[test]
    fn newsave_names_count_upward() {
        let store = temp_store("newsave");
        let state = new_session_state(&EngineConfig::default(), 3, fixed_now());
        assert_eq!(store.next_free_name("session_e").expect("name"), "save 1");
        store
            .save("session_e", "save 1", &state, "t")
            .expect("save");
        assert_eq!(store.next_free_name("session_e").expect("name"), "save 2");
    }
}
