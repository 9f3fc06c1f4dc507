use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::history::SessionRecord;

/// The single persisted document: typing history plus the profile image name.
///
/// Keys this version does not know about are carried through a save untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default, deserialize_with = "lenient_history")]
    pub history: Vec<SessionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write settings to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Every read and write of the settings document goes through this.
pub trait SettingsStore: Send + Sync {
    /// Never fails: a missing or unreadable document is an empty one.
    fn load(&self) -> SettingsDocument;

    fn save(&self, doc: &SettingsDocument) -> Result<(), SettingsError>;

    /// Read-modify-write; returns the document as saved.
    fn update(
        &self,
        apply: &mut dyn FnMut(&mut SettingsDocument),
    ) -> Result<SettingsDocument, SettingsError> {
        let mut doc = self.load();
        apply(&mut doc);
        self.save(&doc)?;
        Ok(doc)
    }
}

#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces whatever is on disk with an empty history.
    pub fn reset(&self) -> Result<(), SettingsError> {
        self.save(&SettingsDocument::default())
    }

    fn io_error(&self, source: io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> SettingsDocument {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings at {}, starting empty", self.path.display());
                return SettingsDocument::default();
            }
            Err(e) => {
                warn!("Cannot read settings {}: {e}", self.path.display());
                return SettingsDocument::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Ignoring malformed settings {}: {e}", self.path.display());
            SettingsDocument::default()
        })
    }

    /// Pretty-prints with four-space indentation into a sibling file, then
    /// renames it over the target so readers never see a half-written file.
    fn save(&self, doc: &SettingsDocument) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut data = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut data, formatter);
        doc.serialize(&mut serializer)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings.json".to_string());
        let staging = self.path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&staging, &data).map_err(|e| self.io_error(e))?;
        fs::rename(&staging, &self.path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            self.io_error(e)
        })
    }

    /// Serializes updates from this process; other processes still race.
    fn update(
        &self,
        apply: &mut dyn FnMut(&mut SettingsDocument),
    ) -> Result<SettingsDocument, SettingsError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.load();
        apply(&mut doc);
        self.save(&doc)?;
        Ok(doc)
    }
}

/// In-memory store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    doc: Mutex<SettingsDocument>,
}

impl MemorySettingsStore {
    pub fn new(doc: SettingsDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> SettingsDocument {
        self.doc
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, doc: &SettingsDocument) -> Result<(), SettingsError> {
        *self.doc.lock().unwrap_or_else(PoisonError::into_inner) = doc.clone();
        Ok(())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut SettingsDocument),
    ) -> Result<SettingsDocument, SettingsError> {
        let mut doc = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut *doc);
        Ok(doc.clone())
    }
}

/// Drops individual history rows that do not fit instead of the whole document.
fn lenient_history<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<SessionRecord>, D::Error> {
    let rows = match Value::deserialize(d)? {
        Value::Array(rows) => rows,
        Value::Null => return Ok(Vec::new()),
        other => {
            warn!("Ignoring history that is not a list: {other}");
            return Ok(Vec::new());
        }
    };

    Ok(rows
        .into_iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            serde_json::from_value(row)
                .map_err(|e| warn!("Skipping history entry {idx}: {e}"))
                .ok()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{append_and_trim, record_session, SessionMetrics, HISTORY_LIMIT};
    use chrono::Local;
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(wpm: f64) -> SessionRecord {
        record_session(
            &SessionMetrics {
                wpm,
                errors: 0,
                backspaces: 0,
            },
            Local::now(),
        )
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::with_path(dir.path().join("train_settings.json"));
        assert_eq!(store.load(), SettingsDocument::default());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train_settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(FileSettingsStore::with_path(&path).load(), SettingsDocument::default());
    }

    #[test]
    fn roundtrip_with_four_space_indent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("train_settings.json");
        let store = FileSettingsStore::with_path(&path);

        let doc = SettingsDocument {
            history: vec![entry(72.0)],
            profile_image: Some("profile.png".into()),
            extra: Map::new(),
        };
        store.save(&doc).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n    \"history\": [\n        {"));
        assert_eq!(store.load(), doc);
        assert!(!dir.path().join("nested").join(".train_settings.json.tmp").exists());
    }

    #[test]
    fn unknown_keys_survive_a_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, r#"{"theme": "dark", "history": []}"#).unwrap();
        let store = FileSettingsStore::with_path(&path);

        store.update(&mut |doc| doc.history.push(entry(50.0))).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], json!("dark"));
        assert_eq!(raw["history"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let doc: SettingsDocument = serde_json::from_value(json!({
            "history": [
                {"wpm": 40, "timestamp": "2025-06-16T10:00:00"},
                {"wpm": {"nested": true}},
                {"wpm": 41, "timestamp": "2025-06-16T11:00:00"}
            ],
            "profile_image": "profile.gif"
        }))
        .unwrap();

        assert_eq!(doc.history.len(), 2);
        assert_eq!(doc.profile_image.as_deref(), Some("profile.gif"));
    }

    #[test]
    fn history_of_wrong_shape_is_empty() {
        let doc: SettingsDocument = serde_json::from_value(json!({"history": "oops"})).unwrap();
        assert!(doc.history.is_empty());
        let doc: SettingsDocument = serde_json::from_value(json!({"history": null})).unwrap();
        assert!(doc.history.is_empty());
    }

    #[test]
    fn load_does_not_truncate_but_next_save_does() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.json");
        let store = FileSettingsStore::with_path(&path);

        let long: Vec<SessionRecord> = (0..25).map(|i| entry(i as f64)).collect();
        store
            .save(&SettingsDocument {
                history: long,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(store.load().history.len(), 25);

        let saved = store
            .update(&mut |doc| {
                let history = std::mem::take(&mut doc.history);
                doc.history = append_and_trim(history, entry(99.0));
            })
            .unwrap();
        assert_eq!(saved.history.len(), HISTORY_LIMIT);
        assert_eq!(store.load().history.len(), HISTORY_LIMIT);
    }

    #[test]
    fn reset_writes_empty_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.json");
        let store = FileSettingsStore::with_path(&path);
        store.update(&mut |doc| doc.history.push(entry(1.0))).unwrap();

        store.reset().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\n    \"history\": []\n}");
    }

    #[test]
    fn concurrent_updates_do_not_lose_appends() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(FileSettingsStore::with_path(dir.path().join("s.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .update(&mut |doc| doc.history.insert(0, entry(i as f64)))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.load().history.len(), 8);
    }

    #[test]
    fn memory_store_update() {
        let store = MemorySettingsStore::default();
        store
            .update(&mut |doc| doc.profile_image = Some("profile.jpg".into()))
            .unwrap();
        assert_eq!(store.load().profile_image.as_deref(), Some("profile.jpg"));
    }
}
