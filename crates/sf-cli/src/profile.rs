//! File-backed storage profile
//!
//! The whole namespace lives in one pretty-printed JSON object, rewritten on
//! every write. A missing file is an empty namespace.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sf_core::storage::{StorageBackend, StorageEntries, StorageError, VERSION_KEY};
use sf_core::sync::InstallReason;

pub struct JsonFileStorage {
    path: PathBuf,
    entries: StorageEntries,
}

impl JsonFileStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(format!("Profile '{}' is not a JSON object", path.display())),
                Err(e) => return Err(format!("Failed to parse '{}': {}", path.display(), e)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StorageEntries::new(),
            Err(e) => return Err(format!("Failed to read '{}': {}", path.display(), e)),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lifecycle event this profile needs before use, if any.
    pub fn pending_install(&self) -> Option<InstallReason> {
        match self.entries.get(VERSION_KEY).and_then(Value::as_str) {
            None if self.entries.is_empty() => Some(InstallReason::Install),
            None => Some(InstallReason::Update { previous_version: None }),
            Some(version) if version != sf_core::SCHEMA_VERSION => Some(InstallReason::Update {
                previous_version: Some(version.to_string()),
            }),
            Some(_) => None,
        }
    }

    fn flush(&self) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(&self.entries).map_err(|e| StorageError::Serialize {
            key: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        fs::write(&self.path, text)
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", self.path.display(), e)))
    }
}

impl StorageBackend for JsonFileStorage {
    fn get(&self, keys: &[&str]) -> Result<StorageEntries, StorageError> {
        Ok(keys
            .iter()
            .filter_map(|key| self.entries.get(*key).map(|value| ((*key).to_string(), value.clone())))
            .collect())
    }

    fn set(&mut self, entries: StorageEntries) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
        self.flush()
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        self.flush()
    }
}
