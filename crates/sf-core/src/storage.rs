//! Key-value persistence seam
//!
//! The host exposes a JSON key-value namespace (`chrome.storage.local` in the
//! extension, a profile file in the CLI). Reads and writes may fail; callers
//! recover locally and treat a failed read as "no data yet".

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Storage key of the settings object.
pub const SETTINGS_KEY: &str = "settings";
/// Storage key of the install timestamp.
pub const INSTALL_DATE_KEY: &str = "installDate";
/// Storage key of the schema version.
pub const VERSION_KEY: &str = "version";

/// Keys that make up the filter state.
pub const FILTER_KEYS: [&str; 4] = [
    "blockedStreamers",
    "blockedKeywords",
    "blockedCategories",
    SETTINGS_KEY,
];

/// A batch of key/value pairs.
pub type StorageEntries = Map<String, Value>;

/// Error type for persistence access.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to serialize '{key}': {message}")]
    Serialize { key: String, message: String },
}

/// Host persistence.
pub trait StorageBackend {
    /// Read the given keys. Absent keys are simply missing from the result.
    fn get(&self, keys: &[&str]) -> Result<StorageEntries, StorageError>;

    /// Write the given keys, leaving others untouched.
    fn set(&mut self, entries: StorageEntries) -> Result<(), StorageError>;

    /// Remove every key.
    fn clear(&mut self) -> Result<(), StorageError>;
}

// =============================================================================
// Change Events
// =============================================================================

/// Before/after values of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Changes of one write, keyed by storage key.
pub type StorageChanges = BTreeMap<String, StorageChange>;

/// Compute the changes a write of `entries` makes over `current`.
/// Keys written with an identical value produce no change.
pub fn diff_entries(current: &StorageEntries, entries: &StorageEntries) -> StorageChanges {
    let mut changes = StorageChanges::new();
    for (key, new_value) in entries {
        let old_value = current.get(key);
        if old_value == Some(new_value) {
            continue;
        }
        changes.insert(
            key.clone(),
            StorageChange {
                old_value: old_value.cloned(),
                new_value: Some(new_value.clone()),
            },
        );
    }
    changes
}

// =============================================================================
// Memory Backend
// =============================================================================

type ChangeListener = Box<dyn FnMut(&StorageChanges)>;

/// In-memory backend with change subscription.
///
/// Doubles as the write-through cache the wasm layer keeps in front of the
/// asynchronous browser storage.
#[derive(Default)]
pub struct MemoryStorage {
    entries: StorageEntries,
    listeners: Vec<ChangeListener>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot of the namespace.
    pub fn with_entries(entries: StorageEntries) -> Self {
        Self {
            entries,
            listeners: Vec::new(),
        }
    }

    /// Register a listener called after every write that changed something.
    pub fn on_change(&mut self, listener: impl FnMut(&StorageChanges) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn entries(&self) -> &StorageEntries {
        &self.entries
    }

    fn emit(&mut self, changes: &StorageChanges) {
        if changes.is_empty() {
            return;
        }
        for listener in &mut self.listeners {
            listener(changes);
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, keys: &[&str]) -> Result<StorageEntries, StorageError> {
        let mut out = StorageEntries::new();
        for key in keys {
            if let Some(value) = self.entries.get(*key) {
                out.insert((*key).to_string(), value.clone());
            }
        }
        Ok(out)
    }

    fn set(&mut self, entries: StorageEntries) -> Result<(), StorageError> {
        let changes = diff_entries(&self.entries, &entries);
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
        self.emit(&changes);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        let changes: StorageChanges = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(key, old)| {
                (
                    key,
                    StorageChange {
                        old_value: Some(old),
                        new_value: None,
                    },
                )
            })
            .collect();
        self.emit(&changes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn entries(value: Value) -> StorageEntries {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_get_returns_only_present_keys() {
        let storage = MemoryStorage::with_entries(entries(json!({"blockedStreamers": ["a"]})));
        let got = storage.get(&FILTER_KEYS).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["blockedStreamers"], json!(["a"]));
    }

    #[test]
    fn test_diff_skips_identical_values() {
        let current = entries(json!({"blockedStreamers": ["a"], "blockedKeywords": []}));
        let write = entries(json!({"blockedStreamers": ["a"], "blockedKeywords": ["x"]}));
        let changes = diff_entries(&current, &write);
        assert_eq!(changes.len(), 1);
        let change = &changes["blockedKeywords"];
        assert_eq!(change.old_value, Some(json!([])));
        assert_eq!(change.new_value, Some(json!(["x"])));
    }

    #[test]
    fn test_listeners_see_writes_and_clear() {
        let seen: Rc<RefCell<Vec<Vec<String>>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let mut storage = MemoryStorage::new();
        storage.on_change(move |changes| {
            sink.borrow_mut().push(changes.keys().cloned().collect());
        });

        storage.set(entries(json!({"blockedKeywords": ["x"]}))).unwrap();
        storage.set(entries(json!({"blockedKeywords": ["x"]}))).unwrap();
        storage.clear().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], vec!["blockedKeywords".to_string()]);
        assert_eq!(seen[1], vec!["blockedKeywords".to_string()]);
        assert!(storage.entries().is_empty());
    }
}
