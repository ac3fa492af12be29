//! Block lists and settings
//!
//! The store is built once per process and handed to everything that needs
//! it. Every mutation goes through [`FilterStore::add`] or
//! [`FilterStore::remove`], which keep the no-duplicate invariant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{normalize_category, normalize_entry};
use crate::storage::{StorageBackend, StorageChanges, StorageEntries, StorageError, FILTER_KEYS, SETTINGS_KEY};
use crate::types::{FieldMask, ListKind, Settings, SettingsPatch};

// =============================================================================
// Filter List
// =============================================================================

/// An ordered list with set semantics.
///
/// Streamer and keyword entries are stored normalized. Category entries keep
/// their display form and are compared through [`normalize_category`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterList {
    kind: ListKind,
    entries: Vec<String>,
}

impl FilterList {
    pub fn new(kind: ListKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Build a list, dropping duplicates and empty values.
    pub fn from_entries<I, S>(kind: ListKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new(kind);
        for value in values {
            list.add(value.as_ref());
        }
        list
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Comparison key of a value under this list's normalization.
    pub fn key(&self, value: &str) -> String {
        match self.kind {
            ListKind::Categories => normalize_category(value),
            ListKind::Streamers | ListKind::Keywords => normalize_entry(value),
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| self.key(entry) == key)
    }

    pub fn contains(&self, value: &str) -> bool {
        let key = self.key(value);
        !key.is_empty() && self.position(&key).is_some()
    }

    /// Add a value. Returns false (and changes nothing) when the value is
    /// empty after normalization or already present.
    pub fn add(&mut self, value: &str) -> bool {
        let key = self.key(value);
        if key.is_empty() || self.position(&key).is_some() {
            return false;
        }
        let stored = match self.kind {
            ListKind::Categories => value.trim().to_string(),
            ListKind::Streamers | ListKind::Keywords => key,
        };
        self.entries.push(stored);
        true
    }

    /// Remove a value. Returns false when it was not present.
    pub fn remove(&mut self, value: &str) -> bool {
        let key = self.key(value);
        match self.position(&key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    fn to_value(&self) -> Value {
        Value::from(self.entries.clone())
    }
}

// =============================================================================
// Partial Update
// =============================================================================

/// A subset of the store's fields, as carried by `updateFilters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct FilterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub blocked_streamers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub blocked_keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub blocked_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub settings: Option<SettingsPatch>,
}

impl FilterUpdate {
    /// Every field of the store.
    pub fn full(store: &FilterStore) -> Self {
        Self {
            blocked_streamers: Some(store.streamers.entries.clone()),
            blocked_keywords: Some(store.keywords.entries.clone()),
            blocked_categories: Some(store.categories.entries.clone()),
            settings: Some(store.settings.into()),
        }
    }

    /// Only the filter fields a storage write touched.
    ///
    /// A removed key (e.g. after a clear) becomes an empty list or default
    /// settings so receivers drop the old state.
    pub fn from_changes(changes: &StorageChanges) -> Self {
        let mut update = Self::default();
        for (key, change) in changes {
            let new_value = change.new_value.as_ref();
            match key.as_str() {
                SETTINGS_KEY => {
                    let settings = new_value.map(decode_settings).unwrap_or_default();
                    update.settings = Some(settings.into());
                }
                other => {
                    let kind = match ListKind::ALL.into_iter().find(|kind| kind.storage_key() == other) {
                        Some(kind) => kind,
                        None => continue,
                    };
                    let entries = new_value.map(|value| decode_list(other, value)).unwrap_or_default();
                    *update.list_mut(kind) = Some(entries);
                }
            }
        }
        update
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut Option<Vec<String>> {
        match kind {
            ListKind::Streamers => &mut self.blocked_streamers,
            ListKind::Keywords => &mut self.blocked_keywords,
            ListKind::Categories => &mut self.blocked_categories,
        }
    }

    /// Which fields are present.
    pub fn fields(&self) -> FieldMask {
        let mut mask = FieldMask::empty();
        if self.blocked_streamers.is_some() {
            mask |= FieldMask::STREAMERS;
        }
        if self.blocked_keywords.is_some() {
            mask |= FieldMask::KEYWORDS;
        }
        if self.blocked_categories.is_some() {
            mask |= FieldMask::CATEGORIES;
        }
        if self.settings.is_some() {
            mask |= FieldMask::SETTINGS;
        }
        mask
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

// =============================================================================
// Filter Store
// =============================================================================

/// The three block lists plus settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStore {
    pub streamers: FilterList,
    pub keywords: FilterList,
    pub categories: FilterList,
    pub settings: Settings,
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterStore {
    /// An empty store, as written on first install.
    pub fn new() -> Self {
        Self {
            streamers: FilterList::new(ListKind::Streamers),
            keywords: FilterList::new(ListKind::Keywords),
            categories: FilterList::new(ListKind::Categories),
            settings: Settings::default(),
        }
    }

    pub fn list(&self, kind: ListKind) -> &FilterList {
        match kind {
            ListKind::Streamers => &self.streamers,
            ListKind::Keywords => &self.keywords,
            ListKind::Categories => &self.categories,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut FilterList {
        match kind {
            ListKind::Streamers => &mut self.streamers,
            ListKind::Keywords => &mut self.keywords,
            ListKind::Categories => &mut self.categories,
        }
    }

    pub fn add(&mut self, kind: ListKind, value: &str) -> bool {
        self.list_mut(kind).add(value)
    }

    pub fn remove(&mut self, kind: ListKind, value: &str) -> bool {
        self.list_mut(kind).remove(value)
    }

    /// Entries across all three lists.
    pub fn total_entries(&self) -> usize {
        self.streamers.len() + self.keywords.len() + self.categories.len()
    }

    /// Merge a partial update: lists present in the update replace the local
    /// ones, settings merge field-by-field, absent fields stay untouched.
    pub fn merge(&mut self, update: &FilterUpdate) -> FieldMask {
        for kind in ListKind::ALL {
            let values = match kind {
                ListKind::Streamers => &update.blocked_streamers,
                ListKind::Keywords => &update.blocked_keywords,
                ListKind::Categories => &update.blocked_categories,
            };
            if let Some(values) = values {
                *self.list_mut(kind) = FilterList::from_entries(kind, values);
            }
        }
        if let Some(patch) = &update.settings {
            self.settings.merge(patch);
        }
        update.fields()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Decode a store from raw storage entries. Missing or mistyped keys fall
    /// back to their defaults.
    pub fn from_entries(entries: &StorageEntries) -> Self {
        let mut store = Self::new();
        for kind in ListKind::ALL {
            if let Some(value) = entries.get(kind.storage_key()) {
                let values = decode_list(kind.storage_key(), value);
                *store.list_mut(kind) = FilterList::from_entries(kind, values);
            }
        }
        if let Some(value) = entries.get(SETTINGS_KEY) {
            store.settings = decode_settings(value);
        }
        store
    }

    /// Encode the given fields as storage entries.
    pub fn to_entries(&self, fields: FieldMask) -> StorageEntries {
        let mut entries = StorageEntries::new();
        for kind in ListKind::ALL {
            if fields.contains(kind.field()) {
                entries.insert(kind.storage_key().to_string(), self.list(kind).to_value());
            }
        }
        if fields.contains(FieldMask::SETTINGS) {
            entries.insert(
                SETTINGS_KEY.to_string(),
                serde_json::json!({
                    "silentMode": self.settings.silent_mode,
                    "blurMode": self.settings.blur_mode,
                }),
            );
        }
        entries
    }

    /// Read the store from persistence.
    pub fn load(storage: &dyn StorageBackend) -> Result<Self, StorageError> {
        let entries = storage.get(&FILTER_KEYS)?;
        Ok(Self::from_entries(&entries))
    }

    /// Read the store, treating an unreadable backend as "no data yet".
    pub fn load_or_default(storage: &dyn StorageBackend) -> Self {
        match Self::load(storage) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Filter load failed, starting empty: {}", e);
                Self::new()
            }
        }
    }

    /// Write every field to persistence.
    pub fn save(&self, storage: &mut dyn StorageBackend) -> Result<(), StorageError> {
        storage.set(self.to_entries(FieldMask::ALL))
    }
}

fn decode_list(key: &str, value: &Value) -> Vec<String> {
    match value.as_array() {
        Some(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        None => {
            log::warn!("Ignoring '{}': expected an array, got {}", key, value);
            Vec::new()
        }
    }
}

fn decode_settings(value: &Value) -> Settings {
    match serde_json::from_value(value.clone()) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Ignoring malformed settings: {}", e);
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageChange};
    use crate::testing::FailingStorage;
    use serde_json::json;

    #[test]
    fn test_add_rejects_case_insensitive_duplicate() {
        let mut store = FilterStore::new();
        assert!(store.add(ListKind::Streamers, "Foo"));
        assert!(!store.add(ListKind::Streamers, "foo"));
        assert_eq!(store.streamers.len(), 1);
        assert_eq!(store.streamers.entries(), ["foo"]);
    }

    #[test]
    fn test_add_rejects_empty() {
        let mut store = FilterStore::new();
        assert!(!store.add(ListKind::Keywords, "   "));
        assert!(!store.add(ListKind::Categories, "!!!"));
        assert_eq!(store.total_entries(), 0);
    }

    #[test]
    fn test_category_keeps_display_form() {
        let mut store = FilterStore::new();
        assert!(store.add(ListKind::Categories, " Just Chatting "));
        assert!(!store.add(ListKind::Categories, "just-chatting"));
        assert_eq!(store.categories.entries(), ["Just Chatting"]);
        assert!(store.categories.contains("JUSTCHATTING"));
    }

    #[test]
    fn test_remove() {
        let mut store = FilterStore::new();
        store.add(ListKind::Keywords, "gambling");
        assert!(!store.remove(ListKind::Keywords, "casino"));
        assert!(store.remove(ListKind::Keywords, " Gambling"));
        assert!(store.keywords.is_empty());

        store.add(ListKind::Categories, "Slots");
        assert!(store.remove(ListKind::Categories, "slots"));
    }

    #[test]
    fn test_merge_only_present_fields() {
        let mut store = FilterStore::new();
        store.add(ListKind::Keywords, "gambling");
        store.add(ListKind::Categories, "Slots");
        store.settings.silent_mode = true;

        let update = FilterUpdate {
            blocked_streamers: Some(vec!["X".into(), "x".into()]),
            settings: Some(SettingsPatch { silent_mode: None, blur_mode: Some(true) }),
            ..Default::default()
        };
        let fields = store.merge(&update);

        assert_eq!(fields, FieldMask::STREAMERS | FieldMask::SETTINGS);
        assert_eq!(store.streamers.entries(), ["x"]);
        assert_eq!(store.keywords.entries(), ["gambling"]);
        assert_eq!(store.categories.entries(), ["Slots"]);
        assert!(store.settings.silent_mode);
        assert!(store.settings.blur_mode);
    }

    #[test]
    fn test_save_then_load() {
        let mut storage = MemoryStorage::new();
        let mut store = FilterStore::new();
        store.add(ListKind::Streamers, "foo");
        store.add(ListKind::Categories, "Just Chatting");
        store.settings.blur_mode = true;
        store.save(&mut storage).unwrap();

        let loaded = FilterStore::load(&storage).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_from_entries_tolerates_garbage() {
        let entries = json!({
            "blockedStreamers": "not-a-list",
            "blockedKeywords": ["ok", 5, "OK"],
            "settings": {"blurMode": "yes"}
        });
        let store = FilterStore::from_entries(entries.as_object().unwrap());
        assert!(store.streamers.is_empty());
        assert_eq!(store.keywords.entries(), ["ok"]);
        assert_eq!(store.settings, Settings::default());
    }

    #[test]
    fn test_load_failure_is_recoverable() {
        let storage = FailingStorage;
        assert!(FilterStore::load(&storage).is_err());
        assert_eq!(FilterStore::load_or_default(&storage), FilterStore::new());
    }

    #[test]
    fn test_update_from_changes() {
        let mut changes = StorageChanges::new();
        changes.insert(
            "blockedKeywords".into(),
            StorageChange { old_value: None, new_value: Some(json!(["a"])) },
        );
        changes.insert(
            "blockedStreamers".into(),
            StorageChange { old_value: Some(json!(["b"])), new_value: None },
        );
        changes.insert(
            "installDate".into(),
            StorageChange { old_value: None, new_value: Some(json!("2026-01-01")) },
        );

        let update = FilterUpdate::from_changes(&changes);
        assert_eq!(update.fields(), FieldMask::KEYWORDS | FieldMask::STREAMERS);
        assert_eq!(update.blocked_keywords, Some(vec!["a".to_string()]));
        assert_eq!(update.blocked_streamers, Some(Vec::new()));
    }

    #[test]
    fn test_update_wire_format_omits_absent_fields() {
        let update = FilterUpdate {
            blocked_keywords: Some(vec!["a".into()]),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"blockedKeywords": ["a"]}));
    }
}
