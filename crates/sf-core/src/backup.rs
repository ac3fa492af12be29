//! Export/import of the filter state
//!
//! An export is the whole store plus a timestamp and the schema version. An
//! import overwrites whichever top-level fields the document carries and
//! ignores the rest, so partial documents are fine. A document that is not
//! JSON, not an object, carries mistyped fields or none of the filter fields
//! is rejected and the store is left alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{FilterStore, FilterUpdate};
use crate::types::{FieldMask, ListKind, Settings, SettingsPatch};
use crate::storage::SETTINGS_KEY;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Not a JSON document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Backup must be a JSON object")]
    NotAnObject,
    #[error("Field '{0}' has the wrong type")]
    InvalidField(&'static str),
    #[error("Backup contains no filter fields")]
    NoFilterFields,
}

/// Downloadable backup document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub blocked_streamers: Vec<String>,
    pub blocked_keywords: Vec<String>,
    pub blocked_categories: Vec<String>,
    pub settings: Settings,
    pub export_date: String,
    pub version: String,
}

impl ExportDocument {
    /// Snapshot `store`, stamped with `exported_at` (RFC 3339).
    pub fn new(store: &FilterStore, exported_at: &str) -> Self {
        Self {
            blocked_streamers: store.streamers.entries().to_vec(),
            blocked_keywords: store.keywords.entries().to_vec(),
            blocked_categories: store.categories.entries().to_vec(),
            settings: store.settings,
            export_date: exported_at.to_string(),
            version: crate::SCHEMA_VERSION.to_string(),
        }
    }

    pub fn to_json_pretty(&self) -> String {
        // Plain strings and bools only; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Suggested download name, dated by the export day.
    pub fn file_name(&self) -> String {
        let day = self.export_date.get(..10).unwrap_or("backup");
        format!("streamfilter-backup-{}.json", day)
    }
}

/// Parse a backup into the update it describes.
pub fn parse_import(text: &str) -> Result<FilterUpdate, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let object = value.as_object().ok_or(ImportError::NotAnObject)?;

    let mut update = FilterUpdate::default();
    for kind in ListKind::ALL {
        let key = kind.storage_key();
        let entries = match object.get(key) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<String>>>()
                .ok_or(ImportError::InvalidField(key))?,
            Some(_) => return Err(ImportError::InvalidField(key)),
        };
        match kind {
            ListKind::Streamers => update.blocked_streamers = Some(entries),
            ListKind::Keywords => update.blocked_keywords = Some(entries),
            ListKind::Categories => update.blocked_categories = Some(entries),
        }
    }

    match object.get(SETTINGS_KEY) {
        None | Some(Value::Null) => {}
        Some(value @ Value::Object(_)) => {
            let patch: SettingsPatch = serde_json::from_value(value.clone())
                .map_err(|_| ImportError::InvalidField(SETTINGS_KEY))?;
            update.settings = Some(patch);
        }
        Some(_) => return Err(ImportError::InvalidField(SETTINGS_KEY)),
    }

    if update.is_empty() {
        return Err(ImportError::NoFilterFields);
    }
    Ok(update)
}

/// Import into `store`. On error the store is untouched.
pub fn import_into(store: &mut FilterStore, text: &str) -> Result<FieldMask, ImportError> {
    let update = parse_import(text)?;
    let fields = store.merge(&update);
    log::info!("Imported backup fields {:?}", fields);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> FilterStore {
        let mut store = FilterStore::new();
        store.add(ListKind::Streamers, "a");
        store.add(ListKind::Keywords, "gambling");
        store.add(ListKind::Categories, "Slots");
        store.settings.blur_mode = true;
        store
    }

    #[test]
    fn test_export_document() {
        let doc = ExportDocument::new(&populated(), "2026-10-16T12:00:00Z");
        assert_eq!(doc.version, crate::SCHEMA_VERSION);
        assert_eq!(doc.file_name(), "streamfilter-backup-2026-10-16.json");

        let json: Value = serde_json::from_str(&doc.to_json_pretty()).unwrap();
        assert_eq!(json["blockedKeywords"][0], "gambling");
        assert_eq!(json["settings"]["blurMode"], true);
        assert_eq!(json["exportDate"], "2026-10-16T12:00:00Z");
    }

    #[test]
    fn test_partial_import_keeps_other_fields() {
        let mut store = populated();
        let fields = import_into(&mut store, r#"{"blockedStreamers":["x"]}"#).unwrap();
        assert_eq!(fields, FieldMask::STREAMERS);
        assert_eq!(store.streamers.entries(), ["x"]);
        assert_eq!(store.keywords.entries(), ["gambling"]);
        assert_eq!(store.categories.entries(), ["Slots"]);
        assert!(store.settings.blur_mode);
    }

    #[test]
    fn test_export_then_import_into_empty_store() {
        let source = populated();
        let text = ExportDocument::new(&source, "2026-10-16T12:00:00Z").to_json_pretty();
        let mut target = FilterStore::new();
        import_into(&mut target, &text).unwrap();
        assert_eq!(target, source);
    }

    #[test]
    fn test_unknown_fields_ignored_and_duplicates_dropped() {
        let mut store = FilterStore::new();
        let text = r#"{"blockedKeywords":["Casino","casino "],"theme":"dark","settings":{"silentMode":true}}"#;
        import_into(&mut store, text).unwrap();
        assert_eq!(store.keywords.entries(), ["casino"]);
        assert!(store.settings.silent_mode);
    }

    #[test]
    fn test_malformed_documents_leave_store_untouched() {
        let original = populated();
        for text in [
            "not json",
            "[1, 2]",
            r#"{"blockedStreamers": "x"}"#,
            r#"{"blockedStreamers": ["ok", 3]}"#,
            r#"{"settings": {"blurMode": "yes"}}"#,
            r#"{"theme": "dark"}"#,
        ] {
            let mut store = original.clone();
            assert!(import_into(&mut store, text).is_err(), "accepted {text}");
            assert_eq!(store, original);
        }
    }
}
