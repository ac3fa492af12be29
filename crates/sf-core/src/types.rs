//! Core type definitions for StreamFilter
//!
//! These types travel between the three extension processes, so the
//! serializable ones use the camelCase wire names the storage layer and the
//! message transport expect.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// List Kinds
// =============================================================================

/// The three block lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Streamers,
    Keywords,
    Categories,
}

impl ListKind {
    pub const ALL: [ListKind; 3] = [Self::Streamers, Self::Keywords, Self::Categories];

    /// Storage key holding this list.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Streamers => "blockedStreamers",
            Self::Keywords => "blockedKeywords",
            Self::Categories => "blockedCategories",
        }
    }

    /// Parse from a user-facing list name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streamer" | "streamers" => Some(Self::Streamers),
            "keyword" | "keywords" => Some(Self::Keywords),
            "category" | "categories" => Some(Self::Categories),
            _ => None,
        }
    }

    pub(crate) fn field(self) -> FieldMask {
        match self {
            Self::Streamers => FieldMask::STREAMERS,
            Self::Keywords => FieldMask::KEYWORDS,
            Self::Categories => FieldMask::CATEGORIES,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Streamers => "streamers",
            Self::Keywords => "keywords",
            Self::Categories => "categories",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Field Mask
// =============================================================================

bitflags::bitflags! {
    /// Which store fields a change or an update message carries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldMask: u8 {
        const STREAMERS = 1 << 0;
        const KEYWORDS = 1 << 1;
        const CATEGORIES = 1 << 2;
        const SETTINGS = 1 << 3;
        /// Every filter field
        const ALL = Self::STREAMERS.bits()
            | Self::KEYWORDS.bits()
            | Self::CATEGORIES.bits()
            | Self::SETTINGS.bits();
    }
}

// =============================================================================
// Settings
// =============================================================================

/// User settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Suppress success/info toasts
    pub silent_mode: bool,
    /// Blur blocked cards instead of hiding them
    pub blur_mode: bool,
}

/// Partial settings, merged field-by-field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub silent_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub blur_mode: Option<bool>,
}

impl Settings {
    /// Overwrite only the fields the patch carries.
    pub fn merge(&mut self, patch: &SettingsPatch) {
        if let Some(silent_mode) = patch.silent_mode {
            self.silent_mode = silent_mode;
        }
        if let Some(blur_mode) = patch.blur_mode {
            self.blur_mode = blur_mode;
        }
    }
}

impl From<Settings> for SettingsPatch {
    fn from(settings: Settings) -> Self {
        Self {
            silent_mode: Some(settings.silent_mode),
            blur_mode: Some(settings.blur_mode),
        }
    }
}

// =============================================================================
// Block Decision
// =============================================================================

/// Why an item was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum BlockReason {
    Streamer,
    Keyword,
    Category,
    None,
}

/// Verdict for one candidate item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct BlockDecision {
    pub blocked: bool,
    pub reason: BlockReason,
    /// The list entry that matched (empty when not blocked)
    pub matched_value: String,
}

impl BlockDecision {
    pub fn allow() -> Self {
        Self {
            blocked: false,
            reason: BlockReason::None,
            matched_value: String::new(),
        }
    }

    pub fn block(reason: BlockReason, matched_value: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason,
            matched_value: matched_value.into(),
        }
    }

    /// Human readable reason shown on overlays and tagged on hidden cards.
    pub fn label(&self) -> String {
        if !self.blocked {
            return "Unknown reason".to_string();
        }
        match self.reason {
            BlockReason::Streamer => format!("Streamer: {}", self.matched_value),
            BlockReason::Keyword => format!("Keyword: {}", self.matched_value),
            BlockReason::Category => format!("Category: {}", self.matched_value),
            BlockReason::None => "Unknown reason".to_string(),
        }
    }
}

impl Default for BlockDecision {
    fn default() -> Self {
        Self::allow()
    }
}

// =============================================================================
// Candidate Item
// =============================================================================

/// Opaque identity of one live DOM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// A page element provisionally identified as a streamer/channel.
///
/// Built fresh on each scan pass; `element` ties it to one DOM node, so an
/// item is never reused across passes.
#[derive(Debug, Clone)]
pub struct CandidateItem<E> {
    /// Lower-cased streamer name, never empty
    pub name: String,
    /// Lower-cased stream title, may be empty
    pub title: String,
    /// Category as displayed, may be empty
    pub category: String,
    pub element: E,
}

impl CandidateItem<()> {
    /// An item with no backing element, for offline evaluation.
    ///
    /// `None` when the name is blank: such an item is not a candidate.
    pub fn detached(name: &str, title: &str, category: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            title: title.trim().to_lowercase(),
            category: category.trim().to_string(),
            element: (),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_merge_only_present_fields() {
        let mut settings = Settings { silent_mode: true, blur_mode: false };
        settings.merge(&SettingsPatch { silent_mode: None, blur_mode: Some(true) });
        assert_eq!(settings, Settings { silent_mode: true, blur_mode: true });
    }

    #[test]
    fn test_settings_partial_json() {
        let settings: Settings = serde_json::from_str(r#"{"blurMode":true}"#).unwrap();
        assert!(settings.blur_mode);
        assert!(!settings.silent_mode);
    }

    #[test]
    fn test_decision_label() {
        assert_eq!(BlockDecision::block(BlockReason::Keyword, "gambling").label(), "Keyword: gambling");
        assert_eq!(BlockDecision::block(BlockReason::Streamer, "foo").label(), "Streamer: foo");
        assert_eq!(BlockDecision::allow().label(), "Unknown reason");
    }

    #[test]
    fn test_list_kind_parse() {
        assert_eq!(ListKind::parse("Streamer"), Some(ListKind::Streamers));
        assert_eq!(ListKind::parse("keywords"), Some(ListKind::Keywords));
        assert_eq!(ListKind::parse("category"), Some(ListKind::Categories));
        assert_eq!(ListKind::parse("tags"), None);
    }

    #[test]
    fn test_blank_name_is_not_a_candidate() {
        assert!(CandidateItem::detached("", "24/7 gambling", "Slots").is_none());
        assert!(CandidateItem::detached("   ", "title", "").is_none());
        let item = CandidateItem::detached(" XQC ", " Title ", " Slots ").unwrap();
        assert_eq!((item.name.as_str(), item.title.as_str(), item.category.as_str()), ("xqc", "title", "Slots"));
    }

    #[test]
    fn test_reason_wire_names() {
        let json = serde_json::to_string(&BlockDecision::block(BlockReason::Category, "Slots")).unwrap();
        assert_eq!(json, r#"{"blocked":true,"reason":"category","matchedValue":"Slots"}"#);
    }
}
