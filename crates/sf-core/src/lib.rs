//! StreamFilter Core Library
//!
//! This crate provides the filtering engine behind the StreamFilter browser
//! extension, which hides or blurs stream cards on kick.com based on
//! user-curated block lists.
//!
//! # Architecture
//!
//! Three single-threaded processes share state only through storage and
//! messages: the background worker, one content instance per tab, and the
//! configuration panel. Everything that touches the host (storage, message
//! transport, timers, toasts, the live document) sits behind a trait so the
//! engine itself stays pure and testable.
//!
//! # Modules
//!
//! - `types`: Shared type definitions (settings, decisions, candidates)
//! - `normalize`: Entry and category normalization, URL path helpers
//! - `store`: Block lists with the no-duplicate invariant
//! - `storage`: Key-value persistence seam and the in-memory backend
//! - `matcher`: Block decisions for candidate items and stream pages
//! - `page`: Document seam, candidate extraction and the page scanner
//! - `schedule`: Timer seam and the debouncer
//! - `apply`: Hide/blur application, exact reversal, stream-page redirect
//! - `sync`: Wire messages, background worker, content instance, panel
//! - `backup`: Export/import documents
//! - `catalog`: Category catalog parsing, fallback and search
//! - `notify`: Toast seam with silent-mode gating

pub mod apply;
pub mod backup;
pub mod catalog;
pub mod matcher;
pub mod normalize;
pub mod notify;
pub mod page;
pub mod schedule;
pub mod storage;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use matcher::{evaluate, Matcher};
pub use normalize::{is_category_match, normalize_category};
pub use store::{FilterList, FilterStore};
pub use types::{BlockDecision, BlockReason, CandidateItem, ListKind, Settings};

/// Host of the single site this extension filters.
pub const TARGET_HOST: &str = "kick.com";

/// Where blocked stream pages are sent.
pub const HOME_URL: &str = "https://kick.com";

/// Tab query pattern matching every target-site page.
pub const TAB_URL_PATTERN: &str = "https://kick.com/*";

/// Schema version written into storage and exported documents.
pub const SCHEMA_VERSION: &str = "1.0.0";
