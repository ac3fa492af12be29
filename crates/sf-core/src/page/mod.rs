//! Live document seam and candidate scanning
//!
//! The engine never touches a DOM directly. The content process hands it a
//! [`PageDocument`] whose elements implement [`PageElement`]; the wasm crate
//! backs both with `web-sys`, tests back them with an in-memory tree.

mod extract;
mod scanner;

pub use extract::{
    page_categories, Extractor, NameStrategy, CATEGORY_SELECTOR, LIST_CONTAINER_SELECTORS,
    LIST_ITEM_SELECTOR, NAME_SELECTORS, PAGE_CATEGORY_SELECTOR, QUICK_BLOCK_TARGET_SELECTOR,
    STREAM_CARD_SELECTORS, TITLE_SELECTOR,
};
pub use scanner::{PageScanner, ProcessedSet, ScanReport};

use crate::schedule::Subscription;
use crate::types::ElementId;

/// A badge appended inside a blurred card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub class_name: &'static str,
    pub icon: &'static str,
    pub title: &'static str,
    pub detail: String,
}

/// Full-page notice shown before leaving a blocked stream page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWarning {
    pub title: String,
    pub reason: String,
    pub countdown_secs: u32,
    pub home_url: String,
}

/// One element of the live document.
///
/// Handles are cheap clones referring to the same node. Mutators are
/// infallible: a write the host rejects is dropped.
pub trait PageElement: Clone + 'static {
    /// Stable identity of the underlying node.
    fn identity(&self) -> ElementId;

    fn tag_name(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn remove_attribute(&self, name: &str);

    /// Set one inline style property.
    fn set_style(&self, property: &str, value: &str);

    /// Concatenated text of the subtree.
    fn text_content(&self) -> String;

    /// First descendant matching a CSS selector list.
    fn query_selector(&self, selector: &str) -> Option<Self>;

    /// Every descendant matching a CSS selector list, in document order.
    fn query_selector_all(&self, selector: &str) -> Vec<Self>;

    fn append_overlay(&self, overlay: &Overlay);

    /// Remove child overlays carrying `class_name`. Returns how many went.
    fn remove_overlays(&self, class_name: &str) -> usize;

    /// Attach a quick-block button; `on_click` runs at most once.
    fn show_quick_block_button(&self, tooltip: &str, on_click: Box<dyn FnOnce()>);
}

/// The live document of one page instance.
pub trait PageDocument: Clone + 'static {
    type Element: PageElement;

    fn query_selector_all(&self, selector: &str) -> Vec<Self::Element>;

    /// Path of the current location, e.g. `/xqc`.
    fn location_path(&self) -> String;

    fn navigate(&self, url: &str);

    /// Show the blocked-page warning. Returns false if one is already shown.
    fn show_page_warning(&self, warning: &PageWarning) -> bool;

    /// Remove every quick-block button on the page.
    fn remove_quick_block_buttons(&self);

    /// Watch the whole subtree for structural changes. The handler receives
    /// the number of element nodes added by one batch of mutations.
    fn observe_structural_changes(&self, handler: Box<dyn FnMut(usize)>) -> Subscription;
}
