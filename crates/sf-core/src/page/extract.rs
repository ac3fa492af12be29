//! Candidate extraction
//!
//! Stream cards use several markup variants, so each attribute is probed
//! with an ordered list of selectors and the first non-empty text wins.

use std::collections::HashSet;

use crate::normalize::last_path_segment;
use crate::page::{PageDocument, PageElement};
use crate::types::{CandidateItem, ElementId};

// =============================================================================
// Selectors
// =============================================================================

/// Primary stream cards, most specific first.
pub const STREAM_CARD_SELECTORS: &[&str] = &[
    r#"[data-testid="stream-card"]"#,
    ".stream-card",
    r#"[class*="stream"]"#,
    r#"[class*="channel"]"#,
    r#"a[href*="/"]"#,
];

/// Sidebar and recommendation/following regions.
pub const LIST_CONTAINER_SELECTORS: &[&str] = &[
    r#"[class*="sidebar"]"#,
    r#"[class*="recommended"]"#,
    r#"[class*="following"]"#,
    ".live-channels",
    ".channel-list",
];

/// Items inside a list container. Broader than the card selectors.
pub const LIST_ITEM_SELECTOR: &str = r#"a, [class*="channel"], [class*="stream"]"#;

/// Streamer-name probes, tried in order.
pub const NAME_SELECTORS: &[&str] = &[
    r#"[data-testid="stream-username"]"#,
    ".stream-username",
    ".streamer-name",
    ".channel-name",
    "h3",
    "h4",
    "h5",
    r#"[class*="username"]"#,
    r#"[class*="name"]"#,
];

pub const TITLE_SELECTOR: &str = r#"[data-testid="stream-title"], .stream-title, .title"#;

pub const CATEGORY_SELECTOR: &str = r#"[data-testid="stream-category"], .stream-category, .category"#;

/// Header region of a channel page, holding the live stream's own metadata.
pub const CHANNEL_HEADER_SELECTOR: &str = r#"[data-testid="channel-header"], .channel-header, .stream-info"#;

/// Category metadata of the page itself.
pub const PAGE_CATEGORY_SELECTOR: &str =
    r#"[data-testid="stream-category"], .stream-category, .category, [class*="category"]"#;

/// Elements that get a quick-block button on hover.
pub const QUICK_BLOCK_TARGET_SELECTOR: &str = r#"[data-testid="stream-card"], .stream-card, a[href*="/"]"#;

// =============================================================================
// Name Strategies
// =============================================================================

/// One way of deriving a streamer name from an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStrategy {
    /// Text of the first descendant matching the selector
    Selector(&'static str),
    /// Last path segment of the element's own link target
    LinkTarget,
}

impl NameStrategy {
    /// Lower-cased name, or `None` when this strategy finds nothing.
    pub fn extract<E: PageElement>(&self, element: &E) -> Option<String> {
        match self {
            Self::Selector(selector) => element
                .query_selector(selector)
                .map(|found| found.text_content().trim().to_lowercase())
                .filter(|name| !name.is_empty()),
            Self::LinkTarget => {
                if !element.tag_name().eq_ignore_ascii_case("a") {
                    return None;
                }
                let href = element.attribute("href")?;
                if !href.contains('/') {
                    return None;
                }
                last_path_segment(&href)
            }
        }
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Builds candidate items from elements.
#[derive(Debug, Clone)]
pub struct Extractor {
    strategies: Vec<NameStrategy>,
}

impl Default for Extractor {
    fn default() -> Self {
        let mut strategies: Vec<NameStrategy> =
            NAME_SELECTORS.iter().map(|s| NameStrategy::Selector(s)).collect();
        strategies.push(NameStrategy::LinkTarget);
        Self { strategies }
    }
}

impl Extractor {
    pub fn with_strategies(strategies: Vec<NameStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[NameStrategy] {
        &self.strategies
    }

    /// First name any strategy finds.
    pub fn extract_name<E: PageElement>(&self, element: &E) -> Option<String> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.extract(element))
    }

    /// Build a candidate, or `None` if the element has no derivable name
    /// (not a candidate at all).
    pub fn extract<E: PageElement>(&self, element: &E) -> Option<CandidateItem<E>> {
        let name = self.extract_name(element)?;

        let title = element
            .query_selector(TITLE_SELECTOR)
            .map(|found| found.text_content().trim().to_lowercase())
            .unwrap_or_default();

        let category = element
            .query_selector(CATEGORY_SELECTOR)
            .map(|found| found.text_content().trim().to_string())
            .unwrap_or_default();

        Some(CandidateItem {
            name,
            title,
            category,
            element: element.clone(),
        })
    }
}

/// Non-empty category texts the page shows about itself.
pub fn page_categories<D: PageDocument>(document: &D) -> Vec<String> {
    if let Some(header) = document.query_selector_all(CHANNEL_HEADER_SELECTOR).into_iter().next() {
        return header
            .query_selector_all(PAGE_CATEGORY_SELECTOR)
            .iter()
            .map(|element| element.text_content().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
    }

    // Without a header, take the first category that does not belong to
    // another stream's card or a sidebar list.
    let foreign: HashSet<ElementId> = LIST_CONTAINER_SELECTORS
        .iter()
        .chain(STREAM_CARD_SELECTORS.iter().take(2))
        .flat_map(|selector| document.query_selector_all(selector))
        .flat_map(|region| region.query_selector_all(PAGE_CATEGORY_SELECTOR))
        .map(|element| element.identity())
        .collect();

    document
        .query_selector_all(PAGE_CATEGORY_SELECTOR)
        .iter()
        .filter(|element| !foreign.contains(&element.identity()))
        .map(|element| element.text_content().trim().to_string())
        .find(|text| !text.is_empty())
        .into_iter()
        .collect()
}
