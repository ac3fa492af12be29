//! Core Matching Engine
//!
//! Maps a candidate item to a block decision. Pure and deterministic: the
//! same item against the same store always yields the same decision.
//!
//! Checks run in a fixed order and the first hit wins:
//! streamer name, then keywords, then categories.

use std::collections::HashSet;

use crate::normalize::{is_normalized_category_match, normalize_category};
use crate::store::FilterStore;
use crate::types::{BlockDecision, BlockReason, CandidateItem};

// =============================================================================
// Matcher
// =============================================================================

/// A store view prepared for repeated evaluation within one epoch.
pub struct Matcher<'a> {
    store: &'a FilterStore,
    streamers: HashSet<&'a str>,
    /// (normalized, display) pairs in list order
    categories: Vec<(String, &'a str)>,
}

impl<'a> Matcher<'a> {
    /// Create a matcher over the given store.
    pub fn new(store: &'a FilterStore) -> Self {
        Self {
            store,
            streamers: store.streamers.iter().collect(),
            categories: store
                .categories
                .iter()
                .map(|entry| (normalize_category(entry), entry))
                .collect(),
        }
    }

    pub fn store(&self) -> &'a FilterStore {
        self.store
    }

    /// Evaluate a candidate item.
    pub fn evaluate<E>(&self, item: &CandidateItem<E>) -> BlockDecision {
        let name = item.name.to_lowercase();

        if let Some(decision) = self.match_streamer(&name) {
            return decision;
        }

        let title = item.title.to_lowercase();
        for keyword in self.store.keywords.iter() {
            if title.contains(keyword) || name.contains(keyword) {
                return BlockDecision::block(BlockReason::Keyword, keyword);
            }
        }

        if let Some(decision) = self.match_category(&item.category) {
            return decision;
        }

        BlockDecision::allow()
    }

    /// Exact streamer-name membership.
    pub fn match_streamer(&self, name: &str) -> Option<BlockDecision> {
        let name = name.trim().to_lowercase();
        if self.streamers.contains(name.as_str()) {
            Some(BlockDecision::block(BlockReason::Streamer, name))
        } else {
            None
        }
    }

    /// First blocked category (in list order) matching `category`.
    pub fn match_category(&self, category: &str) -> Option<BlockDecision> {
        let normalized = normalize_category(category);
        self.categories
            .iter()
            .find(|(blocked, _)| is_normalized_category_match(&normalized, blocked))
            .map(|(_, display)| BlockDecision::block(BlockReason::Category, *display))
    }

    /// Verdict for the stream page the user is on.
    ///
    /// Blocked when the channel in the path is blocked by name, or when any
    /// category shown in the page's own metadata is blocked.
    pub fn evaluate_stream_page(
        &self,
        path_streamer: Option<&str>,
        page_categories: &[String],
    ) -> Option<BlockDecision> {
        if let Some(decision) = path_streamer.and_then(|name| self.match_streamer(name)) {
            return Some(decision);
        }
        page_categories
            .iter()
            .find_map(|category| self.match_category(category))
    }
}

/// One-shot evaluation of `item` against `store`.
pub fn evaluate<E>(item: &CandidateItem<E>, store: &FilterStore) -> BlockDecision {
    Matcher::new(store).evaluate(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListKind;

    fn store(streamers: &[&str], keywords: &[&str], categories: &[&str]) -> FilterStore {
        let mut store = FilterStore::new();
        for s in streamers {
            store.add(ListKind::Streamers, s);
        }
        for k in keywords {
            store.add(ListKind::Keywords, k);
        }
        for c in categories {
            store.add(ListKind::Categories, c);
        }
        store
    }

    #[test]
    fn test_streamer_beats_keyword() {
        let store = store(&["foo"], &["bar"], &[]);
        let item = CandidateItem::detached("foo", "bar stream", "").unwrap();
        let decision = evaluate(&item, &store);
        assert!(decision.blocked);
        assert_eq!(decision.reason, BlockReason::Streamer);
        assert_eq!(decision.matched_value, "foo");
    }

    #[test]
    fn test_streamer_match_is_case_insensitive() {
        let store = store(&["Foo"], &[], &[]);
        let item = CandidateItem { name: "FOO".into(), title: String::new(), category: String::new(), element: () };
        assert_eq!(evaluate(&item, &store).reason, BlockReason::Streamer);
    }

    #[test]
    fn test_keyword_in_title() {
        let store = store(&[], &["gambling"], &[]);
        let item = CandidateItem::detached("xyz", "24/7 gambling stream", "").unwrap();
        assert_eq!(evaluate(&item, &store), BlockDecision::block(BlockReason::Keyword, "gambling"));
    }

    #[test]
    fn test_keyword_in_name() {
        let store = store(&[], &["casino"], &[]);
        let item = CandidateItem::detached("casinoking", "hello", "").unwrap();
        assert_eq!(evaluate(&item, &store).matched_value, "casino");
    }

    #[test]
    fn test_first_keyword_in_list_order_wins() {
        let store = store(&[], &["stream", "gambling"], &[]);
        let item = CandidateItem::detached("xyz", "gambling stream", "").unwrap();
        assert_eq!(evaluate(&item, &store).matched_value, "stream");
    }

    #[test]
    fn test_keyword_beats_category() {
        let store = store(&[], &["slots"], &["Slots"]);
        let item = CandidateItem::detached("xyz", "big slots night", "Slots").unwrap();
        assert_eq!(evaluate(&item, &store).reason, BlockReason::Keyword);
    }

    #[test]
    fn test_category_fuzzy_match_reports_display_value() {
        let store = store(&[], &[], &["Minecraft", "Just Chatting"]);
        let item = CandidateItem::detached("xyz", "", "justchatting-24-7").unwrap();
        assert_eq!(evaluate(&item, &store), BlockDecision::block(BlockReason::Category, "Just Chatting"));
    }

    #[test]
    fn test_no_match() {
        let store = store(&["foo"], &["bar"], &["Fortnite"]);
        let item = CandidateItem::detached("baz", "chill", "Minecraft").unwrap();
        assert_eq!(evaluate(&item, &store), BlockDecision::allow());
    }

    #[test]
    fn test_blank_name_never_reaches_evaluation() {
        let store = store(&[], &["gambling"], &["Slots"]);
        let items: Vec<_> = [("", "24/7 gambling", "Slots"), ("xyz", "24/7 gambling", "")]
            .iter()
            .filter_map(|(name, title, category)| CandidateItem::detached(name, title, category))
            .collect();
        assert_eq!(items.len(), 1);
        assert_eq!(evaluate(&items[0], &store).matched_value, "gambling");
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let store = store(&["a"], &["b"], &["Slots"]);
        let matcher = Matcher::new(&store);
        let item = CandidateItem::detached("zed", "b-roll", "Slots").unwrap();
        assert_eq!(matcher.evaluate(&item), matcher.evaluate(&item));
    }

    #[test]
    fn test_stream_page_streamer_or_category() {
        let store = store(&["roshtein"], &[], &["Slots"]);
        let matcher = Matcher::new(&store);

        let by_name = matcher.evaluate_stream_page(Some("Roshtein"), &[]).unwrap();
        assert_eq!(by_name.reason, BlockReason::Streamer);

        let by_category = matcher
            .evaluate_stream_page(Some("someone"), &["Slots & Casino".to_string()])
            .unwrap();
        assert_eq!(by_category.reason, BlockReason::Category);

        assert!(matcher.evaluate_stream_page(Some("someone"), &["Chess".to_string()]).is_none());
        assert!(matcher.evaluate_stream_page(None, &[]).is_none());
    }
}
