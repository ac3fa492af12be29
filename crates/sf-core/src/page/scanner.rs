//! Page scanner
//!
//! One pass enumerates stream cards and list-container items, skips elements
//! already evaluated in the current epoch, evaluates the rest and hands the
//! decisions to the applier.

use std::collections::HashSet;

use crate::apply::{ApplyOutcome, DecisionApplier};
use crate::matcher::Matcher;
use crate::page::extract::{Extractor, LIST_CONTAINER_SELECTORS, LIST_ITEM_SELECTOR, STREAM_CARD_SELECTORS};
use crate::page::{PageDocument, PageElement};
use crate::types::{ElementId, Settings};

// =============================================================================
// Processed Set
// =============================================================================

/// Element identities evaluated in the current epoch.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    ids: HashSet<ElementId>,
    epoch: u64,
}

impl ProcessedSet {
    pub fn contains(&self, id: ElementId) -> bool {
        self.ids.contains(&id)
    }

    /// Returns false if already present.
    pub fn insert(&mut self, id: ElementId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Drop every entry and start a new epoch.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.epoch += 1;
    }
}

// =============================================================================
// Scan Report
// =============================================================================

/// Counters of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Elements evaluated this pass
    pub evaluated: usize,
    /// Elements skipped because already processed this epoch
    pub skipped: usize,
    /// Elements with no derivable name
    pub not_candidates: usize,
    /// Elements newly blocked or re-tagged
    pub blocked: usize,
    /// Elements whose block was reverted
    pub reverted: usize,
}

// =============================================================================
// Page Scanner
// =============================================================================

#[derive(Debug, Default)]
pub struct PageScanner {
    extractor: Extractor,
    processed: ProcessedSet,
}

impl PageScanner {
    pub fn new(extractor: Extractor) -> Self {
        Self {
            extractor,
            processed: ProcessedSet::default(),
        }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Forget every evaluation; the next pass re-evaluates everything.
    pub fn invalidate(&mut self) {
        self.processed.clear();
    }

    /// Run one pass over the document.
    pub fn scan<D: PageDocument>(
        &mut self,
        document: &D,
        matcher: &Matcher<'_>,
        applier: &DecisionApplier,
        settings: &Settings,
    ) -> ScanReport {
        let mut report = ScanReport::default();

        for selector in STREAM_CARD_SELECTORS {
            for element in document.query_selector_all(selector) {
                self.process(&element, matcher, applier, settings, &mut report);
            }
        }

        for selector in LIST_CONTAINER_SELECTORS {
            for container in document.query_selector_all(selector) {
                for element in container.query_selector_all(LIST_ITEM_SELECTOR) {
                    self.process(&element, matcher, applier, settings, &mut report);
                }
            }
        }

        if report.blocked > 0 || report.reverted > 0 {
            log::debug!(
                "Scan epoch {}: {} evaluated, {} blocked, {} reverted",
                self.processed.epoch(),
                report.evaluated,
                report.blocked,
                report.reverted
            );
        }

        report
    }

    fn process<E: PageElement>(
        &mut self,
        element: &E,
        matcher: &Matcher<'_>,
        applier: &DecisionApplier,
        settings: &Settings,
        report: &mut ScanReport,
    ) {
        let id = element.identity();
        if self.processed.contains(id) {
            report.skipped += 1;
            return;
        }

        let item = match self.extractor.extract(element) {
            Some(item) => item,
            None => {
                report.not_candidates += 1;
                return;
            }
        };

        let decision = matcher.evaluate(&item);
        match applier.apply(&item.element, &decision, settings) {
            ApplyOutcome::Hiding | ApplyOutcome::Blurred | ApplyOutcome::Retagged => report.blocked += 1,
            ApplyOutcome::Reverted => report.reverted += 1,
            ApplyOutcome::Unchanged => {}
        }
        report.evaluated += 1;
        self.processed.insert(id);
    }
}
