//! Decision applier
//!
//! Puts block decisions on the page and takes them off again. Every change
//! is recorded on the element itself so that application is idempotent and
//! reversal restores the element exactly:
//!
//! - `data-sf-state` tracks `hiding` / `hidden` / `blurred`
//! - `data-sf-saved-style` keeps the inline style present before blocking

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::matcher::Matcher;
use crate::normalize::streamer_from_path;
use crate::page::{page_categories, Overlay, PageDocument, PageElement, PageWarning};
use crate::schedule::Scheduler;
use crate::types::{BlockDecision, Settings};

/// Fade-out before a hidden card leaves the layout.
pub const FADE_DELAY: Duration = Duration::from_millis(300);

/// Countdown before leaving a blocked stream page.
pub const REDIRECT_DELAY: Duration = Duration::from_millis(3000);

pub const STATE_ATTR: &str = "data-sf-state";
pub const SAVED_STYLE_ATTR: &str = "data-sf-saved-style";
pub const BLOCKED_ATTR: &str = "data-blocked";
pub const BLURRED_ATTR: &str = "data-blurred";
pub const REASON_ATTR: &str = "data-blocked-reason";
pub const OVERLAY_CLASS: &str = "sf-blocked-overlay";

// =============================================================================
// Block State
// =============================================================================

/// Visual state recorded on a blocked element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Fading out, display not yet suppressed
    Hiding,
    Hidden,
    Blurred,
}

impl BlockState {
    pub fn read<E: PageElement>(element: &E) -> Option<Self> {
        match element.attribute(STATE_ATTR)?.as_str() {
            "hiding" => Some(Self::Hiding),
            "hidden" => Some(Self::Hidden),
            "blurred" => Some(Self::Blurred),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Hiding => "hiding",
            Self::Hidden => "hidden",
            Self::Blurred => "blurred",
        }
    }

    fn is_blur(self) -> bool {
        self == Self::Blurred
    }
}

/// What [`DecisionApplier::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing to do
    Unchanged,
    /// Fade-out started, display suppressed after [`FADE_DELAY`]
    Hiding,
    Blurred,
    /// Already blocked in the right mode, reason label updated
    Retagged,
    Reverted,
}

// =============================================================================
// Decision Applier
// =============================================================================

pub struct DecisionApplier {
    scheduler: Rc<dyn Scheduler>,
    redirect_pending: Cell<bool>,
}

impl DecisionApplier {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            redirect_pending: Cell::new(false),
        }
    }

    /// Bring `element` in line with `decision`.
    pub fn apply<E: PageElement>(
        &self,
        element: &E,
        decision: &BlockDecision,
        settings: &Settings,
    ) -> ApplyOutcome {
        let state = BlockState::read(element);

        if !decision.blocked {
            return match state {
                Some(_) => {
                    self.revert(element);
                    ApplyOutcome::Reverted
                }
                None => ApplyOutcome::Unchanged,
            };
        }

        let label = decision.label();
        if let Some(state) = state {
            if state.is_blur() == settings.blur_mode {
                if element.attribute(REASON_ATTR).as_deref() == Some(label.as_str()) {
                    return ApplyOutcome::Unchanged;
                }
                element.set_attribute(REASON_ATTR, &label);
                if state.is_blur() {
                    element.remove_overlays(OVERLAY_CLASS);
                    element.append_overlay(&blocked_overlay(&label));
                }
                return ApplyOutcome::Retagged;
            }
            // Mode switched since this element was blocked.
            self.revert(element);
        }

        match element.attribute("style") {
            Some(style) => element.set_attribute(SAVED_STYLE_ATTR, &style),
            None => element.remove_attribute(SAVED_STYLE_ATTR),
        }

        if settings.blur_mode {
            self.blur(element, &label);
            ApplyOutcome::Blurred
        } else {
            self.hide(element, &label);
            ApplyOutcome::Hiding
        }
    }

    fn hide<E: PageElement>(&self, element: &E, label: &str) {
        element.set_style("transition", "all 0.3s ease");
        element.set_style("opacity", "0");
        element.set_style("transform", "translateY(-10px)");
        element.set_attribute(STATE_ATTR, BlockState::Hiding.as_str());
        element.set_attribute(REASON_ATTR, label);

        let element = element.clone();
        self.scheduler.schedule(
            FADE_DELAY,
            Box::new(move || {
                // Reverted or switched to blur while fading.
                if BlockState::read(&element) != Some(BlockState::Hiding) {
                    return;
                }
                element.set_style("display", "none");
                element.set_attribute(BLOCKED_ATTR, "true");
                element.set_attribute(STATE_ATTR, BlockState::Hidden.as_str());
            }),
        );
    }

    fn blur<E: PageElement>(&self, element: &E, label: &str) {
        element.set_style("filter", "blur(5px) grayscale(100%)");
        element.set_style("opacity", "0.3");
        element.set_style("pointer-events", "none");
        element.set_style("position", "relative");
        element.set_attribute(BLURRED_ATTR, "true");
        element.set_attribute(REASON_ATTR, label);
        element.set_attribute(STATE_ATTR, BlockState::Blurred.as_str());
        element.append_overlay(&blocked_overlay(label));
    }

    /// Undo every change a block made.
    pub fn revert<E: PageElement>(&self, element: &E) {
        match element.attribute(SAVED_STYLE_ATTR) {
            Some(style) => element.set_attribute("style", &style),
            None => element.remove_attribute("style"),
        }
        for attr in [SAVED_STYLE_ATTR, STATE_ATTR, BLOCKED_ATTR, BLURRED_ATTR, REASON_ATTR] {
            element.remove_attribute(attr);
        }
        element.remove_overlays(OVERLAY_CLASS);
    }

    pub fn redirect_pending(&self) -> bool {
        self.redirect_pending.get()
    }

    /// Leave the page when it is a blocked stream.
    ///
    /// A page is blocked when the channel in its path is blocked by name or
    /// when its own category metadata matches a blocked category. Shows a
    /// countdown warning and navigates home after [`REDIRECT_DELAY`];
    /// dismissing the warning does not cancel the navigation.
    pub fn check_and_redirect_stream_page<D: PageDocument>(
        &self,
        document: &D,
        matcher: &Matcher<'_>,
    ) -> Option<BlockDecision> {
        if self.redirect_pending.get() {
            return None;
        }

        let streamer = streamer_from_path(&document.location_path())?;
        let categories = page_categories(document);
        let decision = matcher.evaluate_stream_page(Some(&streamer), &categories)?;

        log::info!("Leaving blocked stream page '{}' ({})", streamer, decision.label());
        document.show_page_warning(&PageWarning {
            title: "This stream is blocked".to_string(),
            reason: decision.label(),
            countdown_secs: REDIRECT_DELAY.as_secs() as u32,
            home_url: crate::HOME_URL.to_string(),
        });

        self.redirect_pending.set(true);
        let document = document.clone();
        self.scheduler.schedule(
            REDIRECT_DELAY,
            Box::new(move || document.navigate(crate::HOME_URL)),
        );

        Some(decision)
    }
}

fn blocked_overlay(label: &str) -> Overlay {
    Overlay {
        class_name: OVERLAY_CLASS,
        icon: "🚫",
        title: "Blocked",
        detail: label.to_string(),
    }
}
