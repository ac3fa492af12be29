//! Propagation protocol
//!
//! Three independent single-threaded processes keep one logical filter
//! state consistent:
//!
//! - [`ConfigPanel`] mutates the store, saves it, and messages the active
//!   target-site tab directly.
//! - [`BackgroundService`] relays every storage change (changed fields only)
//!   to all target-site tabs and pushes the full state once when a tab
//!   finishes loading.
//! - [`ContentFilter`] merges incoming updates, clears its processed set and
//!   re-scans the page.
//!
//! Delivery is at-most-once and unordered; a tab without a listening content
//! instance is the normal state of affairs, not an error.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::apply::{BlockState, DecisionApplier};
use crate::backup::{import_into, ExportDocument, ImportError};
use crate::catalog::{Category, CategoryCatalog};
use crate::matcher::Matcher;
use crate::normalize::{is_target_url, last_path_segment, normalize_entry};
use crate::notify::{notify, Notifier, ToastKind};
use crate::page::{PageDocument, PageElement, PageScanner, ScanReport, QUICK_BLOCK_TARGET_SELECTOR};
use crate::schedule::{Debouncer, Scheduler, Subscription};
use crate::storage::{StorageBackend, StorageChanges, StorageEntries, INSTALL_DATE_KEY, VERSION_KEY};
use crate::store::{FilterStore, FilterUpdate};
use crate::types::{FieldMask, ListKind};

/// Delay coalescing bursts of structural mutations into one scan.
pub const MUTATION_DEBOUNCE: Duration = Duration::from_millis(100);

/// Delay before a hovered card gets its quick-block button.
pub const HOVER_DEBOUNCE: Duration = Duration::from_millis(150);

// =============================================================================
// Messages
// =============================================================================

/// Messages exchanged between the extension processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum FilterMessage {
    /// Replace the listed fields of the receiver's store
    UpdateFilters(FilterUpdate),
    /// Ask the background for list sizes
    GetStats,
    /// Ask the background to wipe storage
    ClearAllData,
}

/// List sizes reported by `getStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStats {
    pub total_blocked: usize,
    pub streamers_blocked: usize,
    pub keywords_blocked: usize,
    pub categories_blocked: usize,
}

impl ExtensionStats {
    pub fn of(store: &FilterStore) -> Self {
        Self {
            total_blocked: store.total_entries(),
            streamers_blocked: store.streamers.len(),
            keywords_blocked: store.keywords.len(),
            categories_blocked: store.categories.len(),
        }
    }
}

/// Reply to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(untagged)]
pub enum MessageResponse {
    Ack { success: bool },
    Stats(ExtensionStats),
}

/// A browser tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i32,
    pub url: String,
}

impl TabInfo {
    pub fn is_target(&self) -> bool {
        is_target_url(&self.url)
    }
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("No receiver in tab {0}")]
    NoReceiver(i32),
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Host message transport.
pub trait MessageTransport {
    fn send_to_tab(&self, tab_id: i32, message: &FilterMessage) -> Result<(), DeliveryError>;
}

/// Best-effort send. Failures are expected (no content instance yet) and
/// only logged at debug level.
pub fn deliver(transport: &dyn MessageTransport, tab_id: i32, message: &FilterMessage) -> bool {
    match transport.send_to_tab(tab_id, message) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("Dropped message to tab {}: {}", tab_id, e);
            false
        }
    }
}

// =============================================================================
// Background Service
// =============================================================================

/// Why the extension lifecycle hook ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update { previous_version: Option<String> },
}

/// Compare dotted version strings numerically; missing parts count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> { v.split('.').map(|part| part.trim().parse::<u64>().unwrap_or(0)).collect() };
    let (a, b) = (parse(a), parse(b));
    for i in 0..a.len().max(b.len()) {
        let ord = a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// The background worker.
pub struct BackgroundService<S, T, N> {
    storage: S,
    transport: T,
    notifier: N,
}

impl<S: StorageBackend, T: MessageTransport, N: Notifier> BackgroundService<S, T, N> {
    pub fn new(storage: S, transport: T, notifier: N) -> Self {
        Self {
            storage,
            transport,
            notifier,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Install/update hook. `now` is the RFC 3339 install timestamp.
    pub fn on_installed(&mut self, reason: &InstallReason, now: &str) {
        match reason {
            InstallReason::Install => {
                let mut entries = FilterStore::new().to_entries(FieldMask::ALL);
                entries.insert(INSTALL_DATE_KEY.to_string(), now.into());
                entries.insert(VERSION_KEY.to_string(), crate::SCHEMA_VERSION.into());
                match self.storage.set(entries) {
                    Ok(()) => log::info!("Installed with empty filter lists"),
                    Err(e) => log::warn!("Failed to write defaults: {}", e),
                }
            }
            InstallReason::Update { previous_version } => {
                log::info!(
                    "Updated from {} to {}",
                    previous_version.as_deref().unwrap_or("unknown"),
                    crate::SCHEMA_VERSION
                );
                self.migrate(previous_version.as_deref());
            }
        }
    }

    /// Bring data written by an older version in line with the current
    /// invariants (normalized, duplicate-free lists).
    fn migrate(&mut self, previous_version: Option<&str>) {
        let outdated = previous_version
            .map(|v| compare_versions(v, crate::SCHEMA_VERSION) == Ordering::Less)
            .unwrap_or(true);
        if !outdated {
            return;
        }
        let store = match FilterStore::load(&self.storage) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Migration skipped: {}", e);
                return;
            }
        };
        let mut entries = store.to_entries(FieldMask::ALL);
        entries.insert(VERSION_KEY.to_string(), crate::SCHEMA_VERSION.into());
        match self.storage.set(entries) {
            Ok(()) => log::info!("Migrated stored filters"),
            Err(e) => log::warn!("Migration write failed: {}", e),
        }
    }

    /// Relay a storage write to every target-site tab. Returns how many
    /// deliveries succeeded.
    pub fn on_storage_changed(&self, changes: &StorageChanges, tabs: &[TabInfo]) -> usize {
        for (key, change) in changes {
            log::debug!("Storage change {}: {:?} -> {:?}", key, change.old_value, change.new_value);
        }

        let update = FilterUpdate::from_changes(changes);
        if update.is_empty() {
            return 0;
        }
        let message = FilterMessage::UpdateFilters(update);
        tabs.iter()
            .filter(|tab| tab.is_target())
            .filter(|tab| deliver(&self.transport, tab.id, &message))
            .count()
    }

    /// Cold-start sync: push the full state once a target-site tab finished
    /// loading.
    pub fn on_tab_updated(&self, tab: &TabInfo, load_complete: bool) -> bool {
        if !load_complete || !tab.is_target() {
            return false;
        }
        let store = match FilterStore::load(&self.storage) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Cold-start sync skipped for tab {}: {}", tab.id, e);
                return false;
            }
        };
        deliver(&self.transport, tab.id, &FilterMessage::UpdateFilters(FilterUpdate::full(&store)))
    }

    /// Context-menu quick block of a channel link. Returns the blocked name,
    /// or `None` if the link has no name or it was already blocked.
    pub fn quick_block_from_link(&mut self, link_url: &str) -> Option<String> {
        let name = last_path_segment(link_url)?;
        let mut store = FilterStore::load_or_default(&self.storage);
        if !store.add(ListKind::Streamers, &name) {
            return None;
        }
        if let Err(e) = self.storage.set(store.to_entries(FieldMask::STREAMERS)) {
            log::warn!("Quick block of '{}' not saved: {}", name, e);
            return None;
        }
        notify(&self.notifier, &store.settings, &format!("{} blocked!", name), ToastKind::Success);
        Some(name)
    }

    pub fn stats(&self) -> ExtensionStats {
        ExtensionStats::of(&FilterStore::load_or_default(&self.storage))
    }

    pub fn clear_all_data(&mut self) -> bool {
        match self.storage.clear() {
            Ok(()) => {
                log::info!("All data cleared");
                true
            }
            Err(e) => {
                log::warn!("Clearing data failed: {}", e);
                false
            }
        }
    }

    /// Answer a runtime message addressed to the background.
    pub fn handle_message(&mut self, message: &FilterMessage) -> Option<MessageResponse> {
        match message {
            FilterMessage::GetStats => Some(MessageResponse::Stats(self.stats())),
            FilterMessage::ClearAllData => Some(MessageResponse::Ack {
                success: self.clear_all_data(),
            }),
            FilterMessage::UpdateFilters(_) => None,
        }
    }
}

// =============================================================================
// Content Filter
// =============================================================================

/// Shared handle to a content instance; timers and DOM callbacks hold weak
/// references to it.
pub type ContentHandle<D> = Rc<RefCell<ContentFilter<D>>>;

/// The per-tab content instance.
pub struct ContentFilter<D: PageDocument> {
    document: D,
    scheduler: Rc<dyn Scheduler>,
    storage: Box<dyn StorageBackend>,
    notifier: Box<dyn Notifier>,
    store: FilterStore,
    scanner: PageScanner,
    applier: DecisionApplier,
    mutations: Debouncer,
    hover: Debouncer,
    hovered: Option<D::Element>,
    subscription: Option<Subscription>,
}

impl<D: PageDocument> ContentFilter<D> {
    /// Build an instance, loading the store (empty if storage is unreadable).
    pub fn new(
        document: D,
        scheduler: Rc<dyn Scheduler>,
        storage: Box<dyn StorageBackend>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let store = FilterStore::load_or_default(storage.as_ref());
        Self {
            document,
            applier: DecisionApplier::new(Rc::clone(&scheduler)),
            scheduler,
            storage,
            notifier,
            store,
            scanner: PageScanner::default(),
            mutations: Debouncer::new(MUTATION_DEBOUNCE),
            hover: Debouncer::new(HOVER_DEBOUNCE),
            hovered: None,
            subscription: None,
        }
    }

    /// Wrap in a handle, subscribe to structural changes and run the first
    /// scan.
    pub fn start(self) -> ContentHandle<D> {
        let handle = Rc::new(RefCell::new(self));
        let weak = Rc::downgrade(&handle);
        let subscription = handle
            .borrow()
            .document
            .observe_structural_changes(Box::new(move |added| {
                if added == 0 {
                    return;
                }
                if let Some(handle) = weak.upgrade() {
                    Self::request_rescan(&handle);
                }
            }));
        {
            let mut filter = handle.borrow_mut();
            filter.subscription = Some(subscription);
            filter.scan();
        }
        handle
    }

    /// Stop watching the document.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    pub fn store(&self) -> &FilterStore {
        &self.store
    }

    pub fn scanner(&self) -> &PageScanner {
        &self.scanner
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// One scan pass plus the stream-page redirect check.
    pub fn scan(&mut self) -> ScanReport {
        let matcher = Matcher::new(&self.store);
        let report = self
            .scanner
            .scan(&self.document, &matcher, &self.applier, &self.store.settings);
        self.applier.check_and_redirect_stream_page(&self.document, &matcher);
        report
    }

    /// Merge an update, start a new epoch and re-scan everything.
    pub fn apply_update(&mut self, update: &FilterUpdate) -> ScanReport {
        let fields = self.store.merge(update);
        log::debug!("Filters updated: {:?}", fields);
        self.rescan_all()
    }

    /// Forget previous evaluations and scan the whole page again.
    pub fn rescan_all(&mut self) -> ScanReport {
        self.scanner.invalidate();
        self.scan()
    }

    /// Handle a runtime message addressed to this tab.
    pub fn handle_message(&mut self, message: &FilterMessage) -> Option<MessageResponse> {
        match message {
            FilterMessage::UpdateFilters(update) => {
                self.apply_update(update);
                Some(MessageResponse::Ack { success: true })
            }
            FilterMessage::GetStats | FilterMessage::ClearAllData => None,
        }
    }

    /// A structural change was observed; scan once the burst settles.
    pub fn request_rescan(handle: &ContentHandle<D>) {
        let (delay, scheduler) = {
            let mut filter = handle.borrow_mut();
            (filter.mutations.request(), Rc::clone(&filter.scheduler))
        };
        let Some(delay) = delay else { return };

        let weak: Weak<RefCell<Self>> = Rc::downgrade(handle);
        scheduler.schedule(
            delay,
            Box::new(move || {
                let Some(handle) = weak.upgrade() else { return };
                let mut filter = handle.borrow_mut();
                if filter.mutations.fire() > 0 {
                    filter.scan();
                }
            }),
        );
    }

    /// The pointer entered `element`. After the hover settles, a candidate
    /// that is not blocked gets a quick-block button.
    pub fn on_hover(handle: &ContentHandle<D>, element: D::Element) {
        let (delay, scheduler) = {
            let mut filter = handle.borrow_mut();
            filter.hovered = Some(element);
            (filter.hover.request(), Rc::clone(&filter.scheduler))
        };
        let Some(delay) = delay else { return };

        let weak = Rc::downgrade(handle);
        scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(handle) = weak.upgrade() {
                    Self::show_quick_block(&handle);
                }
            }),
        );
    }

    /// The pointer left the hovered element: drop any pending button and
    /// take down the visible one.
    pub fn on_hover_end(&mut self) {
        self.hover.cancel();
        self.hovered = None;
        self.document.remove_quick_block_buttons();
    }

    fn show_quick_block(handle: &ContentHandle<D>) {
        let (element, name) = {
            let mut filter = handle.borrow_mut();
            if filter.hover.fire() == 0 {
                return;
            }
            let Some(element) = filter.hovered.take() else { return };
            if BlockState::read(&element).is_some() {
                return;
            }
            let Some(item) = filter.scanner.extractor().extract(&element) else { return };
            filter.document.remove_quick_block_buttons();
            (element, item.name)
        };

        let weak = Rc::downgrade(handle);
        let tooltip = format!("Block {}", name);
        element.show_quick_block_button(
            &tooltip,
            Box::new(move || {
                if let Some(handle) = weak.upgrade() {
                    let mut filter = handle.borrow_mut();
                    filter.quick_block_streamer(&name);
                    filter.document.remove_quick_block_buttons();
                }
            }),
        );
    }

    /// Hover-target selector the host should listen on.
    pub fn quick_block_target_selector() -> &'static str {
        QUICK_BLOCK_TARGET_SELECTOR
    }

    /// Block `name` from the page itself. Reads the stored list first so a
    /// concurrent panel edit is not overwritten.
    pub fn quick_block_streamer(&mut self, name: &str) -> bool {
        let mut latest = match FilterStore::load(self.storage.as_ref()) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Quick block aborted: {}", e);
                return false;
            }
        };
        if !latest.add(ListKind::Streamers, name) {
            return false;
        }
        if let Err(e) = self.storage.set(latest.to_entries(FieldMask::STREAMERS)) {
            log::warn!("Quick block of '{}' not saved: {}", name, e);
            return false;
        }

        self.store.streamers = latest.streamers;
        self.rescan_all();

        let message = format!("{} blocked! 🚫", normalize_entry(name));
        notify(self.notifier.as_ref(), &self.store.settings, &message, ToastKind::Success);
        true
    }
}

// =============================================================================
// Configuration Panel
// =============================================================================

/// The configuration panel.
///
/// Every mutation saves, then messages the active target-site tab directly.
/// That runs in parallel to the background relay for lower latency; the
/// content side merges idempotently, so receiving both is harmless.
pub struct ConfigPanel<S, T, N> {
    storage: S,
    transport: T,
    notifier: N,
    store: FilterStore,
    catalog: CategoryCatalog,
    active_tab: Option<TabInfo>,
}

impl<S: StorageBackend, T: MessageTransport, N: Notifier> ConfigPanel<S, T, N> {
    pub fn new(storage: S, transport: T, notifier: N) -> Self {
        let store = FilterStore::load_or_default(&storage);
        Self {
            storage,
            transport,
            notifier,
            store,
            catalog: CategoryCatalog::fallback(),
            active_tab: None,
        }
    }

    pub fn store(&self) -> &FilterStore {
        &self.store
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn set_active_tab(&mut self, tab: Option<TabInfo>) {
        self.active_tab = tab;
    }

    /// Total entries across the three lists.
    pub fn blocked_count(&self) -> usize {
        self.store.total_entries()
    }

    fn toast(&self, message: &str, kind: ToastKind) {
        notify(&self.notifier, &self.store.settings, message, kind);
    }

    /// Pick up writes other processes made since the panel loaded, such as a
    /// context-menu quick block. Keeps the current state if storage is
    /// unreadable.
    fn refresh(&mut self) {
        match FilterStore::load(&self.storage) {
            Ok(latest) => self.store = latest,
            Err(e) => log::debug!("Panel refresh skipped: {}", e),
        }
    }

    /// Save `fields`, then push the full state to the active target-site tab.
    fn commit(&mut self, fields: FieldMask) {
        if let Err(e) = self.storage.set(self.store.to_entries(fields)) {
            log::warn!("Saving filters failed: {}", e);
        }
        self.notify_content();
    }

    fn notify_content(&self) -> bool {
        match &self.active_tab {
            Some(tab) if tab.is_target() => deliver(
                &self.transport,
                tab.id,
                &FilterMessage::UpdateFilters(FilterUpdate::full(&self.store)),
            ),
            _ => false,
        }
    }

    pub fn add_streamer(&mut self, input: &str) -> bool {
        self.refresh();
        let name = normalize_entry(input);
        if name.is_empty() {
            self.toast("Streamer name cannot be empty!", ToastKind::Error);
            return false;
        }
        if !self.store.add(ListKind::Streamers, &name) {
            self.toast("This streamer is already blocked!", ToastKind::Warning);
            return false;
        }
        self.commit(FieldMask::STREAMERS);
        self.toast(&format!("{} sent to the void! 👋", name), ToastKind::Success);
        true
    }

    pub fn remove_streamer(&mut self, name: &str) -> bool {
        self.refresh();
        if !self.store.remove(ListKind::Streamers, name) {
            return false;
        }
        self.commit(FieldMask::STREAMERS);
        self.toast(&format!("{} forgiven! 🎉", normalize_entry(name)), ToastKind::Info);
        true
    }

    pub fn add_keyword(&mut self, input: &str) -> bool {
        self.refresh();
        let keyword = normalize_entry(input);
        if keyword.is_empty() {
            self.toast("Keyword cannot be empty!", ToastKind::Error);
            return false;
        }
        if !self.store.add(ListKind::Keywords, &keyword) {
            self.toast("This keyword is already blocked!", ToastKind::Warning);
            return false;
        }
        self.commit(FieldMask::KEYWORDS);
        self.toast(&format!("\"{}\" blocked! 🚫", keyword), ToastKind::Success);
        true
    }

    pub fn remove_keyword(&mut self, keyword: &str) -> bool {
        self.refresh();
        if !self.store.remove(ListKind::Keywords, keyword) {
            return false;
        }
        self.commit(FieldMask::KEYWORDS);
        self.toast(&format!("\"{}\" removed! ✅", normalize_entry(keyword)), ToastKind::Info);
        true
    }

    pub fn select_category(&mut self, name: &str) -> bool {
        self.refresh();
        if !self.store.add(ListKind::Categories, name) {
            self.toast("This category is already blocked!", ToastKind::Warning);
            return false;
        }
        self.commit(FieldMask::CATEGORIES);
        self.toast(&format!("{} category blocked! 📂", name.trim()), ToastKind::Success);
        true
    }

    pub fn remove_category(&mut self, name: &str) -> bool {
        self.refresh();
        if !self.store.remove(ListKind::Categories, name) {
            return false;
        }
        self.commit(FieldMask::CATEGORIES);
        self.toast(&format!("{} category removed! ✅", name.trim()), ToastKind::Info);
        true
    }

    /// Checkbox-style category toggle.
    pub fn toggle_category(&mut self, name: &str, enabled: bool) -> bool {
        self.refresh();
        let changed = if enabled {
            self.store.add(ListKind::Categories, name)
        } else {
            self.store.remove(ListKind::Categories, name)
        };
        if !changed {
            return false;
        }
        self.commit(FieldMask::CATEGORIES);
        let action = if enabled { "blocked" } else { "removed" };
        self.toast(&format!("{} category {}! 📂", name.trim(), action), ToastKind::Info);
        true
    }

    pub fn set_silent_mode(&mut self, enabled: bool) {
        self.refresh();
        self.store.settings.silent_mode = enabled;
        self.commit(FieldMask::SETTINGS);
    }

    pub fn set_blur_mode(&mut self, enabled: bool) {
        self.refresh();
        self.store.settings.blur_mode = enabled;
        self.commit(FieldMask::SETTINGS);
    }

    /// Backup document for download.
    pub fn export(&self, exported_at: &str) -> ExportDocument {
        let document = ExportDocument::new(&self.store, exported_at);
        self.toast("Data exported! 📤", ToastKind::Success);
        document
    }

    /// Import a backup. A malformed document leaves the store untouched and
    /// shows an error toast.
    pub fn import(&mut self, text: &str) -> Result<FieldMask, ImportError> {
        self.refresh();
        match import_into(&mut self.store, text) {
            Ok(fields) => {
                self.commit(fields);
                self.toast("Data imported! 📥", ToastKind::Success);
                Ok(fields)
            }
            Err(e) => {
                log::warn!("Import rejected: {}", e);
                self.toast("Could not import that file!", ToastKind::Error);
                Err(e)
            }
        }
    }

    /// Install a fetched catalog, or the fallback list if the fetch failed.
    pub fn load_catalog<E: std::fmt::Display>(&mut self, fetched: Result<String, E>) {
        self.catalog = CategoryCatalog::from_fetch(fetched);
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Catalog search results, each flagged when already blocked.
    pub fn search_categories(&self, query: &str) -> Vec<(&Category, bool)> {
        self.catalog
            .search(query)
            .into_iter()
            .map(|category| (category, self.store.categories.contains(&category.name)))
            .collect()
    }

    /// Raw entries the panel would write, for hosts that persist themselves.
    pub fn entries(&self) -> StorageEntries {
        self.store.to_entries(FieldMask::ALL)
    }
}
