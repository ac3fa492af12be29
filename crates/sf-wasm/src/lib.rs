//! WebAssembly bindings for StreamFilter
//!
//! Each extension process instantiates one wrapper: `ContentScript` per tab,
//! `BackgroundWorker` in the service worker, `ConfigPanel` in the popup. The
//! JS glue supplies the initial storage snapshot and the host callbacks.

mod bridge;
mod dom;

use std::rc::Rc;

use js_sys::Function;
use serde_json::json;
use sf_core::schedule::Scheduler;
use sf_core::storage::StorageEntries;
use sf_core::sync::{
    BackgroundService, ConfigPanel, ContentFilter, ContentHandle, FilterMessage, InstallReason, TabInfo,
};
use sf_core::{CandidateItem, FilterStore, Matcher};
use wasm_bindgen::prelude::*;

pub use bridge::{from_js, storage_changes_from_js, to_js, JsNotifier, JsStorage, JsTransport};
pub use dom::{DomDocument, DomElement, TimeoutScheduler};

fn entries_from_js(value: &JsValue) -> Result<StorageEntries, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(StorageEntries::new());
    }
    from_js(value)
}

fn response_to_js<T: serde::Serialize>(response: Option<T>) -> Result<JsValue, JsValue> {
    match response {
        Some(response) => to_js(&response),
        None => Ok(JsValue::UNDEFINED),
    }
}

#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: &str) {
    let level = level.parse().unwrap_or(log::LevelFilter::Info);
    bridge::init_console_logger(level);
}

#[wasm_bindgen(js_name = schemaVersion)]
pub fn schema_version() -> String {
    sf_core::SCHEMA_VERSION.to_string()
}

/// Evaluate one item against storage-shaped filters. `null` when the name is
/// blank, since such an item is not a candidate.
#[wasm_bindgen(js_name = evaluateItem)]
pub fn evaluate_item(name: &str, title: &str, category: &str, filters: JsValue) -> Result<JsValue, JsValue> {
    let Some(item) = CandidateItem::detached(name, title, category) else {
        return Ok(JsValue::NULL);
    };
    let store = FilterStore::from_entries(&entries_from_js(&filters)?);
    to_js(&Matcher::new(&store).evaluate(&item))
}

#[wasm_bindgen(js_name = isCategoryMatch)]
pub fn is_category_match(item_category: &str, blocked_category: &str) -> bool {
    sf_core::is_category_match(item_category, blocked_category)
}

#[wasm_bindgen(js_name = normalizeCategory)]
pub fn normalize_category(category: &str) -> String {
    sf_core::normalize_category(category)
}

// =============================================================================
// Content Script
// =============================================================================

#[wasm_bindgen]
pub struct ContentScript {
    handle: ContentHandle<DomDocument>,
    storage: JsStorage,
}

#[wasm_bindgen]
impl ContentScript {
    /// Load filters, start observing the page and run the first scan.
    #[wasm_bindgen(constructor)]
    pub fn new(entries: JsValue, persist: Function, notify: Function) -> Result<ContentScript, JsValue> {
        let document = DomDocument::current()?;
        let storage = JsStorage::new(entries_from_js(&entries)?, persist);
        let scheduler: Rc<dyn Scheduler> = Rc::new(TimeoutScheduler::new(document.window()));
        let filter = ContentFilter::new(
            document,
            scheduler,
            Box::new(storage.clone()),
            Box::new(JsNotifier::new(notify)),
        );
        log::info!("Content filter started");
        Ok(Self {
            handle: filter.start(),
            storage,
        })
    }

    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> Result<JsValue, JsValue> {
        let message: FilterMessage = from_js(&message)?;
        let response = self.handle.borrow_mut().handle_message(&message);
        response_to_js(response)
    }

    /// Keep the local storage cache current with writes from other processes.
    #[wasm_bindgen(js_name = onStorageChanged)]
    pub fn on_storage_changed(&self, changes: JsValue) -> Result<(), JsValue> {
        self.storage.absorb(&storage_changes_from_js(&changes)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = onHover)]
    pub fn on_hover(&self, element: web_sys::Element) {
        ContentFilter::on_hover(&self.handle, DomElement(element));
    }

    #[wasm_bindgen(js_name = onHoverEnd)]
    pub fn on_hover_end(&self) {
        self.handle.borrow_mut().on_hover_end();
    }

    #[wasm_bindgen(js_name = quickBlockTargetSelector)]
    pub fn quick_block_target_selector() -> String {
        ContentFilter::<DomDocument>::quick_block_target_selector().to_string()
    }

    /// Full re-evaluation. Returns how many elements were blocked.
    pub fn rescan(&self) -> u32 {
        self.handle.borrow_mut().rescan_all().blocked as u32
    }

    pub fn stop(&self) {
        self.handle.borrow_mut().stop();
    }
}

// =============================================================================
// Background Worker
// =============================================================================

#[wasm_bindgen]
pub struct BackgroundWorker {
    service: BackgroundService<JsStorage, JsTransport, JsNotifier>,
}

#[wasm_bindgen]
impl BackgroundWorker {
    #[wasm_bindgen(constructor)]
    pub fn new(entries: JsValue, persist: Function, send: Function, notify: Function) -> Result<BackgroundWorker, JsValue> {
        let storage = JsStorage::new(entries_from_js(&entries)?, persist);
        Ok(Self {
            service: BackgroundService::new(storage, JsTransport::new(send), JsNotifier::new(notify)),
        })
    }

    /// `reason` is `"install"` or `"update"`; `now` an ISO timestamp.
    #[wasm_bindgen(js_name = onInstalled)]
    pub fn on_installed(&mut self, reason: &str, previous_version: Option<String>, now: &str) {
        let reason = match reason {
            "install" => InstallReason::Install,
            "update" => InstallReason::Update { previous_version },
            other => {
                log::debug!("Ignoring install reason '{}'", other);
                return;
            }
        };
        self.service.on_installed(&reason, now);
    }

    /// Relay a storage change to `tabs` (`[{id, url}]`). Returns the number
    /// of deliveries.
    #[wasm_bindgen(js_name = onStorageChanged)]
    pub fn on_storage_changed(&self, changes: JsValue, tabs: JsValue) -> Result<u32, JsValue> {
        let changes = storage_changes_from_js(&changes)?;
        self.service.storage().absorb(&changes);
        let tabs: Vec<TabInfo> = from_js(&tabs)?;
        Ok(self.service.on_storage_changed(&changes, &tabs) as u32)
    }

    #[wasm_bindgen(js_name = onTabUpdated)]
    pub fn on_tab_updated(&self, tab_id: i32, url: &str, load_complete: bool) -> bool {
        let tab = TabInfo {
            id: tab_id,
            url: url.to_string(),
        };
        self.service.on_tab_updated(&tab, load_complete)
    }

    #[wasm_bindgen(js_name = quickBlockFromLink)]
    pub fn quick_block_from_link(&mut self, link_url: &str) -> Option<String> {
        self.service.quick_block_from_link(link_url)
    }

    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&mut self, message: JsValue) -> Result<JsValue, JsValue> {
        let message: FilterMessage = from_js(&message)?;
        response_to_js(self.service.handle_message(&message))
    }
}

// =============================================================================
// Configuration Panel
// =============================================================================

#[wasm_bindgen(js_name = ConfigPanel)]
pub struct PanelHandle {
    panel: ConfigPanel<JsStorage, JsTransport, JsNotifier>,
    storage: JsStorage,
}

#[wasm_bindgen(js_class = ConfigPanel)]
impl PanelHandle {
    #[wasm_bindgen(constructor)]
    pub fn new(entries: JsValue, persist: Function, send: Function, notify: Function) -> Result<PanelHandle, JsValue> {
        let storage = JsStorage::new(entries_from_js(&entries)?, persist);
        Ok(Self {
            panel: ConfigPanel::new(storage.clone(), JsTransport::new(send), JsNotifier::new(notify)),
            storage,
        })
    }

    /// Keep the cache current so the next edit starts from the latest lists.
    #[wasm_bindgen(js_name = onStorageChanged)]
    pub fn on_storage_changed(&self, changes: JsValue) -> Result<(), JsValue> {
        self.storage.absorb(&storage_changes_from_js(&changes)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = setActiveTab)]
    pub fn set_active_tab(&mut self, tab_id: Option<i32>, url: Option<String>) {
        let tab = match (tab_id, url) {
            (Some(id), Some(url)) => Some(TabInfo { id, url }),
            _ => None,
        };
        self.panel.set_active_tab(tab);
    }

    /// Current filters, storage-shaped, for rendering.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.panel.entries())
    }

    #[wasm_bindgen(js_name = blockedCount)]
    pub fn blocked_count(&self) -> u32 {
        self.panel.blocked_count() as u32
    }

    #[wasm_bindgen(js_name = addStreamer)]
    pub fn add_streamer(&mut self, name: &str) -> bool {
        self.panel.add_streamer(name)
    }

    #[wasm_bindgen(js_name = removeStreamer)]
    pub fn remove_streamer(&mut self, name: &str) -> bool {
        self.panel.remove_streamer(name)
    }

    #[wasm_bindgen(js_name = addKeyword)]
    pub fn add_keyword(&mut self, keyword: &str) -> bool {
        self.panel.add_keyword(keyword)
    }

    #[wasm_bindgen(js_name = removeKeyword)]
    pub fn remove_keyword(&mut self, keyword: &str) -> bool {
        self.panel.remove_keyword(keyword)
    }

    #[wasm_bindgen(js_name = selectCategory)]
    pub fn select_category(&mut self, name: &str) -> bool {
        self.panel.select_category(name)
    }

    #[wasm_bindgen(js_name = removeCategory)]
    pub fn remove_category(&mut self, name: &str) -> bool {
        self.panel.remove_category(name)
    }

    #[wasm_bindgen(js_name = toggleCategory)]
    pub fn toggle_category(&mut self, name: &str, enabled: bool) -> bool {
        self.panel.toggle_category(name, enabled)
    }

    #[wasm_bindgen(js_name = setSilentMode)]
    pub fn set_silent_mode(&mut self, enabled: bool) {
        self.panel.set_silent_mode(enabled);
    }

    #[wasm_bindgen(js_name = setBlurMode)]
    pub fn set_blur_mode(&mut self, enabled: bool) {
        self.panel.set_blur_mode(enabled);
    }

    /// Returns `{fileName, contents}` for the download.
    #[wasm_bindgen(js_name = exportData)]
    pub fn export_data(&self, now: &str) -> Result<JsValue, JsValue> {
        let document = self.panel.export(now);
        to_js(&json!({
            "fileName": document.file_name(),
            "contents": document.to_json_pretty(),
        }))
    }

    #[wasm_bindgen(js_name = importData)]
    pub fn import_data(&mut self, text: &str) -> Result<(), JsValue> {
        self.panel
            .import(text)
            .map(|_| ())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Install the fetched catalog body; `None` when the fetch failed.
    #[wasm_bindgen(js_name = loadCatalog)]
    pub fn load_catalog(&mut self, body: Option<String>) {
        self.panel.load_catalog(body.ok_or("fetch failed"));
    }

    #[wasm_bindgen(js_name = searchCategories)]
    pub fn search_categories(&self, query: &str) -> Result<JsValue, JsValue> {
        let hits: Vec<serde_json::Value> = self
            .panel
            .search_categories(query)
            .into_iter()
            .map(|(category, blocked)| {
                json!({
                    "name": category.name,
                    "slug": category.slug,
                    "viewers": category.viewers,
                    "blocked": blocked,
                })
            })
            .collect();
        to_js(&hits)
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_evaluate_item_from_js_filters() {
        let filters = to_js(&json!({"blockedKeywords": ["gambling"]})).unwrap();
        let decision: sf_core::BlockDecision =
            from_js(&evaluate_item("xyz", "24/7 Gambling", "Slots", filters).unwrap()).unwrap();
        assert!(decision.blocked);
        assert_eq!(decision.label(), "Keyword: gambling");
    }

    #[wasm_bindgen_test]
    fn test_blank_name_yields_null() {
        let filters = to_js(&json!({"blockedKeywords": ["gambling"]})).unwrap();
        assert!(evaluate_item("", "24/7 gambling", "", filters).unwrap().is_null());
    }

    #[wasm_bindgen_test]
    fn test_missing_filters_allow_everything() {
        let decision: sf_core::BlockDecision =
            from_js(&evaluate_item("xyz", "", "", JsValue::UNDEFINED).unwrap()).unwrap();
        assert!(!decision.blocked);
    }

    #[wasm_bindgen_test]
    fn test_storage_changes_decode() {
        let changes = to_js(&json!({
            "blockedStreamers": {"oldValue": ["a"], "newValue": ["a", "b"]},
            "settings": {"oldValue": {"silentMode": false}}
        }))
        .unwrap();
        let changes = storage_changes_from_js(&changes).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes["settings"].new_value.is_none());
    }

    #[wasm_bindgen_test]
    fn test_category_helpers() {
        assert!(is_category_match("Slots & Casino", "slots"));
        assert_eq!(normalize_category("Just Chatting"), "justchatting");
    }
}
