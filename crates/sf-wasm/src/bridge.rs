//! Host callbacks behind the storage, transport and toast seams, plus the
//! console logger.
//!
//! Browser storage is asynchronous while the engine's persistence seam is
//! synchronous, so each process keeps a write-through cache: reads hit the
//! cache, writes update it and hand the entries to a JS `persist` callback.
//! Writes made by other processes reach the cache through `absorb`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sf_core::notify::{Notifier, ToastKind};
use sf_core::storage::{MemoryStorage, StorageBackend, StorageChange, StorageChanges, StorageEntries, StorageError};
use sf_core::sync::{DeliveryError, FilterMessage, MessageTransport};
use wasm_bindgen::prelude::*;
use js_sys::Function;

// =============================================================================
// JSON <-> JsValue
// =============================================================================

pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&json)
}

pub fn from_js<T: DeserializeOwned>(value: &JsValue) -> Result<T, JsValue> {
    let json = js_sys::JSON::stringify(value)?
        .as_string()
        .ok_or_else(|| JsValue::from_str("Value is not JSON-serializable"))?;
    serde_json::from_str(&json).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Decode a `chrome.storage.onChanged` payload.
pub fn storage_changes_from_js(value: &JsValue) -> Result<StorageChanges, JsValue> {
    let raw: serde_json::Map<String, Value> = from_js(value)?;
    Ok(raw
        .into_iter()
        .map(|(key, change)| {
            let change = StorageChange {
                old_value: change.get("oldValue").cloned(),
                new_value: change.get("newValue").cloned(),
            };
            (key, change)
        })
        .collect())
}

// =============================================================================
// Storage
// =============================================================================

/// Clones share one cache.
#[derive(Clone)]
pub struct JsStorage {
    cache: Rc<RefCell<MemoryStorage>>,
    persist: Function,
}

impl JsStorage {
    /// `persist` receives the written entries, or `null` for a clear.
    pub fn new(entries: StorageEntries, persist: Function) -> Self {
        Self {
            cache: Rc::new(RefCell::new(MemoryStorage::with_entries(entries))),
            persist,
        }
    }

    /// Bring the cache in line with a write another process made.
    pub fn absorb(&self, changes: &StorageChanges) {
        let mut entries = self.cache.borrow().entries().clone();
        for (key, change) in changes {
            match &change.new_value {
                Some(value) => {
                    entries.insert(key.clone(), value.clone());
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        *self.cache.borrow_mut() = MemoryStorage::with_entries(entries);
    }

    fn call_persist(&self, payload: &JsValue) -> Result<(), StorageError> {
        self.persist
            .call1(&JsValue::NULL, payload)
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
    }
}

impl StorageBackend for JsStorage {
    fn get(&self, keys: &[&str]) -> Result<StorageEntries, StorageError> {
        self.cache.borrow().get(keys)
    }

    fn set(&mut self, entries: StorageEntries) -> Result<(), StorageError> {
        let payload = to_js(&entries).map_err(|e| StorageError::Serialize {
            key: entries.keys().cloned().collect::<Vec<_>>().join(","),
            message: format!("{:?}", e),
        })?;
        self.call_persist(&payload)?;
        self.cache.borrow_mut().set(entries)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.call_persist(&JsValue::NULL)?;
        self.cache.borrow_mut().clear()
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Calls `send(tabId, message)`. The JS side swallows promise rejections
/// from tabs without a content instance.
pub struct JsTransport {
    send: Function,
}

impl JsTransport {
    pub fn new(send: Function) -> Self {
        Self { send }
    }
}

impl MessageTransport for JsTransport {
    fn send_to_tab(&self, tab_id: i32, message: &FilterMessage) -> Result<(), DeliveryError> {
        let payload = to_js(message).map_err(|e| DeliveryError::Transport(format!("{:?}", e)))?;
        self.send
            .call2(&JsValue::NULL, &JsValue::from(tab_id), &payload)
            .map(|_| ())
            .map_err(|e| DeliveryError::Transport(format!("{:?}", e)))
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// Calls `show(message, kind)`.
pub struct JsNotifier {
    show: Function,
}

impl JsNotifier {
    pub fn new(show: Function) -> Self {
        Self { show }
    }
}

impl Notifier for JsNotifier {
    fn show(&self, message: &str, kind: ToastKind) {
        let _ = self
            .show
            .call2(&JsValue::NULL, &JsValue::from_str(message), &JsValue::from_str(kind.as_str()));
    }
}

// =============================================================================
// Logging
// =============================================================================

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[StreamFilter] {}", record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

/// Route `log` output to the browser console. Safe to call more than once.
pub fn init_console_logger(level: log::LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
