//! `web-sys` implementations of the document, element and timer seams

use std::cell::Cell;
use std::time::Duration;

use sf_core::page::{Overlay, PageDocument, PageElement, PageWarning};
use sf_core::schedule::{Scheduler, Subscription};
use sf_core::types::ElementId;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, MutationObserver, MutationObserverInit, MutationRecord, Node, NodeList, Window};

/// Expando property carrying an element's identity.
const ID_KEY: &str = "__sfElementId";

const QUICK_BLOCK_CLASS: &str = "sf-quick-block";
const WARNING_ID: &str = "sf-page-warning";

thread_local! {
    static NEXT_ID: Cell<u64> = Cell::new(1);
}

fn elements(list: &NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

fn create(document: &Document, tag: &str) -> Option<Element> {
    document.create_element(tag).ok()
}

fn set_styles(element: &Element, styles: &[(&str, &str)]) {
    if let Some(html) = element.dyn_ref::<web_sys::HtmlElement>() {
        let style = html.style();
        for (property, value) in styles {
            let _ = style.set_property(property, value);
        }
    }
}

fn text_child(document: &Document, parent: &Element, tag: &str, text: &str) {
    if let Some(child) = create(document, tag) {
        child.set_text_content(Some(text));
        let _ = parent.append_child(&child);
    }
}

// =============================================================================
// Element
// =============================================================================

#[derive(Clone)]
pub struct DomElement(pub Element);

impl PageElement for DomElement {
    fn identity(&self) -> ElementId {
        let key = JsValue::from_str(ID_KEY);
        if let Some(id) = js_sys::Reflect::get(&self.0, &key).ok().and_then(|v| v.as_f64()) {
            return ElementId(id as u64);
        }
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        let _ = js_sys::Reflect::set(&self.0, &key, &JsValue::from_f64(id as f64));
        ElementId(id)
    }

    fn tag_name(&self) -> String {
        self.0.tag_name()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let _ = self.0.set_attribute(name, value);
    }

    fn remove_attribute(&self, name: &str) {
        let _ = self.0.remove_attribute(name);
    }

    fn set_style(&self, property: &str, value: &str) {
        set_styles(&self.0, &[(property, value)]);
    }

    fn text_content(&self) -> String {
        self.0.text_content().unwrap_or_default()
    }

    fn query_selector(&self, selector: &str) -> Option<Self> {
        self.0.query_selector(selector).ok().flatten().map(DomElement)
    }

    fn query_selector_all(&self, selector: &str) -> Vec<Self> {
        match self.0.query_selector_all(selector) {
            Ok(list) => elements(&list).into_iter().map(DomElement).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn append_overlay(&self, overlay: &Overlay) {
        let Some(document) = self.0.owner_document() else { return };
        let Some(root) = create(&document, "div") else { return };
        root.set_class_name(overlay.class_name);
        set_styles(
            &root,
            &[
                ("position", "absolute"),
                ("inset", "0"),
                ("display", "flex"),
                ("flex-direction", "column"),
                ("align-items", "center"),
                ("justify-content", "center"),
                ("background", "rgba(0, 0, 0, 0.7)"),
                ("color", "#fff"),
                ("z-index", "10"),
                ("pointer-events", "none"),
            ],
        );
        text_child(&document, &root, "div", overlay.icon);
        text_child(&document, &root, "div", overlay.title);
        text_child(&document, &root, "div", &overlay.detail);
        let _ = self.0.append_child(&root);
    }

    fn remove_overlays(&self, class_name: &str) -> usize {
        let selector = format!(":scope > .{}", class_name);
        let found = self.query_selector_all(&selector);
        for overlay in &found {
            overlay.0.remove();
        }
        found.len()
    }

    fn show_quick_block_button(&self, tooltip: &str, on_click: Box<dyn FnOnce()>) {
        let Some(document) = self.0.owner_document() else { return };
        let Some(button) = create(&document, "button") else { return };
        button.set_class_name(QUICK_BLOCK_CLASS);
        let _ = button.set_attribute("title", tooltip);
        button.set_text_content(Some("🚫"));
        set_styles(
            &button,
            &[
                ("position", "absolute"),
                ("top", "8px"),
                ("right", "8px"),
                ("z-index", "20"),
                ("cursor", "pointer"),
            ],
        );

        let handler = Closure::once_into_js(move |event: web_sys::Event| {
            event.prevent_default();
            event.stop_propagation();
            on_click();
        });
        let _ = button.add_event_listener_with_callback("click", handler.unchecked_ref());
        let _ = self.0.append_child(&button);
    }
}

// =============================================================================
// Document
// =============================================================================

#[derive(Clone)]
pub struct DomDocument {
    window: Window,
    document: Document,
}

impl DomDocument {
    pub fn current() -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document"))?;
        Ok(Self { window, document })
    }

    pub fn window(&self) -> Window {
        self.window.clone()
    }

    fn root(&self) -> Option<Node> {
        match self.document.body() {
            Some(body) => Some(body.into()),
            None => self.document.document_element().map(Into::into),
        }
    }
}

impl PageDocument for DomDocument {
    type Element = DomElement;

    fn query_selector_all(&self, selector: &str) -> Vec<DomElement> {
        match self.document.query_selector_all(selector) {
            Ok(list) => elements(&list).into_iter().map(DomElement).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn location_path(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn navigate(&self, url: &str) {
        if let Err(e) = self.window.location().set_href(url) {
            log::warn!("Navigation to {} failed: {:?}", url, e);
        }
    }

    fn show_page_warning(&self, warning: &PageWarning) -> bool {
        if self.document.get_element_by_id(WARNING_ID).is_some() {
            return false;
        }
        let (Some(root), Some(panel)) = (create(&self.document, "div"), create(&self.document, "div")) else {
            return false;
        };
        root.set_id(WARNING_ID);
        set_styles(
            &root,
            &[
                ("position", "fixed"),
                ("inset", "0"),
                ("display", "flex"),
                ("align-items", "center"),
                ("justify-content", "center"),
                ("background", "rgba(0, 0, 0, 0.85)"),
                ("z-index", "2147483647"),
            ],
        );
        set_styles(
            &panel,
            &[
                ("background", "#18181b"),
                ("color", "#fff"),
                ("padding", "32px"),
                ("border-radius", "12px"),
                ("text-align", "center"),
            ],
        );

        text_child(&self.document, &panel, "h2", &warning.title);
        text_child(&self.document, &panel, "p", &warning.reason);
        text_child(
            &self.document,
            &panel,
            "p",
            &format!("Redirecting to {} in {} seconds...", warning.home_url, warning.countdown_secs),
        );

        if let Some(dismiss) = create(&self.document, "button") {
            dismiss.set_text_content(Some("Dismiss"));
            let overlay = root.clone();
            let handler = Closure::once_into_js(move || overlay.remove());
            let _ = dismiss.add_event_listener_with_callback("click", handler.unchecked_ref());
            let _ = panel.append_child(&dismiss);
        }

        let _ = root.append_child(&panel);
        match self.root() {
            Some(parent) => parent.append_child(&root).is_ok(),
            None => false,
        }
    }

    fn remove_quick_block_buttons(&self) {
        for button in self.query_selector_all(&format!(".{}", QUICK_BLOCK_CLASS)) {
            button.0.remove();
        }
    }

    fn observe_structural_changes(&self, mut handler: Box<dyn FnMut(usize)>) -> Subscription {
        let Some(target) = self.root() else {
            log::warn!("No document root to observe");
            return Subscription::noop();
        };

        let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                let added: usize = records
                    .iter()
                    .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
                    .map(|record| {
                        let nodes = record.added_nodes();
                        (0..nodes.length())
                            .filter_map(|i| nodes.item(i))
                            .filter(|node| node.node_type() == Node::ELEMENT_NODE)
                            .count()
                    })
                    .sum();
                handler(added);
            },
        );

        let observer = match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                log::warn!("MutationObserver unavailable: {:?}", e);
                return Subscription::noop();
            }
        };
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        if let Err(e) = observer.observe_with_options(&target, &init) {
            log::warn!("Failed to observe document: {:?}", e);
            return Subscription::noop();
        }

        Subscription::new(move || {
            observer.disconnect();
            drop(callback);
        })
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// `setTimeout`-backed scheduler.
pub struct TimeoutScheduler {
    window: Window,
}

impl TimeoutScheduler {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl Scheduler for TimeoutScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        let callback = Closure::once_into_js(move || task());
        let millis = delay.as_millis().min(i32::MAX as u128) as i32;
        if let Err(e) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis)
        {
            log::warn!("setTimeout failed: {:?}", e);
        }
    }
}
