//! In-memory hosts for unit tests
//!
//! `FakeDocument` is a small element tree with just enough selector support
//! for the selectors the scanner uses. Structural mutations are queued and
//! only reach the observer on [`FakeDocument::flush_mutations`], the way a
//! real `MutationObserver` delivers them after the current task.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::notify::{Notifier, ToastKind};
use crate::page::{Overlay, PageDocument, PageElement, PageWarning};
use crate::schedule::{Scheduler, Subscription};
use crate::storage::{StorageBackend, StorageEntries, StorageError};
use crate::sync::{DeliveryError, FilterMessage, MessageTransport};
use crate::types::ElementId;

// =============================================================================
// Fake Document
// =============================================================================

struct QuickBlockButton {
    owner: ElementId,
    tooltip: String,
    on_click: Option<Box<dyn FnOnce()>>,
}

type Observer = Box<dyn FnMut(usize)>;

#[derive(Default)]
struct DocShared {
    next_id: Cell<u64>,
    path: RefCell<String>,
    pending_added: Cell<usize>,
    observer: RefCell<Option<Observer>>,
    observer_id: Cell<u64>,
    buttons: RefCell<Vec<QuickBlockButton>>,
    warnings: RefCell<Vec<PageWarning>>,
    warning_visible: Cell<bool>,
    navigations: RefCell<Vec<String>>,
}

impl DocShared {
    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

#[derive(Clone)]
pub struct FakeDocument {
    shared: Rc<DocShared>,
    body: FakeElement,
}

impl FakeDocument {
    pub fn new(path: &str) -> Self {
        let shared = Rc::new(DocShared::default());
        *shared.path.borrow_mut() = path.to_string();
        let body = FakeElement::create(&shared, "body");
        Self { shared, body }
    }

    /// A detached element owned by this document.
    pub fn element(&self, tag: &str) -> FakeElement {
        FakeElement::create(&self.shared, tag)
    }

    pub fn body(&self) -> FakeElement {
        self.body.clone()
    }

    /// Every warning shown so far.
    pub fn warnings(&self) -> Vec<PageWarning> {
        self.shared.warnings.borrow().clone()
    }

    pub fn dismiss_warning(&self) {
        self.shared.warning_visible.set(false);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.shared.navigations.borrow().clone()
    }

    /// Tooltips of the quick-block buttons currently shown.
    pub fn quick_block_buttons(&self) -> Vec<String> {
        self.shared
            .buttons
            .borrow()
            .iter()
            .map(|button| button.tooltip.clone())
            .collect()
    }

    /// Deliver queued structural mutations to the observer.
    pub fn flush_mutations(&self) {
        let added = self.shared.pending_added.replace(0);
        if added == 0 {
            return;
        }
        let id = self.shared.observer_id.get();
        let Some(mut handler) = self.shared.observer.borrow_mut().take() else { return };
        handler(added);
        // Restore unless the subscription was cancelled or replaced meanwhile.
        if self.shared.observer_id.get() == id {
            let mut slot = self.shared.observer.borrow_mut();
            if slot.is_none() {
                *slot = Some(handler);
            }
        }
    }
}

impl PageDocument for FakeDocument {
    type Element = FakeElement;

    fn query_selector_all(&self, selector: &str) -> Vec<FakeElement> {
        self.body.query_selector_all(selector)
    }

    fn location_path(&self) -> String {
        self.shared.path.borrow().clone()
    }

    fn navigate(&self, url: &str) {
        self.shared.navigations.borrow_mut().push(url.to_string());
    }

    fn show_page_warning(&self, warning: &PageWarning) -> bool {
        if self.shared.warning_visible.get() {
            return false;
        }
        self.shared.warning_visible.set(true);
        self.shared.warnings.borrow_mut().push(warning.clone());
        true
    }

    fn remove_quick_block_buttons(&self) {
        self.shared.buttons.borrow_mut().clear();
    }

    fn observe_structural_changes(&self, handler: Box<dyn FnMut(usize)>) -> Subscription {
        let id = self.shared.observer_id.get() + 1;
        self.shared.observer_id.set(id);
        *self.shared.observer.borrow_mut() = Some(handler);

        let shared: Weak<DocShared> = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            let Some(shared) = shared.upgrade() else { return };
            if shared.observer_id.get() == id {
                shared.observer_id.set(id + 1);
                *shared.observer.borrow_mut() = None;
            }
        })
    }
}

// =============================================================================
// Fake Element
// =============================================================================

struct Node {
    id: u64,
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<FakeElement>,
}

/// Structural copy of a subtree, identities excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<NodeSnapshot>,
}

#[derive(Clone)]
pub struct FakeElement {
    node: Rc<RefCell<Node>>,
    shared: Rc<DocShared>,
}

impl FakeElement {
    fn create(shared: &Rc<DocShared>, tag: &str) -> Self {
        let node = Node {
            id: shared.allocate_id(),
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            children: Vec::new(),
        };
        Self {
            node: Rc::new(RefCell::new(node)),
            shared: Rc::clone(shared),
        }
    }

    pub fn class(self, class: &str) -> Self {
        {
            let mut node = self.node.borrow_mut();
            let merged = match node.attrs.get("class") {
                Some(existing) => format!("{} {}", existing, class),
                None => class.to_string(),
            };
            node.attrs.insert("class".to_string(), merged);
        }
        self
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        self.node
            .borrow_mut()
            .attrs
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.node.borrow_mut().text = text.to_string();
        self
    }

    pub fn append(&self, child: FakeElement) {
        self.node.borrow_mut().children.push(child);
        self.shared.pending_added.set(self.shared.pending_added.get() + 1);
    }

    /// One inline style property.
    pub fn style(&self, property: &str) -> Option<String> {
        let style = self.attribute("style")?;
        parse_style(&style)
            .into_iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value)
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let node = self.node.borrow();
        NodeSnapshot {
            tag: node.tag.clone(),
            attrs: node.attrs.clone(),
            text: node.text.clone(),
            children: node.children.iter().map(FakeElement::snapshot).collect(),
        }
    }

    pub fn count_children_with_class(&self, class: &str) -> usize {
        self.node
            .borrow()
            .children
            .iter()
            .filter(|child| child.has_class(class))
            .count()
    }

    /// Click this element's quick-block button. Returns false if it has none.
    pub fn click_quick_block(&self) -> bool {
        let owner = self.identity();
        let on_click = {
            let mut buttons = self.shared.buttons.borrow_mut();
            buttons
                .iter_mut()
                .rev()
                .find(|button| button.owner == owner)
                .and_then(|button| button.on_click.take())
        };
        match on_click {
            Some(on_click) => {
                on_click();
                true
            }
            None => false,
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.node
            .borrow()
            .attrs
            .get("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn matches(&self, compound: &Compound) -> bool {
        let node = self.node.borrow();
        if let Some(tag) = &compound.tag {
            if !tag.eq_ignore_ascii_case(&node.tag) {
                return false;
            }
        }
        let classes_ok = compound.classes.iter().all(|class| {
            node.attrs
                .get("class")
                .map(|classes| classes.split_whitespace().any(|c| c == class.as_str()))
                .unwrap_or(false)
        });
        classes_ok
            && compound.attrs.iter().all(|test| {
                let Some(value) = node.attrs.get(&test.name) else { return false };
                match &test.op {
                    AttrOp::Exists => true,
                    AttrOp::Equals(expected) => value == expected,
                    AttrOp::Contains(needle) => value.contains(needle.as_str()),
                }
            })
    }

    fn collect(&self, selectors: &[Compound], out: &mut Vec<FakeElement>) {
        let children: Vec<FakeElement> = self.node.borrow().children.clone();
        for child in children {
            if selectors.iter().any(|compound| child.matches(compound)) {
                out.push(child.clone());
            }
            child.collect(selectors, out);
        }
    }
}

impl PageElement for FakeElement {
    fn identity(&self) -> ElementId {
        ElementId(self.node.borrow().id)
    }

    fn tag_name(&self) -> String {
        self.node.borrow().tag.to_ascii_uppercase()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.node.borrow().attrs.get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.node
            .borrow_mut()
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&self, name: &str) {
        self.node.borrow_mut().attrs.remove(name);
    }

    fn set_style(&self, property: &str, value: &str) {
        let mut props = self.attribute("style").map(|s| parse_style(&s)).unwrap_or_default();
        match props.iter_mut().find(|(name, _)| name == property) {
            Some(slot) => slot.1 = value.to_string(),
            None => props.push((property.to_string(), value.to_string())),
        }
        let style = props
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attribute("style", &style);
    }

    fn text_content(&self) -> String {
        let node = self.node.borrow();
        let mut text = node.text.clone();
        for child in &node.children {
            text.push_str(&child.text_content());
        }
        text
    }

    fn query_selector(&self, selector: &str) -> Option<Self> {
        self.query_selector_all(selector).into_iter().next()
    }

    fn query_selector_all(&self, selector: &str) -> Vec<Self> {
        let selectors = parse_selector_list(selector);
        let mut out = Vec::new();
        self.collect(&selectors, &mut out);
        out
    }

    fn append_overlay(&self, overlay: &Overlay) {
        let div = FakeElement::create(&self.shared, "div").class(overlay.class_name);
        div.append(FakeElement::create(&self.shared, "div").text(overlay.icon));
        div.append(FakeElement::create(&self.shared, "div").text(overlay.title));
        div.append(FakeElement::create(&self.shared, "div").text(&overlay.detail));
        self.append(div);
    }

    fn remove_overlays(&self, class_name: &str) -> usize {
        let mut node = self.node.borrow_mut();
        let before = node.children.len();
        node.children.retain(|child| !child.has_class(class_name));
        before - node.children.len()
    }

    fn show_quick_block_button(&self, tooltip: &str, on_click: Box<dyn FnOnce()>) {
        self.shared.buttons.borrow_mut().push(QuickBlockButton {
            owner: self.identity(),
            tooltip: tooltip.to_string(),
            on_click: Some(on_click),
        });
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

// =============================================================================
// Selector Subset
// =============================================================================

enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
}

struct AttrTest {
    name: String,
    op: AttrOp,
}

#[derive(Default)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

/// `tag`, `.class`, `[attr]`, `[attr="v"]`, `[attr*="v"]` and comma lists.
fn parse_selector_list(list: &str) -> Vec<Compound> {
    list.split(',').map(|s| parse_compound(s.trim())).collect()
}

fn parse_compound(selector: &str) -> Compound {
    let mut compound = Compound::default();
    let tag_end = selector
        .find(|c: char| c == '.' || c == '[')
        .unwrap_or(selector.len());
    let tag = &selector[..tag_end];
    if !tag.is_empty() && tag != "*" {
        compound.tag = Some(tag.to_string());
    }

    let mut rest = &selector[tag_end..];
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after
                .find(|c: char| c == '.' || c == '[')
                .unwrap_or(after.len());
            compound.classes.push(after[..end].to_string());
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').unwrap_or(after.len());
            compound.attrs.push(parse_attr_test(&after[..end]));
            rest = after.get(end + 1..).unwrap_or("");
        } else {
            break;
        }
    }
    compound
}

fn parse_attr_test(body: &str) -> AttrTest {
    let unquote = |v: &str| v.trim().trim_matches('"').to_string();
    if let Some((name, value)) = body.split_once("*=") {
        return AttrTest { name: name.trim().to_string(), op: AttrOp::Contains(unquote(value)) };
    }
    if let Some((name, value)) = body.split_once('=') {
        return AttrTest { name: name.trim().to_string(), op: AttrOp::Equals(unquote(value)) };
    }
    AttrTest { name: body.trim().to_string(), op: AttrOp::Exists }
}

// =============================================================================
// Scheduler
// =============================================================================

type Task = (u64, u64, Box<dyn FnOnce()>);

/// A clock that only moves when the test says so.
#[derive(Default)]
pub struct ManualScheduler {
    now_ms: Cell<u64>,
    seq: Cell<u64>,
    tasks: RefCell<Vec<Task>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Move the clock forward, running due tasks in order. Tasks scheduled by
    /// running tasks run too if they fall inside the window.
    pub fn advance_ms(&self, ms: u64) {
        let target = self.now_ms.get() + ms;
        loop {
            let next = {
                let mut tasks = self.tasks.borrow_mut();
                let idx = tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, (due, _, _))| *due <= target)
                    .min_by_key(|(_, (due, seq, _))| (*due, *seq))
                    .map(|(idx, _)| idx);
                idx.map(|idx| tasks.remove(idx))
            };
            let Some((due, _, task)) = next else { break };
            self.now_ms.set(due);
            task();
        }
        self.now_ms.set(target);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        let due = self.now_ms.get() + delay.as_millis() as u64;
        self.tasks.borrow_mut().push((due, seq, task));
    }
}

// =============================================================================
// Notifier, Transport, Storage
// =============================================================================

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Rc<RefCell<Vec<(String, ToastKind)>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, ToastKind)> {
        self.messages.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, message: &str, kind: ToastKind) {
        self.messages.borrow_mut().push((message.to_string(), kind));
    }
}

/// Records delivered messages; tabs marked with `fail_for` have no receiver.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Rc<RefCell<Vec<(i32, FilterMessage)>>>,
    failing: Rc<RefCell<HashSet<i32>>>,
}

impl RecordingTransport {
    pub fn fail_for(&self, tab_id: i32) {
        self.failing.borrow_mut().insert(tab_id);
    }

    pub fn sent(&self) -> Vec<(i32, FilterMessage)> {
        self.sent.borrow().clone()
    }
}

impl MessageTransport for RecordingTransport {
    fn send_to_tab(&self, tab_id: i32, message: &FilterMessage) -> Result<(), DeliveryError> {
        if self.failing.borrow().contains(&tab_id) {
            return Err(DeliveryError::NoReceiver(tab_id));
        }
        self.sent.borrow_mut().push((tab_id, message.clone()));
        Ok(())
    }
}

/// A backend whose every call fails.
pub struct FailingStorage;

impl StorageBackend for FailingStorage {
    fn get(&self, _keys: &[&str]) -> Result<StorageEntries, StorageError> {
        Err(StorageError::Unavailable("quota exceeded".to_string()))
    }

    fn set(&mut self, _entries: StorageEntries) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".to_string()))
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".to_string()))
    }
}
