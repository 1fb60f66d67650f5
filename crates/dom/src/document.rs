//! The document arena and its mutation surface.

use crate::error::DomError;
use crate::geometry::Rect;
use crate::mutation::{DomEvent, InteractionKind, MutationRecord};
use crate::node::{ElementData, NodeData};
use core::cell::RefCell;
use indextree::{Arena, NodeId};
use log::trace;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use url::Url;

/// Documents are shared between the host page and the engine on one thread.
pub type SharedDocument = Rc<RefCell<Document>>;

/// Identifies one event subscription so it can be detached again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A live subscription to document events.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: UnboundedReceiver<DomEvent>,
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    sender: UnboundedSender<DomEvent>,
}

/// Default viewport of a freshly created document.
const DEFAULT_VIEWPORT: Rect = Rect::new(0.0, 0.0, 1280.0, 800.0);

/// A host page: node tree, geometry, viewport and event subscribers.
#[derive(Debug)]
pub struct Document {
    arena: Arena<NodeData>,
    root: NodeId,
    url: Url,
    viewport: Rect,
    hidden: bool,
    rects: HashMap<NodeId, Rect>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    /// Records collected while a batch is open; flushed as one event.
    batch: Option<Vec<MutationRecord>>,
}

impl Document {
    pub fn new(url: Url) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeData::Document);
        Self {
            arena,
            root,
            url,
            viewport: DEFAULT_VIEWPORT,
            hidden: false,
            rects: HashMap::new(),
            subscribers: Vec::new(),
            next_subscription: 1,
            batch: None,
        }
    }

    /// Wrap the document for sharing with the engine.
    pub fn into_shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// The `<body>` element, or the root when the document has none.
    pub fn body(&self) -> NodeId {
        self.root
            .descendants(&self.arena)
            .find(|&node| self.tag_name(node) == Some("body"))
            .unwrap_or(self.root)
    }

    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Change the page URL without reloading (history navigation).
    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register a new event subscriber.
    pub fn subscribe(&mut self) -> Subscription {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.wrapping_add(1);
        let (sender, events) = unbounded_channel();
        self.subscribers.push(Subscriber { id, sender });
        Subscription { id, events }
    }

    /// Detach a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|subscriber| subscriber.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn emit(&mut self, event: &DomEvent) {
        // Subscribers whose receiver was dropped are pruned here.
        self.subscribers
            .retain(|subscriber| subscriber.sender.send(event.clone()).is_ok());
    }

    fn record(&mut self, record: MutationRecord) {
        if let Some(batch) = self.batch.as_mut() {
            batch.push(record);
        } else {
            self.emit(&DomEvent::Mutations(vec![record]));
        }
    }

    /// Run `apply` with mutation records collected into a single batch event.
    pub fn with_batch<R>(&mut self, apply: impl FnOnce(&mut Self) -> R) -> R {
        let outer = self.batch.replace(Vec::new());
        let result = apply(self);
        let records = self.batch.take().unwrap_or_default();
        match outer {
            Some(mut enclosing) => {
                enclosing.extend(records);
                self.batch = Some(enclosing);
            }
            None => {
                if !records.is_empty() {
                    self.emit(&DomEvent::Mutations(records));
                }
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Node creation and inspection
    // ------------------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.arena.new_node(NodeData::Element(ElementData::new(tag)))
    }

    /// Create a detached element with attributes.
    pub fn create_element_with(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let mut data = ElementData::new(tag);
        for (name, value) in attributes {
            data.set_attribute(name, value);
        }
        self.arena.new_node(NodeData::Element(data))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena.new_node(NodeData::Text(text.to_owned()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.arena.new_node(NodeData::Comment(text.to_owned()))
    }

    pub fn exists(&self, node: NodeId) -> bool {
        self.arena.get(node).is_some_and(|entry| !entry.is_removed())
    }

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.arena
            .get(node)
            .filter(|entry| !entry.is_removed())
            .map(|entry| entry.get())
    }

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.data(node).and_then(NodeData::as_element)
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut ElementData, DomError> {
        let entry = self
            .arena
            .get_mut(node)
            .filter(|entry| !entry.is_removed())
            .ok_or(DomError::UnknownNode(node))?;
        entry
            .get_mut()
            .as_element_mut()
            .ok_or(DomError::NotAnElement(node))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag_name.as_str())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attribute(name)
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .is_some_and(|element| element.has_class(class))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        if !self.exists(node) {
            return String::new();
        }
        node.descendants(&self.arena)
            .filter_map(|descendant| match self.data(descendant) {
                Some(NodeData::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Tree navigation
    // ------------------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.parent()
    }

    /// Parent if it is an element (not the document node).
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&parent| self.is_element(parent))
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        if !self.exists(node) {
            return Vec::new();
        }
        node.children(&self.arena).collect()
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|&child| self.is_element(child))
            .collect()
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.previous_sibling()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.next_sibling()
    }

    pub fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.previous_sibling(node);
        while let Some(sibling) = current {
            if self.is_element(sibling) {
                return Some(sibling);
            }
            current = self.previous_sibling(sibling);
        }
        None
    }

    /// Inclusive ancestors, starting with `node` itself.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        if !self.exists(node) {
            return Vec::new();
        }
        node.ancestors(&self.arena).collect()
    }

    /// Descendants in tree order, excluding `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        if !self.exists(node) {
            return Vec::new();
        }
        node.descendants(&self.arena).skip(1).collect()
    }

    /// True when `node` is `ancestor` or lies inside it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.exists(node) && node.ancestors(&self.arena).any(|step| step == ancestor)
    }

    /// True when the node is attached to this document's tree.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.exists(node) && node.ancestors(&self.arena).last() == Some(self.root)
    }

    // ------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------

    fn ensure_exists(&self, node: NodeId) -> Result<(), DomError> {
        if self.exists(node) {
            Ok(())
        } else {
            Err(DomError::UnknownNode(node))
        }
    }

    /// Detach `node` from its current parent, recording the removal if it was connected.
    fn take_from_parent(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        let was_connected = self.is_connected(node);
        node.detach(&mut self.arena);
        if was_connected {
            self.record(MutationRecord::ChildList {
                target: parent,
                added: Vec::new(),
                removed: vec![node],
            });
        }
    }

    fn record_insertion(&mut self, node: NodeId) {
        if let Some(parent) = self.parent(node)
            && self.is_connected(parent)
        {
            self.record(MutationRecord::ChildList {
                target: parent,
                added: vec![node],
                removed: Vec::new(),
            });
        }
    }

    /// Append `child` as the last child of `parent`, moving it if it already has a parent.
    ///
    /// # Errors
    /// Fails when either node is unknown or the insertion would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.ensure_exists(parent)?;
        self.ensure_exists(child)?;
        self.take_from_parent(child);
        parent.checked_append(child, &mut self.arena)?;
        self.record_insertion(child);
        Ok(())
    }

    /// Insert `child` as the first child of `parent`.
    ///
    /// # Errors
    /// Fails when either node is unknown or the insertion would create a cycle.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.ensure_exists(parent)?;
        self.ensure_exists(child)?;
        self.take_from_parent(child);
        parent.checked_prepend(child, &mut self.arena)?;
        self.record_insertion(child);
        Ok(())
    }

    /// Insert `node` immediately before `reference`.
    ///
    /// # Errors
    /// Fails when either node is unknown or `reference` has no parent.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<(), DomError> {
        self.ensure_exists(reference)?;
        self.ensure_exists(node)?;
        if self.parent(reference).is_none() {
            return Err(DomError::Orphan(reference));
        }
        self.take_from_parent(node);
        reference.checked_insert_before(node, &mut self.arena)?;
        self.record_insertion(node);
        Ok(())
    }

    /// Insert `node` immediately after `reference`.
    ///
    /// # Errors
    /// Fails when either node is unknown or `reference` has no parent.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<(), DomError> {
        self.ensure_exists(reference)?;
        self.ensure_exists(node)?;
        if self.parent(reference).is_none() {
            return Err(DomError::Orphan(reference));
        }
        self.take_from_parent(node);
        reference.checked_insert_after(node, &mut self.arena)?;
        self.record_insertion(node);
        Ok(())
    }

    /// Detach `node` from the tree. The subtree stays alive and can be inserted again.
    ///
    /// # Errors
    /// Fails when the node is unknown.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.ensure_exists(node)?;
        self.take_from_parent(node);
        Ok(())
    }

    /// Detach `node` and free it together with its subtree and layout boxes.
    ///
    /// Ids of freed nodes never resolve again, even after the arena reuses their slots.
    ///
    /// # Errors
    /// Fails when the node is unknown.
    pub fn drop_subtree(&mut self, node: NodeId) -> Result<(), DomError> {
        self.ensure_exists(node)?;
        self.take_from_parent(node);
        for freed in node.descendants(&self.arena) {
            self.rects.remove(&freed);
        }
        node.remove_subtree(&mut self.arena);
        trace!("freed subtree {node:?}");
        Ok(())
    }

    /// Remove every child of `parent`, recording one batch.
    ///
    /// # Errors
    /// Fails when the node is unknown.
    pub fn clear_children(&mut self, parent: NodeId) -> Result<(), DomError> {
        self.ensure_exists(parent)?;
        let children = self.children(parent);
        self.with_batch(|doc| {
            for child in children {
                doc.take_from_parent(child);
            }
        });
        Ok(())
    }

    /// Set an attribute, recording the change when the element is connected.
    ///
    /// # Errors
    /// Fails when the node is unknown or not an element.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let old_value = self.element_mut(node)?.set_attribute(name, value);
        if old_value.as_deref() != Some(value) && self.is_connected(node) {
            self.record(MutationRecord::Attributes {
                target: node,
                name: name.to_ascii_lowercase(),
                old_value,
            });
        }
        Ok(())
    }

    /// Remove an attribute, recording the change when it was present on a connected element.
    ///
    /// # Errors
    /// Fails when the node is unknown or not an element.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), DomError> {
        let old_value = self.element_mut(node)?.remove_attribute(name);
        if old_value.is_some() && self.is_connected(node) {
            self.record(MutationRecord::Attributes {
                target: node,
                name: name.to_owned(),
                old_value,
            });
        }
        Ok(())
    }

    /// Add a class token if it is not present yet.
    ///
    /// # Errors
    /// Fails when the node is unknown or not an element.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<(), DomError> {
        if self.has_class(node, class) {
            return Ok(());
        }
        let classes = match self.attribute(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_owned(),
        };
        self.set_attribute(node, "class", &classes)
    }

    /// Replace the children of `node` with a single text node.
    ///
    /// # Errors
    /// Fails when the node is unknown.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.clear_children(node)?;
        let text_node = self.create_text(text);
        self.append_child(node, text_node)
    }

    // ------------------------------------------------------------------
    // Geometry, viewport and page state
    // ------------------------------------------------------------------

    /// The layout box of a node; `None` until the host lays it out.
    pub fn rect(&self, node: NodeId) -> Option<Rect> {
        self.rects.get(&node).copied()
    }

    /// Rendered width; zero for nodes that are not laid out.
    pub fn width(&self, node: NodeId) -> f64 {
        self.rect(node).map_or(0.0, |rect| rect.width)
    }

    /// Set the layout box of a node and notify resize observers when it changed.
    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        if !self.exists(node) {
            return;
        }
        if self.rects.insert(node, rect) != Some(rect) {
            trace!("resized {node:?} to {rect:?}");
            self.emit(&DomEvent::Resized(node));
        }
    }

    pub const fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Scroll the viewport to a vertical offset.
    pub fn scroll_to(&mut self, offset: f64) {
        self.viewport.y = offset.max(0.0);
        self.emit(&DomEvent::Scrolled);
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport.width = width;
        self.viewport.height = height;
        self.emit(&DomEvent::Scrolled);
    }

    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hide or show the tab.
    pub fn set_hidden(&mut self, hidden: bool) {
        if self.hidden != hidden {
            self.hidden = hidden;
            self.emit(&DomEvent::VisibilityChanged { hidden });
        }
    }

    /// Dispatch a click at `target`.
    pub fn click(&mut self, target: NodeId) {
        self.emit(&DomEvent::Click { target });
    }

    /// Dispatch non-click user input.
    pub fn interact(&mut self, kind: InteractionKind) {
        self.emit(&DomEvent::Interaction(kind));
    }
}
