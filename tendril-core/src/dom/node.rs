//! Document Nodes
//!
//! A minimal document tree: typed nodes behind `Rc` handles, ordered
//! attributes, weak parent links and per-node event listeners.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::event::{Event, Listener, ListenerId};

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The kind of node in the document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// A whole document. Its first element child is the document element.
    Document,
    Element,
    Text,
    Comment,
}

struct NodeData {
    /// Lower-case tag name; empty for non-elements.
    tag: String,
    /// Character data for text and comment nodes.
    text: String,
    attributes: IndexMap<String, String>,
    children: Vec<Node>,
    parent: Weak<NodeInner>,
    listeners: Vec<Listener>,
}

struct NodeInner {
    id: NodeId,
    node_type: NodeType,
    data: RefCell<NodeData>,
}

/// Shared handle to a node. Clones refer to the same node.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

impl Node {
    fn with_type(node_type: NodeType, tag: &str, text: &str) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                id: NodeId::new(),
                node_type,
                data: RefCell::new(NodeData {
                    tag: tag.to_ascii_lowercase(),
                    text: text.to_string(),
                    attributes: IndexMap::new(),
                    children: Vec::new(),
                    parent: Weak::new(),
                    listeners: Vec::new(),
                }),
            }),
        }
    }

    /// Create an empty document node.
    pub fn document() -> Self {
        Self::with_type(NodeType::Document, "", "")
    }

    pub fn element(tag: &str) -> Self {
        Self::with_type(NodeType::Element, tag, "")
    }

    pub fn text(text: &str) -> Self {
        Self::with_type(NodeType::Text, "", text)
    }

    pub fn comment(text: &str) -> Self {
        Self::with_type(NodeType::Comment, "", text)
    }

    /// Builder form of [`Node::set_attribute`].
    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder form of [`Node::append_child`].
    pub fn with_child(self, child: Node) -> Self {
        self.append_child(&child);
        self
    }

    /// Builder that appends a text child.
    pub fn with_text(self, text: &str) -> Self {
        self.append_child(&Node::text(text));
        self
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn node_type(&self) -> NodeType {
        self.inner.node_type
    }

    pub fn is_element(&self) -> bool {
        self.inner.node_type == NodeType::Element
    }

    /// Lower-case tag name, or `None` for non-elements.
    pub fn tag_name(&self) -> Option<String> {
        self.is_element().then(|| self.inner.data.borrow().tag.clone())
    }

    pub fn is_template(&self) -> bool {
        self.is_element() && self.inner.data.borrow().tag == "template"
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.data.borrow().attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.data.borrow().attributes.contains_key(name)
    }

    /// Snapshot of all attributes in document order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .data
            .borrow()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Set an attribute. Ignored on non-element nodes.
    pub fn set_attribute(&self, name: &str, value: &str) {
        if !self.is_element() {
            return;
        }
        self.inner
            .data
            .borrow_mut()
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.inner.data.borrow_mut().attributes.shift_remove(name)
    }

    // ------------------------------------------------------------------
    // Tree structure
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .data
            .borrow()
            .parent
            .upgrade()
            .map(|inner| Node { inner })
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<Node> {
        self.inner.data.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.data.borrow().children.len()
    }

    pub fn first_element_child(&self) -> Option<Node> {
        self.inner
            .data
            .borrow()
            .children
            .iter()
            .find(|c| c.is_element())
            .cloned()
    }

    /// For a document node, its root element; for anything else, `None`.
    pub fn document_element(&self) -> Option<Node> {
        match self.node_type() {
            NodeType::Document => self.first_element_child(),
            _ => None,
        }
    }

    /// Append `child`, detaching it from its current parent first.
    pub fn append_child(&self, child: &Node) {
        child.remove();
        child.inner.data.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.inner.data.borrow_mut().children.push(child.clone());
    }

    /// Insert `sibling` directly after this node in its parent.
    ///
    /// Returns `false` if this node has no parent.
    pub fn insert_after(&self, sibling: &Node) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        sibling.remove();

        let mut data = parent.inner.data.borrow_mut();
        let index = data
            .children
            .iter()
            .position(|c| c.ptr_eq(self))
            .map_or(data.children.len(), |i| i + 1);
        data.children.insert(index, sibling.clone());
        sibling.inner.data.borrow_mut().parent = Rc::downgrade(&parent.inner);
        true
    }

    /// Detach this node from its parent, if any.
    ///
    /// Bindings on the subtree stay alive. Use
    /// [`DirectiveEngine::remove`](crate::directive::DirectiveEngine::remove)
    /// to tear them down as well.
    pub fn remove(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        parent
            .inner
            .data
            .borrow_mut()
            .children
            .retain(|c| !c.ptr_eq(self));
        self.inner.data.borrow_mut().parent = Weak::new();
    }

    /// Check whether `other` is this node or one of its descendants.
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// This node followed by every descendant, in document order.
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let children = node.children();
            stack.extend(children.into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Concatenated character data of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self.node_type() {
            NodeType::Text | NodeType::Comment => self.inner.data.borrow().text.clone(),
            NodeType::Document | NodeType::Element => self
                .descendants()
                .iter()
                .filter(|n| n.node_type() == NodeType::Text)
                .map(|n| n.inner.data.borrow().text.clone())
                .collect(),
        }
    }

    /// Replace the content of this node with `text`.
    ///
    /// Replaced children are detached without teardown, like
    /// [`remove`](Self::remove).
    pub fn set_text_content(&self, text: &str) {
        match self.node_type() {
            NodeType::Text | NodeType::Comment => {
                self.inner.data.borrow_mut().text = text.to_string();
            }
            NodeType::Document | NodeType::Element => {
                for child in self.children() {
                    child.remove();
                }
                if !text.is_empty() {
                    self.append_child(&Node::text(text));
                }
            }
        }
    }

    /// Copy this node and its subtree. Listeners are not copied.
    pub fn deep_clone(&self) -> Node {
        let copy = {
            let data = self.inner.data.borrow();
            let copy = Node::with_type(self.node_type(), &data.tag, &data.text);
            copy.inner.data.borrow_mut().attributes = data.attributes.clone();
            copy
        };
        for child in self.children() {
            copy.append_child(&child.deep_clone());
        }
        copy
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn add_event_listener(
        &self,
        event_type: &str,
        handler: impl Fn(&Event) + 'static,
    ) -> ListenerId {
        let listener = Listener::new(event_type, handler);
        let id = listener.id();
        self.inner.data.borrow_mut().listeners.push(listener);
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut data = self.inner.data.borrow_mut();
        let before = data.listeners.len();
        data.listeners.retain(|l| l.id() != id);
        data.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.data.borrow().listeners.len()
    }

    /// Dispatch `event` at this node.
    ///
    /// Listeners for the event type run on this node, then on each ancestor
    /// if the event bubbles, until propagation is stopped.
    pub fn dispatch_event(&self, event: &Event) {
        event.set_target(self);

        let mut current = Some(self.clone());
        while let Some(node) = current {
            event.set_current_target(&node);

            // Snapshot so handlers may add or remove listeners.
            let handlers: Vec<_> = node
                .inner
                .data
                .borrow()
                .listeners
                .iter()
                .filter(|l| l.event_type() == event.event_type())
                .map(Listener::handler)
                .collect();
            for handler in handlers {
                handler(event);
            }

            if event.propagation_stopped() || !event.bubbles() {
                break;
            }
            current = node.parent();
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node_type() {
            NodeType::Element => write!(f, "<{} {}>", self.inner.data.borrow().tag, self.inner.id),
            NodeType::Document => write!(f, "#document {}", self.inner.id),
            NodeType::Text => write!(f, "#text {:?}", self.inner.data.borrow().text),
            NodeType::Comment => write!(f, "#comment {:?}", self.inner.data.borrow().text),
        }
    }
}
