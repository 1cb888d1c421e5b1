//! Events and listeners.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::node::Node;

/// Identifier returned by [`Node::add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct Listener {
    id: ListenerId,
    event_type: String,
    handler: Rc<dyn Fn(&Event)>,
}

impl Listener {
    pub(crate) fn new(event_type: &str, handler: impl Fn(&Event) + 'static) -> Self {
        Self {
            id: ListenerId::new(),
            event_type: event_type.to_string(),
            handler: Rc::new(handler),
        }
    }

    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn event_type(&self) -> &str {
        &self.event_type
    }

    pub(crate) fn handler(&self) -> Rc<dyn Fn(&Event)> {
        Rc::clone(&self.handler)
    }
}

struct EventInner {
    event_type: String,
    bubbles: bool,
    detail: serde_json::Value,
    target: RefCell<Option<Node>>,
    current_target: RefCell<Option<Node>>,
    propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

/// A dispatched event. Clones share dispatch state.
#[derive(Clone)]
pub struct Event {
    inner: Rc<EventInner>,
}

impl Event {
    /// A non-bubbling event of the given type.
    pub fn new(event_type: &str) -> Self {
        Self::build(event_type, false, serde_json::Value::Null)
    }

    /// An event that bubbles to ancestors after the target.
    pub fn bubbling(event_type: &str) -> Self {
        Self::build(event_type, true, serde_json::Value::Null)
    }

    /// Attach a payload, readable from expressions as `$event.detail`.
    pub fn with_detail(self, detail: serde_json::Value) -> Self {
        Self::build(&self.inner.event_type, self.inner.bubbles, detail)
    }

    fn build(event_type: &str, bubbles: bool, detail: serde_json::Value) -> Self {
        Self {
            inner: Rc::new(EventInner {
                event_type: event_type.to_string(),
                bubbles,
                detail,
                target: RefCell::new(None),
                current_target: RefCell::new(None),
                propagation_stopped: Cell::new(false),
                default_prevented: Cell::new(false),
            }),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.inner.event_type
    }

    pub fn bubbles(&self) -> bool {
        self.inner.bubbles
    }

    pub fn detail(&self) -> &serde_json::Value {
        &self.inner.detail
    }

    /// The node the event was dispatched at.
    pub fn target(&self) -> Option<Node> {
        self.inner.target.borrow().clone()
    }

    /// The node whose listeners are currently running.
    pub fn current_target(&self) -> Option<Node> {
        self.inner.current_target.borrow().clone()
    }

    pub(crate) fn set_target(&self, node: &Node) {
        *self.inner.target.borrow_mut() = Some(node.clone());
    }

    pub(crate) fn set_current_target(&self, node: &Node) {
        *self.inner.current_target.borrow_mut() = Some(node.clone());
    }

    pub fn stop_propagation(&self) {
        self.inner.propagation_stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.inner.propagation_stopped.get()
    }

    pub fn prevent_default(&self) {
        self.inner.default_prevented.set(true);
    }

    pub fn is_default_prevented(&self) -> bool {
        self.inner.default_prevented.get()
    }

    pub fn ptr_eq(&self, other: &Event) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.inner.event_type)
            .field("bubbles", &self.inner.bubbles)
            .field("target", &self.target())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_filter_by_type() {
        let button = Node::element("button");
        let clicks = Rc::new(Cell::new(0));

        let c = clicks.clone();
        button.add_event_listener("click", move |_| c.set(c.get() + 1));

        button.dispatch_event(&Event::new("click"));
        button.dispatch_event(&Event::new("keydown"));
        button.dispatch_event(&Event::new("click"));
        assert_eq!(clicks.get(), 2);
    }

    #[test]
    fn bubbling_reaches_ancestors_until_stopped() {
        let inner = Node::element("span");
        let middle = Node::element("div").with_child(inner.clone());
        let outer = Node::element("section").with_child(middle.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));

        for (node, name) in [(&inner, "inner"), (&middle, "middle"), (&outer, "outer")] {
            let seen = seen.clone();
            node.add_event_listener("click", move |event| {
                seen.borrow_mut().push(name);
                if name == "middle" {
                    event.stop_propagation();
                }
            });
        }

        let event = Event::bubbling("click");
        inner.dispatch_event(&event);
        assert_eq!(*seen.borrow(), vec!["inner", "middle"]);
        assert_eq!(event.target(), Some(inner.clone()));
        assert_eq!(event.current_target(), Some(middle));

        // Non-bubbling events stay on the target
        seen.borrow_mut().clear();
        inner.dispatch_event(&Event::new("click"));
        assert_eq!(*seen.borrow(), vec!["inner"]);
    }

    #[test]
    fn removed_listener_is_not_invoked() {
        let node = Node::element("input");
        let calls = Rc::new(Cell::new(0));

        let c = calls.clone();
        let id = node.add_event_listener("input", move |_| c.set(c.get() + 1));
        assert!(node.remove_event_listener(id));
        assert!(!node.remove_event_listener(id));

        node.dispatch_event(&Event::new("input"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn detail_is_carried() {
        let event = Event::new("custom").with_detail(serde_json::json!({ "n": 3 }));
        assert_eq!(event.detail()["n"], 3);
        assert_eq!(event.event_type(), "custom");
    }
}
