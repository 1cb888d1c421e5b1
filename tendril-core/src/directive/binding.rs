//! Directive bindings.
//!
//! One binding exists per matched element/attribute/directive triple. It
//! owns everything the directive set up (watchers, listeners, rendered
//! nodes and cleanup callbacks) so that tearing it down is a single step.
//!
//! # States
//!
//! `Matched` while the directive callback runs, `Bound` once it succeeded,
//! `Unbound` after teardown. An unbound binding is never revived; a later
//! scan creates a new one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dom::{ListenerId, Node};
use crate::reactive::Watcher;

/// Unique identifier for a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl BindingId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Matched,
    Bound,
    Unbound,
}

/// Read-only view of a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub id: BindingId,
    pub directive: String,
    pub attribute: String,
    pub state: BindingState,
    pub watchers: usize,
    pub listeners: usize,
    pub rendered: usize,
}

/// What a binding has set up and must undo.
#[derive(Default)]
pub(crate) struct Resources {
    pub(crate) watchers: Vec<Watcher>,
    pub(crate) listeners: Vec<ListenerId>,
    pub(crate) rendered: Vec<Node>,
    pub(crate) cleanups: Vec<Box<dyn FnOnce()>>,
}

impl Resources {
    pub(crate) fn is_empty(&self) -> bool {
        self.watchers.is_empty()
            && self.listeners.is_empty()
            && self.rendered.is_empty()
            && self.cleanups.is_empty()
    }
}

pub(crate) struct BindingRecord {
    pub(crate) id: BindingId,
    pub(crate) directive: String,
    pub(crate) attribute: String,
    pub(crate) element: Node,
    pub(crate) state: BindingState,
    pub(crate) resources: Resources,
}

impl BindingRecord {
    pub(crate) fn new(directive: &str, attribute: &str, element: &Node) -> Self {
        Self {
            id: BindingId::new(),
            directive: directive.to_string(),
            attribute: attribute.to_string(),
            element: element.clone(),
            state: BindingState::Matched,
            resources: Resources::default(),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state != BindingState::Unbound
    }

    pub(crate) fn info(&self) -> BindingInfo {
        BindingInfo {
            id: self.id,
            directive: self.directive.clone(),
            attribute: self.attribute.clone(),
            state: self.state,
            watchers: self.resources.watchers.len(),
            listeners: self.resources.listeners.len(),
            rendered: self.resources.rendered.len(),
        }
    }
}
