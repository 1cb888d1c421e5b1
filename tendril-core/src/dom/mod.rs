//! Document Tree
//!
//! The markup the directive engine binds against: a small node tree with
//! attributes and events, plus the async [`traverse`] protocol used to
//! discover bindable elements.

mod event;
mod node;
mod traverse;

pub use event::{Event, ListenerId};
pub use node::{Node, NodeId, NodeType};
pub use traverse::{traverse, Descent, NodeFailure, TraversalError};
