//! Tendril Core
//!
//! This crate provides the core runtime for the Tendril markup reactivity
//! toolkit. It implements:
//!
//! - A signal store with explicit dependency tracking and batched, coalesced
//!   notification
//! - A module registry with lazy, memoized, cycle-checked resolution
//! - An async document traverser with per-branch descent control
//! - A directive engine that binds attributes to behavior, with built-in
//!   `data`, `bind`, `on`, `if` and `for` directives
//!
//! Everything is single-threaded: handles are `Rc`-based and futures are
//! `!Send`. Drive them on a current-thread executor.
//!
//! # Architecture
//!
//! - `reactive`: signals, watchers and tracking
//! - `registry`: modules and capabilities
//! - `dom`: the node tree and the traverser
//! - `expr`: the expression language directives evaluate
//! - `directive`: the directive engine and built-ins
//! - `app`: start-up control flow tying the above together
//!
//! # Example
//!
//! ```rust,ignore
//! use tendril_core::{App, Config, Node, Event};
//!
//! let button = Node::element("button").with_attribute("@click", "count.value++");
//! let label = Node::element("span").with_attribute(":text", "count");
//! let document = Node::document().with_child(
//!     Node::element("div")
//!         .with_attribute("x-data", "{ count: signal(0) }")
//!         .with_child(button.clone())
//!         .with_child(label.clone()),
//! );
//!
//! let app = App::new(document, Config::default())?;
//! app.start(Vec::<String>::new()).await?;
//!
//! button.dispatch_event(&Event::new("click"));
//! assert_eq!(label.text_content(), "1");
//! ```

pub mod app;
pub mod config;
pub mod directive;
pub mod dom;
pub mod error;
pub mod expr;
pub mod reactive;
pub mod registry;

pub use app::{App, StartReport};
pub use config::{Config, ConfigError, DirectiveConfig, SignalConfig};
pub use directive::{Directive, DirectiveContext, DirectiveEngine, DirectiveError, EngineError};
pub use dom::{traverse, Descent, Event, Node, NodeType};
pub use error::{Error, Result};
pub use expr::{evaluate, Scope, Value};
pub use reactive::{Signal, Store, StoreError, Tracker, Watcher};
pub use registry::{Capabilities, ModuleContext, Registry, RegistryError, ResolveOptions};
