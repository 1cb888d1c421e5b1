//! Directive Engine
//!
//! Directives attach behavior to markup. Each one is a matcher, which
//! decides per attribute whether it applies and with which name pattern,
//! plus an async callback that runs once per match. A match is a
//! *binding*: it owns the watchers, listeners and rendered nodes its
//! callback set up, and tearing it down releases all of them.
//!
//! # Naming
//!
//! Attribute names follow [`DirectiveConfig`](crate::config::DirectiveConfig):
//! `x-bind:title` in long form, `:title` or `[title]` as shorthand. Use
//! [`DirectivePattern`] to build patterns that respect the configured
//! prefix and separator.
//!
//! # Built-ins
//!
//! [`DirectiveEngine::with_builtins`] registers `data`, `bind`, `on`, `if`
//! and `for`.

mod binding;
mod builtin;
mod context;
mod engine;
mod matcher;

pub use binding::{BindingId, BindingInfo, BindingState};
pub use builtin::DATA_PRIORITY;
pub use context::{BindingHandle, DirectiveContext};
pub use engine::{
    BindingFailure, Directive, DirectiveEngine, DirectiveError, EngineError, ScanReport,
};
pub use matcher::{Argument, DirectivePattern, MatcherContext, Matches};
