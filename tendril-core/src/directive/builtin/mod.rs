//! Built-in directives.
//!
//! | Directive | Long form       | Shorthand           |
//! |-----------|-----------------|---------------------|
//! | `data`    | `x-data`        |                     |
//! | `bind`    | `x-bind:attr`   | `:attr`, `[attr]`   |
//! | `on`      | `x-on:event`    | `@event`            |
//! | `if`      | `x-if` on `<template>`  | `:if`       |
//! | `for`     | `x-for` on `<template>` | `:for`      |

mod bind;
mod data;
mod on;
mod template;

use super::engine::{DirectiveEngine, EngineError};

/// Priority of `data`; it runs before any other directive on an element.
pub const DATA_PRIORITY: i32 = -100;

/// Register every built-in directive on `engine`.
pub fn register_builtins(engine: &DirectiveEngine) -> Result<(), EngineError> {
    let config = engine.config().clone();
    engine.register_directive("data", data::directive(&config)?)?;
    engine.register_directive("bind", bind::directive(&config)?)?;
    engine.register_directive("on", on::directive(&config)?)?;
    engine.register_directive("if", template::conditional(&config)?)?;
    engine.register_directive("for", template::each(&config)?)?;
    Ok(())
}
