//! Crate-level error type.
//!
//! Each subsystem keeps its own error enum; [`Error`] wraps them for
//! callers that drive several subsystems at once, such as
//! [`App`](crate::app::App).

use thiserror::Error;

use crate::config::ConfigError;
use crate::directive::{DirectiveError, EngineError};
use crate::expr::{EvalError, ParseError};
use crate::reactive::StoreError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Directive(#[from] DirectiveError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
