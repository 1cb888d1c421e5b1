//! Expression Language
//!
//! Attribute values are written in a small JavaScript-like language:
//! literals, member and index access (with optional chaining), calls,
//! arrow functions, the usual unary/binary/logical/conditional operators,
//! assignment and `++`/`--`.
//!
//! Evaluation never consults ambient state. Names resolve through an
//! explicit [`Scope`]; signal reads are recorded only when the
//! [`Evaluator`] is given a [`Tracker`](crate::reactive::Tracker).

mod ast;
mod cache;
mod eval;
mod lexer;
mod parser;
mod scope;
mod value;

use std::fmt;

use chumsky::prelude::{Rich, SimpleSpan};
use thiserror::Error;

use crate::reactive::StoreError;

pub use ast::{
    ArrowBody, ArrowFunction, AssignOp, BinaryOp, Expr, Literal, LogicalOp, Statement, UnaryOp,
    UpdateOp,
};
pub use cache::ExpressionCache;
pub use eval::Evaluator;
pub use lexer::{tokenize, Spanned, Token};
pub use parser::parse;
pub use scope::Scope;
pub use value::{Closure, Function, NativeFunction, Value};

/// A syntax error with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

pub type Span = SimpleSpan;
pub(crate) type LexError<'src> = Rich<'src, char, Span>;
pub(crate) type SyntaxError<'src> = Rich<'src, Token<'src>, Span>;

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    /// The first of the errors chumsky reported.
    pub(crate) fn from_rich<T: fmt::Display>(errors: Vec<Rich<'_, T, Span>>) -> Self {
        errors.into_iter().next().map_or_else(
            || ParseError::new("invalid expression", 0),
            |error| ParseError::new(error.reason().to_string(), error.span().start),
        )
    }
}

/// Errors raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("`{0}` is not defined")]
    UndefinedVariable(String),

    #[error("`{0}` is not a function")]
    NotCallable(String),

    #[error("cannot read property `{property}` of {base}")]
    NullishAccess {
        property: String,
        base: &'static str,
    },

    #[error("invalid assignment target: {0}")]
    InvalidAssignment(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("maximum call depth of {0} exceeded")]
    RecursionLimit(usize),

    #[error("expression nests deeper than {0} levels")]
    NestingLimit(usize),

    #[error("array index {index} is too far past the end of an array of length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    /// Raised by a native function.
    #[error("{0}")]
    Native(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse and evaluate `source` against `scope` without tracking.
pub fn evaluate(source: &str, scope: &Scope) -> Result<Value, crate::Error> {
    let expr = parse(source)?;
    Ok(Evaluator::untracked().eval(&expr, scope)?)
}
