//! Parsed-expression cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::ast::Expr;
use super::parser::parse;
use super::ParseError;

/// Parses each distinct source string once.
///
/// Parse failures are not cached; a failing source is re-parsed (and fails
/// again) on every request.
#[derive(Default)]
pub struct ExpressionCache {
    entries: RefCell<HashMap<String, Rc<Expr>>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, source: &str) -> Result<Rc<Expr>, ParseError> {
        if let Some(expr) = self.entries.borrow().get(source) {
            return Ok(Rc::clone(expr));
        }
        let expr = Rc::new(parse(source)?);
        tracing::trace!(source, "expression compiled");
        self.entries
            .borrow_mut()
            .insert(source.to_string(), Rc::clone(&expr));
        Ok(expr)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_each_source_once() {
        let cache = ExpressionCache::new();
        let a = cache.compile("x + 1").unwrap();
        let b = cache.compile("x + 1").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = ExpressionCache::new();
        assert!(cache.compile("x +").is_err());
        assert!(cache.is_empty());
    }
}
