//! Lexical scopes for expression evaluation.
//!
//! A scope is a chain of frames. Lookups walk outward from the innermost
//! frame; assignment updates the frame that defines the name.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::value::Value;

struct Frame {
    vars: RefCell<IndexMap<String, Value>>,
    parent: Option<Scope>,
}

/// Shared handle to a scope frame.
#[derive(Clone)]
pub struct Scope {
    frame: Rc<Frame>,
}

impl Scope {
    /// Create a root scope with no parent.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Scope>) -> Self {
        Self {
            frame: Rc::new(Frame {
                vars: RefCell::new(IndexMap::new()),
                parent,
            }),
        }
    }

    /// Create an empty frame whose parent is this scope.
    pub fn child(&self) -> Scope {
        Self::with_parent(Some(self.clone()))
    }

    /// Create a child frame pre-populated with `entries`.
    pub fn child_with<I, K>(&self, entries: I) -> Scope
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let scope = self.child();
        for (name, value) in entries {
            scope.define(name, value);
        }
        scope
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.frame.parent.as_ref()
    }

    /// Define (or shadow) a name in this frame.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.frame.vars.borrow_mut().insert(name.into(), value);
    }

    /// Look a name up through the chain.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.frame.vars.borrow().get(name) {
                return Some(value.clone());
            }
            scope = current.parent();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Assign to an existing name in the nearest defining frame.
    ///
    /// Returns `false` if no frame defines `name`.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut scope = Some(self);
        while let Some(current) = scope {
            let mut vars = current.frame.vars.borrow_mut();
            if let Some(slot) = vars.get_mut(name) {
                let previous = std::mem::replace(slot, value);
                drop(vars);
                drop(previous);
                return true;
            }
            drop(vars);
            scope = current.parent();
        }
        false
    }

    /// Names defined directly in this frame.
    pub fn local_names(&self) -> Vec<String> {
        self.frame.vars.borrow().keys().cloned().collect()
    }

    /// Number of frames from this one to the root, inclusive.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = Some(self);
        while let Some(current) = scope {
            depth += 1;
            scope = current.parent();
        }
        depth
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("locals", &self.local_names())
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward() {
        let root = Scope::new();
        root.define("a", Value::from(1));
        let child = root.child_with([("b", Value::from(2))]);

        assert_eq!(child.lookup("a"), Some(Value::from(1)));
        assert_eq!(child.lookup("b"), Some(Value::from(2)));
        assert_eq!(root.lookup("b"), None);
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn shadowing_and_assignment() {
        let root = Scope::new();
        root.define("x", Value::from(1));
        let child = root.child();

        // Assignment reaches the defining frame
        assert!(child.assign("x", Value::from(2)));
        assert_eq!(root.lookup("x"), Some(Value::from(2)));

        // Shadowing leaves the outer binding intact
        child.define("x", Value::from(3));
        assert_eq!(child.lookup("x"), Some(Value::from(3)));
        assert_eq!(root.lookup("x"), Some(Value::from(2)));

        assert!(!child.assign("missing", Value::Null));
    }
}
