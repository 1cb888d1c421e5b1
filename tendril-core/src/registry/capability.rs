//! Capability bundles produced by module factories.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// A single capability: any shared value, downcast by consumers.
pub type Capability = Rc<dyn Any>;

/// Named capabilities returned by one module factory.
#[derive(Clone, Default)]
pub struct Capabilities {
    entries: IndexMap<String, Capability>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: 'static>(mut self, name: &str, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: 'static>(&mut self, name: &str, value: T) {
        self.entries.insert(name.to_string(), Rc::new(value));
    }

    /// Insert an already shared capability.
    pub fn insert_shared(&mut self, name: &str, value: Capability) {
        self.entries.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Capability> {
        self.entries.get(name).cloned()
    }

    /// Get a capability downcast to `T`.
    pub fn get_as<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
        self.get(name)?.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup() {
        let caps = Capabilities::new()
            .with("answer", 42_u32)
            .with("greeting", String::from("hi"));

        assert_eq!(caps.get_as::<u32>("answer").as_deref(), Some(&42));
        assert!(caps.get_as::<u64>("answer").is_none());
        assert_eq!(caps.names().collect::<Vec<_>>(), vec!["answer", "greeting"]);
    }
}
