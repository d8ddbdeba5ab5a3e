use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::graph::Value;

/// Identifier table: name → most recently bound node.
///
/// Rebinding replaces the entry but never touches the node previously bound,
/// which stays valid wherever it is already referenced. Iteration follows the
/// order in which names were first bound.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    slots: HashMap<String, usize>,
    bindings: Vec<(String, Value)>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            slots: HashMap::new(),
            bindings: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|&slot| &self.bindings[slot].1)
    }

    /// Like [`get`](Self::get), but an unbound name is an error.
    pub fn lookup(&self, name: &str) -> Result<Value> {
        self.get(name).cloned().ok_or_else(|| GraphError::unresolved(name))
    }

    /// Bind `name` to `value`, returning the node it was bound to before.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        match self.slots.get(&name) {
            Some(&slot) => Some(std::mem::replace(&mut self.bindings[slot].1, value)),
            None => {
                self.slots.insert(name.clone(), self.bindings.len());
                self.bindings.push((name, value));
                None
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.bindings.iter().map(|(_, value)| value)
    }
}
