//! Bijection between external node names and dense integer ids.

use std::collections::HashMap;

/// Interns names to ids `0..len()` in first-seen order.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeIds {
    by_name: HashMap<String, usize>,
    names: Vec<String>,
}

impl NodeIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, assigning the next free id if it is new.
    pub fn get_or_insert(&mut self, name: &str) -> usize {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
