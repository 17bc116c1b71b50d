//! Compact per-entity attribute storage.

use crate::types::AttrId;
use crate::value::Value;

/// Ordered mapping from attribute id to value, owned by exactly one graph
/// entity. Entries are kept sorted by attribute id so ordinal access is
/// stable across serialization versions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttrSet {
    entries: Vec<(AttrId, Value)>,
}

impl AttrSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, attr: AttrId) -> Option<&Value> {
        self.entries
            .binary_search_by_key(&attr, |(id, _)| *id)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    /// Entry at ordinal position `idx` in ascending attribute-id order.
    pub fn get_idx(&self, idx: usize) -> Option<(AttrId, &Value)> {
        self.entries.get(idx).map(|(id, v)| (*id, v))
    }

    /// Inserts or replaces. Setting `Value::Null` removes the attribute.
    /// Returns true if the set changed.
    pub fn set(&mut self, attr: AttrId, value: Value) -> bool {
        if value.is_null() {
            return self.remove(attr);
        }
        match self.entries.binary_search_by_key(&attr, |(id, _)| *id) {
            Ok(idx) => {
                if self.entries[idx].1 == value {
                    false
                } else {
                    self.entries[idx].1 = value;
                    true
                }
            }
            Err(idx) => {
                self.entries.insert(idx, (attr, value));
                true
            }
        }
    }

    pub fn remove(&mut self, attr: AttrId) -> bool {
        match self.entries.binary_search_by_key(&attr, |(id, _)| *id) {
            Ok(idx) => {
                self.entries.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates entries in ascending attribute-id order.
    pub fn iter(&self) -> impl Iterator<Item = (AttrId, &Value)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }
}

impl FromIterator<(AttrId, Value)> for AttrSet {
    fn from_iter<T: IntoIterator<Item = (AttrId, Value)>>(iter: T) -> Self {
        let mut set = AttrSet::new();
        for (id, value) in iter {
            set.set(id, value);
        }
        set
    }
}
