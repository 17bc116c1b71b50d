//! Name registries mapping labels, relation types, and attribute names to
//! the small integer ids used by matrices and attribute sets.

use rustc_hash::FxHashMap;

use crate::types::{AttrId, LabelId, RelationId};

/// Bidirectional name <-> id registries. Ids are dense and allocated in
/// registration order; snapshot decode re-registers names in id order.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    labels: Registry,
    relations: Registry,
    attrs: Registry,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_label(&mut self, name: &str) -> LabelId {
        self.labels.intern(name) as LabelId
    }

    pub fn label_id(&self, name: &str) -> Option<LabelId> {
        self.labels.id(name).map(|id| id as LabelId)
    }

    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.labels.name(id as usize)
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn add_relation(&mut self, name: &str) -> RelationId {
        self.relations.intern(name) as RelationId
    }

    pub fn relation_id(&self, name: &str) -> Option<RelationId> {
        self.relations.id(name).map(|id| id as RelationId)
    }

    pub fn relation_name(&self, id: RelationId) -> Option<&str> {
        self.relations.name(id as usize)
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn add_attr(&mut self, name: &str) -> AttrId {
        self.attrs.intern(name) as AttrId
    }

    pub fn attr_id(&self, name: &str) -> Option<AttrId> {
        self.attrs.id(name).map(|id| id as AttrId)
    }

    pub fn attr_name(&self, id: AttrId) -> Option<&str> {
        self.attrs.name(id as usize)
    }

    pub fn attr_count(&self) -> usize {
        self.attrs.len()
    }
}

#[derive(Clone, Debug, Default)]
struct Registry {
    names: Vec<String>,
    ids: FxHashMap<String, usize>,
}

impl Registry {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}
