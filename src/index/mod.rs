//! Attribute indices over nodes and edges, with asynchronous batched
//! population that yields the graph lock between batches.

mod populate;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tracing::info;

use crate::attrset::AttrSet;
use crate::types::{AttrId, EntityId, LabelId};
use crate::value::Value;

pub use populate::{populate, spawn_populate};

/// Index lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum IndexState {
    Created = 0,
    Populating = 1,
    Active = 2,
    Dropped = 3,
}

impl IndexState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => IndexState::Created,
            1 => IndexState::Populating,
            2 => IndexState::Active,
            _ => IndexState::Dropped,
        }
    }
}

/// Whether an index covers nodes of a label or edges of a relation type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexTarget {
    Node,
    Edge,
}

/// Flavor of the index payload. Range indices serve scan operators;
/// vector-flavored indices are populated through the same protocol but
/// queried elsewhere.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexKind {
    Range,
    Vector,
}

/// Value-ordered attribute index. Keys are the order-preserving encoding of
/// `(attr, value)`; postings are entity-id sets, so indexing an entity twice
/// is harmless while missing one is not.
pub struct Index {
    target: IndexTarget,
    /// Label id for node indices, relation id for edge indices.
    label: LabelId,
    attrs: Vec<AttrId>,
    kind: IndexKind,
    state: AtomicU8,
    map: Mutex<BTreeMap<Vec<u8>, BTreeSet<EntityId>>>,
}

impl Index {
    pub fn new(target: IndexTarget, label: LabelId, attrs: Vec<AttrId>, kind: IndexKind) -> Self {
        Self {
            target,
            label,
            attrs,
            kind,
            state: AtomicU8::new(IndexState::Created as u8),
            map: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn target(&self) -> IndexTarget {
        self.target
    }

    pub fn label(&self) -> LabelId {
        self.label
    }

    pub fn attrs(&self) -> &[AttrId] {
        &self.attrs
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: IndexState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Transitions `Populating -> Active`; a state changed underneath the
    /// populator (drop, re-create) leaves the index untouched.
    pub fn enable(&self) -> bool {
        let flipped = self
            .state
            .compare_exchange(
                IndexState::Populating as u8,
                IndexState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if flipped {
            info!(label = self.label, "index enabled");
        }
        flipped
    }

    fn key(attr: AttrId, value: &Value) -> Vec<u8> {
        let mut key = Vec::with_capacity(16);
        key.extend_from_slice(&attr.to_be_bytes());
        value.encode_index_key(&mut key);
        key
    }

    /// Indexes every covered attribute present on the entity.
    pub fn index_entity(&self, id: EntityId, attrs: &AttrSet) {
        let mut map = self.map.lock();
        for &attr in &self.attrs {
            if let Some(value) = attrs.get(attr) {
                map.entry(Self::key(attr, value)).or_default().insert(id);
            }
        }
    }

    pub fn remove_entity(&self, id: EntityId, attrs: &AttrSet) {
        let mut map = self.map.lock();
        for &attr in &self.attrs {
            if let Some(value) = attrs.get(attr) {
                let key = Self::key(attr, value);
                if let Some(postings) = map.get_mut(&key) {
                    postings.remove(&id);
                    if postings.is_empty() {
                        map.remove(&key);
                    }
                }
            }
        }
    }

    /// Re-indexes an entity whose attribute set changed.
    pub fn update_entity(&self, id: EntityId, before: &AttrSet, after: &AttrSet) {
        self.remove_entity(id, before);
        self.index_entity(id, after);
    }

    /// Entity ids holding exactly `value` for `attr`.
    pub fn lookup(&self, attr: AttrId, value: &Value) -> Vec<EntityId> {
        let map = self.map.lock();
        map.get(&Self::key(attr, value))
            .map(|postings| postings.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Entity ids whose `attr` value falls in `[lo, hi]` under the value
    /// total order.
    pub fn lookup_range(&self, attr: AttrId, lo: &Value, hi: &Value) -> Vec<EntityId> {
        let map = self.map.lock();
        let lo_key = Self::key(attr, lo);
        let hi_key = Self::key(attr, hi);
        let mut out = Vec::new();
        for (_, postings) in map.range((Bound::Included(lo_key), Bound::Included(hi_key))) {
            out.extend(postings.iter().copied());
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Distinct indexed entity count, for statistics.
    pub fn entity_count(&self) -> usize {
        let map = self.map.lock();
        let mut all = BTreeSet::new();
        for postings in map.values() {
            all.extend(postings.iter().copied());
        }
        all.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(AttrId, i64)]) -> AttrSet {
        pairs
            .iter()
            .map(|&(a, v)| (a, Value::Int(v)))
            .collect()
    }

    #[test]
    fn index_and_lookup() {
        let idx = Index::new(IndexTarget::Node, 0, vec![1, 2], IndexKind::Range);
        idx.index_entity(10, &attrs(&[(1, 5), (2, 7)]));
        idx.index_entity(11, &attrs(&[(1, 5)]));
        assert_eq!(idx.lookup(1, &Value::Int(5)), vec![10, 11]);
        assert_eq!(idx.lookup(2, &Value::Int(7)), vec![10]);
        assert_eq!(idx.lookup(2, &Value::Int(5)), Vec::<EntityId>::new());
        assert_eq!(idx.entity_count(), 2);
    }

    #[test]
    fn double_indexing_is_harmless() {
        let idx = Index::new(IndexTarget::Node, 0, vec![1], IndexKind::Range);
        let a = attrs(&[(1, 5)]);
        idx.index_entity(10, &a);
        idx.index_entity(10, &a);
        assert_eq!(idx.lookup(1, &Value::Int(5)), vec![10]);
    }

    #[test]
    fn update_moves_postings() {
        let idx = Index::new(IndexTarget::Node, 0, vec![1], IndexKind::Range);
        let before = attrs(&[(1, 5)]);
        let after = attrs(&[(1, 6)]);
        idx.index_entity(10, &before);
        idx.update_entity(10, &before, &after);
        assert!(idx.lookup(1, &Value::Int(5)).is_empty());
        assert_eq!(idx.lookup(1, &Value::Int(6)), vec![10]);
    }

    #[test]
    fn range_lookup_spans_numeric_variants() {
        let idx = Index::new(IndexTarget::Node, 0, vec![1], IndexKind::Range);
        idx.index_entity(1, &[(1, Value::Float(1.5))].into_iter().collect());
        idx.index_entity(2, &[(1, Value::Int(2))].into_iter().collect());
        idx.index_entity(3, &[(1, Value::Int(9))].into_iter().collect());
        assert_eq!(
            idx.lookup_range(1, &Value::Int(1), &Value::Int(5)),
            vec![1, 2]
        );
    }

    #[test]
    fn enable_requires_populating() {
        let idx = Index::new(IndexTarget::Node, 0, vec![1], IndexKind::Range);
        assert!(!idx.enable());
        idx.set_state(IndexState::Populating);
        assert!(idx.enable());
        assert_eq!(idx.state(), IndexState::Active);
        assert!(!idx.enable());
    }
}
