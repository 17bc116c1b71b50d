//! Records: the fixed-width tuples streamed between operators.

use crate::types::{EdgeId, NodeId, RelationId};
use crate::value::Value;

/// Edge reference carried in a record slot. Endpoints and relation ride
/// along so downstream operators avoid a store lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EdgeRef {
    pub id: EdgeId,
    pub src: NodeId,
    pub dest: NodeId,
    pub relation: RelationId,
}

/// One record slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Slot {
    #[default]
    Empty,
    Scalar(Value),
    Node(NodeId),
    Edge(EdgeRef),
}

/// Fixed-width tuple of slots. Width is fixed per execution plan; cloning
/// is a deep copy since scalar values own their data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    slots: Vec<Slot>,
}

impl Record {
    pub fn new(width: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; width],
        }
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, idx: usize) -> &Slot {
        &self.slots[idx]
    }

    pub fn set(&mut self, idx: usize, slot: Slot) {
        self.slots[idx] = slot;
    }

    pub fn set_node(&mut self, idx: usize, id: NodeId) {
        self.slots[idx] = Slot::Node(id);
    }

    pub fn set_edge(&mut self, idx: usize, edge: EdgeRef) {
        self.slots[idx] = Slot::Edge(edge);
    }

    pub fn set_scalar(&mut self, idx: usize, value: Value) {
        self.slots[idx] = Slot::Scalar(value);
    }

    pub fn node(&self, idx: usize) -> Option<NodeId> {
        match &self.slots[idx] {
            Slot::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn edge(&self, idx: usize) -> Option<EdgeRef> {
        match &self.slots[idx] {
            Slot::Edge(e) => Some(*e),
            _ => None,
        }
    }

    /// Byte key identifying this record's contents, used by distinct.
    pub fn dedup_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.slots.len() * 9);
        for slot in &self.slots {
            match slot {
                Slot::Empty => key.push(0),
                Slot::Scalar(v) => {
                    key.push(1);
                    v.encode_index_key(&mut key);
                }
                Slot::Node(id) => {
                    key.push(2);
                    key.extend_from_slice(&id.to_be_bytes());
                }
                Slot::Edge(e) => {
                    key.push(3);
                    key.extend_from_slice(&e.id.to_be_bytes());
                }
            }
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_deep() {
        let mut a = Record::new(2);
        a.set_scalar(0, Value::String("x".into()));
        a.set_node(1, 7);
        let mut b = a.clone();
        b.set_scalar(0, Value::String("y".into()));
        assert_eq!(a.get(0), &Slot::Scalar(Value::String("x".into())));
        assert_eq!(b.node(1), Some(7));
    }

    #[test]
    fn dedup_key_distinguishes_slots() {
        let mut a = Record::new(1);
        a.set_node(0, 1);
        let mut b = Record::new(1);
        b.set_scalar(0, Value::Int(1));
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
