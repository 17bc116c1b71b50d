//! Relation-matrix cell encoding for parallel edges.
//!
//! A relation matrix cell stores a `u64` that is either a direct edge id or,
//! when the top bit is set, an index into the relation's multi-edge arena.
//! The tagged form only ever appears inside matrix cells and on the snapshot
//! wire; everywhere else the decoded [`EdgeSlot`] sum is used.

use smallvec::SmallVec;

use crate::types::EdgeId;

/// Tag bit marking an arena handle rather than a direct edge id.
pub const MULTI_EDGE_BIT: u64 = 1 << 63;

/// Decoded relation-matrix cell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeSlot {
    /// Cell holds the single edge between its endpoints.
    Single(EdgeId),
    /// Cell holds an arena handle to the edges sharing its endpoints.
    Multi(usize),
}

impl EdgeSlot {
    pub fn decode(cell: u64) -> Self {
        if cell & MULTI_EDGE_BIT != 0 {
            EdgeSlot::Multi((cell & !MULTI_EDGE_BIT) as usize)
        } else {
            EdgeSlot::Single(cell)
        }
    }

    pub fn encode(self) -> u64 {
        match self {
            EdgeSlot::Single(id) => {
                debug_assert_eq!(id & MULTI_EDGE_BIT, 0, "edge id overflows slot encoding");
                id
            }
            EdgeSlot::Multi(idx) => idx as u64 | MULTI_EDGE_BIT,
        }
    }
}

/// Arena of edge-id lists referenced by multi-edge cells.
#[derive(Clone, Debug, Default)]
pub struct MultiArena {
    lists: Vec<SmallVec<[EdgeId; 2]>>,
    free: Vec<usize>,
}

impl MultiArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a list seeded with two edges, returning its handle.
    pub fn alloc(&mut self, first: EdgeId, second: EdgeId) -> usize {
        let mut list = SmallVec::new();
        list.push(first);
        list.push(second);
        match self.free.pop() {
            Some(idx) => {
                self.lists[idx] = list;
                idx
            }
            None => {
                self.lists.push(list);
                self.lists.len() - 1
            }
        }
    }

    pub fn push(&mut self, idx: usize, edge: EdgeId) {
        self.lists[idx].push(edge);
    }

    pub fn edges(&self, idx: usize) -> &[EdgeId] {
        &self.lists[idx]
    }

    /// Removes one edge from a list. Returns the remaining count.
    pub fn remove(&mut self, idx: usize, edge: EdgeId) -> usize {
        let list = &mut self.lists[idx];
        if let Some(pos) = list.iter().position(|&e| e == edge) {
            list.remove(pos);
        }
        list.len()
    }

    /// Releases a list whose cell was downgraded or cleared.
    pub fn release(&mut self, idx: usize) {
        self.lists[idx].clear();
        self.free.push(idx);
    }
}
