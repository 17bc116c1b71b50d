//! Graph facade: entity pools, label and relation delta-matrices, schema,
//! and the reader-writer lock guarding them all.

mod schema;
mod slot;

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;
use tracing::debug;

use crate::attrset::AttrSet;
use crate::error::{GraphError, Result};
use crate::index::{Index, IndexState, IndexTarget};
use crate::matrix::DeltaMatrix;
use crate::storage::EntityPool;
use crate::types::{AttrId, EdgeId, LabelId, NodeId, RelationId};
use crate::value::Value;

pub use schema::Schema;
pub use slot::{EdgeSlot, MultiArena, MULTI_EDGE_BIT};

/// Matrix synchronization policy.
///
/// - `Nop`: writers never implicitly flush or resize; the caller flushes.
/// - `Resize`: implicit resize on dimension mismatch only (bulk decode).
/// - `FlushResize`: resize plus full flush before reads that require a
///   folded main matrix (steady state).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncPolicy {
    Nop,
    Resize,
    FlushResize,
}

/// Node payload stored in the node pool. The id is the pool key; the label
/// set here is authoritative, the label matrices are derived indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub labels: SmallVec<[LabelId; 4]>,
    pub attrs: AttrSet,
}

/// Edge payload stored in the edge pool.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub src: NodeId,
    pub dest: NodeId,
    pub relation: RelationId,
    pub attrs: AttrSet,
}

/// Per-relation storage: the edge-slot matrix plus the arena backing its
/// multi-edge cells.
#[derive(Debug)]
pub struct RelationStore {
    pub(crate) matrix: DeltaMatrix<u64>,
    pub(crate) arena: MultiArena,
    /// True once any cell has held more than one edge.
    pub(crate) multi: bool,
}

impl RelationStore {
    fn new(dim: u64) -> Self {
        Self {
            matrix: DeltaMatrix::new(dim, dim),
            arena: MultiArena::new(),
            multi: false,
        }
    }

    pub fn matrix(&self) -> &DeltaMatrix<u64> {
        &self.matrix
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Edge ids behind a multi-edge cell handle.
    pub fn arena_edges(&self, handle: usize) -> &[EdgeId] {
        self.arena.edges(handle)
    }

    /// Edge ids stored at `(src, dest)`, expanded through the arena.
    pub fn edges_at(&self, src: NodeId, dest: NodeId) -> SmallVec<[EdgeId; 2]> {
        match self.matrix.get(src, dest).map(EdgeSlot::decode) {
            None => SmallVec::new(),
            Some(EdgeSlot::Single(id)) => {
                let mut out = SmallVec::new();
                out.push(id);
                out
            }
            Some(EdgeSlot::Multi(idx)) => SmallVec::from_slice(self.arena.edges(idx)),
        }
    }
}

/// Everything guarded by the graph lock.
pub struct GraphInner {
    nodes: EntityPool<Node>,
    edges: EntityPool<Edge>,
    labels: Vec<DeltaMatrix<bool>>,
    relations: Vec<RelationStore>,
    /// Boolean OR of all relation matrices.
    adjacency: DeltaMatrix<bool>,
    /// Rows are nodes, columns are labels.
    node_labels: DeltaMatrix<bool>,
    schema: Schema,
    policy: SyncPolicy,
    indices: Vec<Arc<Index>>,
}

impl GraphInner {
    fn new(policy: SyncPolicy) -> Self {
        Self {
            nodes: EntityPool::new(),
            edges: EntityPool::new(),
            labels: Vec::new(),
            relations: Vec::new(),
            adjacency: DeltaMatrix::new(0, 0),
            node_labels: DeltaMatrix::new(0, 0),
            schema: Schema::new(),
            policy,
            indices: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SyncPolicy) {
        self.policy = policy;
    }

    pub fn node_count(&self) -> u64 {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> u64 {
        self.edges.len()
    }

    /// One past the highest node id ever allocated; every matrix dimension
    /// is kept at least this large.
    pub fn node_capacity(&self) -> u64 {
        self.nodes.capacity_end()
    }

    pub fn nodes(&self) -> &EntityPool<Node> {
        &self.nodes
    }

    pub fn edges(&self) -> &EntityPool<Edge> {
        &self.edges
    }

    // -- schema-backed matrix registration ---------------------------------

    /// Registers a label, creating its diagonal matrix.
    pub fn add_label(&mut self, name: &str) -> LabelId {
        let id = self.schema.add_label(name);
        let dim = self.node_capacity();
        while self.labels.len() <= id as usize {
            self.labels.push(DeltaMatrix::new(dim, dim));
        }
        self.node_labels.resize(dim, self.labels.len() as u64);
        id
    }

    /// Registers a relation type, creating its edge-slot matrix.
    pub fn add_relation(&mut self, name: &str) -> RelationId {
        let id = self.schema.add_relation(name);
        let dim = self.node_capacity();
        while self.relations.len() <= id as usize {
            self.relations.push(RelationStore::new(dim));
        }
        id
    }

    pub fn label_matrix(&self, label: LabelId) -> Option<&DeltaMatrix<bool>> {
        self.labels.get(label as usize)
    }

    pub fn relation(&self, relation: RelationId) -> Option<&RelationStore> {
        self.relations.get(relation as usize)
    }

    pub fn adjacency_matrix(&self) -> &DeltaMatrix<bool> {
        &self.adjacency
    }

    pub fn node_label_matrix(&self) -> &DeltaMatrix<bool> {
        &self.node_labels
    }

    fn grow_matrices(&mut self) {
        if self.policy == SyncPolicy::Nop {
            return;
        }
        let dim = self.node_capacity();
        for m in &mut self.labels {
            m.resize(dim, dim);
        }
        for r in &mut self.relations {
            r.matrix.resize(dim, dim);
        }
        self.adjacency.resize(dim, dim);
        self.node_labels.resize(dim, self.labels.len() as u64);
    }

    // -- entity mutation ---------------------------------------------------

    /// Creates a node, staging its label cells in the pending-addition
    /// overlays. Caller holds the write lock.
    pub fn create_node(&mut self, labels: &[LabelId], attrs: AttrSet) -> Result<NodeId> {
        for &l in labels {
            if self.labels.get(l as usize).is_none() {
                return Err(GraphError::InvalidArgument(format!("unknown label id {l}")));
            }
        }
        let id = self.nodes.append(Node {
            labels: SmallVec::from_slice(labels),
            attrs,
        });
        self.grow_matrices();
        for &l in labels {
            self.labels[l as usize].set(id, id, true);
            self.node_labels.set(id, l as u64, true);
        }
        self.index_node_writes(id);
        Ok(id)
    }

    /// Creates an edge, upgrading the relation cell to a multi-edge slot
    /// when the endpoints already connect under this relation.
    pub fn create_edge(
        &mut self,
        src: NodeId,
        dest: NodeId,
        relation: RelationId,
        attrs: AttrSet,
    ) -> Result<EdgeId> {
        if !self.nodes.contains(src) || !self.nodes.contains(dest) {
            return Err(GraphError::NotFound("node"));
        }
        if self.relations.get(relation as usize).is_none() {
            return Err(GraphError::InvalidArgument(format!(
                "unknown relation id {relation}"
            )));
        }
        let id = self.edges.append(Edge {
            src,
            dest,
            relation,
            attrs,
        });
        self.grow_matrices();
        self.place_edge_slot(id, src, dest, relation);
        self.index_edge_writes(id);
        Ok(id)
    }

    fn place_edge_slot(&mut self, id: EdgeId, src: NodeId, dest: NodeId, relation: RelationId) {
        let store = &mut self.relations[relation as usize];
        match store.matrix.get(src, dest).map(EdgeSlot::decode) {
            None => store.matrix.set(src, dest, EdgeSlot::Single(id).encode()),
            Some(EdgeSlot::Single(existing)) => {
                let handle = store.arena.alloc(existing, id);
                store.matrix.set(src, dest, EdgeSlot::Multi(handle).encode());
                store.multi = true;
            }
            Some(EdgeSlot::Multi(handle)) => store.arena.push(handle, id),
        }
        self.adjacency.set(src, dest, true);
    }

    // -- snapshot restore --------------------------------------------------

    /// Places a node at an exact id; snapshot decode only.
    pub fn restore_node(&mut self, id: NodeId, node: Node) {
        let labels = node.labels.clone();
        self.nodes.restore(id, node);
        self.grow_matrices();
        for &l in &labels {
            self.labels[l as usize].set(id, id, true);
        }
    }

    /// Places an edge at an exact id; snapshot decode only.
    pub fn restore_edge(&mut self, id: EdgeId, edge: Edge) -> Result<()> {
        if self.relations.get(edge.relation as usize).is_none() {
            return Err(GraphError::Corruption(format!(
                "edge {id} names unknown relation {}",
                edge.relation
            )));
        }
        let (src, dest, relation) = (edge.src, edge.dest, edge.relation);
        self.edges.restore(id, edge);
        self.grow_matrices();
        self.place_edge_slot(id, src, dest, relation);
        Ok(())
    }

    /// Reserves a deleted id; snapshot decode only.
    pub fn restore_deleted_node(&mut self, id: NodeId) {
        self.nodes.restore_deleted(id);
    }

    /// Reserves a deleted id; snapshot decode only.
    pub fn restore_deleted_edge(&mut self, id: EdgeId) {
        self.edges.restore_deleted(id);
    }

    /// Pre-sizes the entity pools; snapshot decode only.
    pub fn reserve_entities(&mut self, nodes: u64, edges: u64) {
        self.nodes.reserve(nodes);
        self.edges.reserve(edges);
    }

    /// Rebuilds the node-label matrix from the authoritative label sets.
    pub fn rebuild_node_label_matrix(&mut self) {
        let mut scan = self.nodes.scan();
        while let Some(id) = scan.next(&self.nodes) {
            if let Some(node) = self.nodes.get(id) {
                for &l in &node.labels {
                    self.node_labels.set(id, l as u64, true);
                }
            }
        }
    }

    pub fn set_relation_multi(&mut self, relation: RelationId, multi: bool) {
        if let Some(store) = self.relations.get_mut(relation as usize) {
            store.multi = multi;
        }
    }

    /// Deletes an edge, downgrading its multi-edge slot back to a direct id
    /// when one edge remains, or clearing the cell entirely.
    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        let edge = self.edges.delete(id).ok_or(GraphError::NotFound("edge"))?;
        self.unindex_edge(id, &edge);
        let store = &mut self.relations[edge.relation as usize];
        match store.matrix.get(edge.src, edge.dest).map(EdgeSlot::decode) {
            Some(EdgeSlot::Single(stored)) => {
                debug_assert_eq!(stored, id);
                store.matrix.clear(edge.src, edge.dest);
            }
            Some(EdgeSlot::Multi(handle)) => match store.arena.remove(handle, id) {
                1 => {
                    let last = store.arena.edges(handle)[0];
                    store
                        .matrix
                        .set(edge.src, edge.dest, EdgeSlot::Single(last).encode());
                    store.arena.release(handle);
                }
                0 => {
                    store.matrix.clear(edge.src, edge.dest);
                    store.arena.release(handle);
                }
                _ => {}
            },
            None => {
                return Err(GraphError::Corruption(format!(
                    "edge {id} missing from relation matrix {}",
                    edge.relation
                )))
            }
        }
        if !self.any_edge_between(edge.src, edge.dest) {
            self.adjacency.clear(edge.src, edge.dest);
        }
        Ok(())
    }

    /// Deletes a node and every incident edge. Returns the number of edges
    /// removed alongside it.
    pub fn delete_node(&mut self, id: NodeId) -> Result<u64> {
        if !self.nodes.contains(id) {
            return Err(GraphError::NotFound("node"));
        }
        let mut incident = Vec::new();
        let mut scan = self.edges.scan();
        while let Some(eid) = scan.next(&self.edges) {
            if let Some(e) = self.edges.get(eid) {
                if e.src == id || e.dest == id {
                    incident.push(eid);
                }
            }
        }
        for eid in &incident {
            self.delete_edge(*eid)?;
        }
        let node = self.nodes.delete(id).ok_or(GraphError::NotFound("node"))?;
        self.unindex_node(id, &node);
        for &l in &node.labels {
            self.labels[l as usize].clear(id, id);
            self.node_labels.clear(id, l as u64);
        }
        Ok(incident.len() as u64)
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Sets or removes (`Value::Null`) one attribute on a node, keeping
    /// indices current.
    pub fn set_node_attr(&mut self, id: NodeId, attr: AttrId, value: Value) -> Result<bool> {
        let node = self.nodes.get_mut(id).ok_or(GraphError::NotFound("node"))?;
        let labels = node.labels.clone();
        let before = node.attrs.clone();
        let changed = node.attrs.set(attr, value);
        let after = node.attrs.clone();
        if changed {
            for idx in self.write_indices(IndexTarget::Node) {
                if labels.contains(&idx.label()) {
                    idx.update_entity(id, &before, &after);
                }
            }
        }
        Ok(changed)
    }

    /// Sets or removes one attribute on an edge, keeping indices current.
    pub fn set_edge_attr(&mut self, id: EdgeId, attr: AttrId, value: Value) -> Result<bool> {
        let edge = self.edges.get_mut(id).ok_or(GraphError::NotFound("edge"))?;
        let relation = edge.relation;
        let before = edge.attrs.clone();
        let changed = edge.attrs.set(attr, value);
        let after = edge.attrs.clone();
        if changed {
            for idx in self.write_indices(IndexTarget::Edge) {
                if idx.label() == relation {
                    idx.update_entity(id, &before, &after);
                }
            }
        }
        Ok(changed)
    }

    /// Edge ids connecting `src` to `dest` under `relation`.
    pub fn edges_between(
        &self,
        src: NodeId,
        dest: NodeId,
        relation: RelationId,
    ) -> SmallVec<[EdgeId; 2]> {
        self.relations
            .get(relation as usize)
            .map(|r| r.edges_at(src, dest))
            .unwrap_or_default()
    }

    fn any_edge_between(&self, src: NodeId, dest: NodeId) -> bool {
        self.relations.iter().any(|r| r.matrix.contains(src, dest))
    }

    /// True iff any matrix holds staged edits.
    pub fn pending(&self) -> bool {
        self.labels.iter().any(DeltaMatrix::pending)
            || self.relations.iter().any(|r| r.matrix.pending())
            || self.adjacency.pending()
            || self.node_labels.pending()
    }

    /// Flushes every matrix. `force` additionally compacts the entity
    /// free-lists into ascending order.
    pub fn apply_all_pending(&mut self, force: bool) {
        for m in &mut self.labels {
            m.flush();
        }
        for r in &mut self.relations {
            r.matrix.flush();
        }
        self.adjacency.flush();
        self.node_labels.flush();
        if force {
            self.nodes.compact_free_list();
            self.edges.compact_free_list();
        }
        debug!(nodes = self.nodes.len(), edges = self.edges.len(), "matrices flushed");
    }

    // -- indices -----------------------------------------------------------

    pub fn register_index(&mut self, index: Arc<Index>) {
        self.indices.push(index);
    }

    pub fn drop_index(&mut self, target: IndexTarget, label: LabelId) -> Result<()> {
        let pos = self
            .indices
            .iter()
            .position(|i| i.target() == target && i.label() == label)
            .ok_or(GraphError::NotFound("index"))?;
        let idx = self.indices.remove(pos);
        idx.set_state(IndexState::Dropped);
        Ok(())
    }

    pub fn indices(&self) -> &[Arc<Index>] {
        &self.indices
    }

    pub fn find_index(&self, target: IndexTarget, label: LabelId) -> Option<Arc<Index>> {
        self.indices
            .iter()
            .find(|i| i.target() == target && i.label() == label)
            .cloned()
    }

    /// Indices a writer must keep current: populating or active ones.
    fn write_indices(&self, target: IndexTarget) -> Vec<Arc<Index>> {
        self.indices
            .iter()
            .filter(|i| {
                i.target() == target
                    && matches!(i.state(), IndexState::Populating | IndexState::Active)
            })
            .cloned()
            .collect()
    }

    fn index_node_writes(&self, id: NodeId) {
        let node = match self.nodes.get(id) {
            Some(n) => n,
            None => return,
        };
        for idx in self.write_indices(IndexTarget::Node) {
            if node.labels.contains(&idx.label()) {
                idx.index_entity(id, &node.attrs);
            }
        }
    }

    fn index_edge_writes(&self, id: EdgeId) {
        let edge = match self.edges.get(id) {
            Some(e) => e,
            None => return,
        };
        for idx in self.write_indices(IndexTarget::Edge) {
            if idx.label() == edge.relation {
                idx.index_entity(id, &edge.attrs);
            }
        }
    }

    fn unindex_node(&self, id: NodeId, node: &Node) {
        for idx in self.write_indices(IndexTarget::Node) {
            if node.labels.contains(&idx.label()) {
                idx.remove_entity(id, &node.attrs);
            }
        }
    }

    fn unindex_edge(&self, id: EdgeId, edge: &Edge) {
        for idx in self.write_indices(IndexTarget::Edge) {
            if idx.label() == edge.relation {
                idx.remove_entity(id, &edge.attrs);
            }
        }
    }
}

/// A named property graph: shared handle around the lock-guarded state.
pub struct Graph {
    name: String,
    inner: RwLock<GraphInner>,
}

impl Graph {
    pub fn new(name: impl Into<String>, policy: SyncPolicy) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(GraphInner::new(policy)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the shared read lock. No flush runs while any read guard is
    /// held.
    pub fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read()
    }

    /// Acquires the exclusive write lock. Flushing is only legal under this
    /// guard.
    pub fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        Graph::new("g", SyncPolicy::FlushResize)
    }

    #[test]
    fn create_and_fetch() {
        let g = graph();
        let mut w = g.write();
        let person = w.add_label("Person");
        let knows = w.add_relation("KNOWS");
        let a = w.create_node(&[person], AttrSet::new()).unwrap();
        let b = w.create_node(&[person], AttrSet::new()).unwrap();
        let e = w.create_edge(a, b, knows, AttrSet::new()).unwrap();
        assert_eq!(w.get_edge(e).unwrap().src, a);
        assert!(w.label_matrix(person).unwrap().contains(a, a));
        assert!(w.adjacency_matrix().contains(a, b));
        assert_eq!(w.node_count(), 2);
    }

    #[test]
    fn parallel_edges_upgrade_and_downgrade() {
        let g = graph();
        let mut w = g.write();
        w.add_label("N");
        let r = w.add_relation("R");
        let a = w.create_node(&[], AttrSet::new()).unwrap();
        let b = w.create_node(&[], AttrSet::new()).unwrap();
        let e1 = w.create_edge(a, b, r, AttrSet::new()).unwrap();
        let e2 = w.create_edge(a, b, r, AttrSet::new()).unwrap();
        let e3 = w.create_edge(a, b, r, AttrSet::new()).unwrap();
        assert!(w.relation(r).unwrap().is_multi());
        let mut ids = w.edges_between(a, b, r);
        ids.sort_unstable();
        assert_eq!(ids.as_slice(), &[e1, e2, e3]);

        w.delete_edge(e2).unwrap();
        w.delete_edge(e1).unwrap();
        // one edge left: slot downgraded to a direct id
        let cell = w.relation(r).unwrap().matrix().get(a, b).unwrap();
        assert_eq!(EdgeSlot::decode(cell), EdgeSlot::Single(e3));
        assert!(w.adjacency_matrix().contains(a, b));

        w.delete_edge(e3).unwrap();
        assert!(w.relation(r).unwrap().matrix().get(a, b).is_none());
        assert!(!w.adjacency_matrix().contains(a, b));
    }

    #[test]
    fn delete_node_removes_incident_edges() {
        let g = graph();
        let mut w = g.write();
        let l = w.add_label("N");
        let r = w.add_relation("R");
        let a = w.create_node(&[l], AttrSet::new()).unwrap();
        let b = w.create_node(&[l], AttrSet::new()).unwrap();
        w.create_edge(a, b, r, AttrSet::new()).unwrap();
        w.create_edge(b, a, r, AttrSet::new()).unwrap();
        assert_eq!(w.delete_node(a).unwrap(), 2);
        assert_eq!(w.edge_count(), 0);
        assert!(!w.label_matrix(l).unwrap().contains(a, a));
        assert!(w.get_node(b).is_some());
    }

    #[test]
    fn deleted_ids_are_reused_after_flush_cycle() {
        let g = graph();
        let mut w = g.write();
        w.add_label("N");
        let a = w.create_node(&[], AttrSet::new()).unwrap();
        let _b = w.create_node(&[], AttrSet::new()).unwrap();
        w.delete_node(a).unwrap();
        w.apply_all_pending(true);
        let c = w.create_node(&[], AttrSet::new()).unwrap();
        assert_eq!(c, a);
    }
}
