//! Conditional traverse: expands a batch of source nodes through a
//! relation matrix and streams the (source record, destination) pairs.

use std::collections::VecDeque;

use crate::error::{GraphError, Result};
use crate::exec::record::{EdgeRef, Record};
use crate::exec::{ExecCtx, ExecutionPlan};
use crate::matrix::{bool_mxm, transpose_logical, SparseMatrix};
use crate::types::{NodeId, RelationId};

use super::{OpId, OpKind, Operator};

/// Traversal direction relative to the source slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraverseDir {
    Outgoing,
    Incoming,
}

/// Expands `src_slot -> dest_slot` over one relation matrix (or the global
/// adjacency matrix when no relation is named).
///
/// Input records are buffered up to `record_cap`, a filter matrix is built
/// from the buffered source ids, and the boolean product of the filter with
/// the relation matrix yields every (record, destination) pair of the
/// batch. The buffer refills when the result is exhausted.
pub struct CondTraverse {
    children: Vec<OpId>,
    relation: Option<RelationId>,
    dir: TraverseDir,
    src_slot: usize,
    dest_slot: usize,
    /// When set, one record is emitted per connecting edge with the edge
    /// bound in this slot. Only meaningful for named relations.
    edge_slot: Option<usize>,
    record_cap: usize,
    records: Vec<Record>,
    /// (record index, destination) pairs remaining in the current batch.
    results: VecDeque<(usize, NodeId)>,
    /// Edge fan-out for the pair currently being emitted.
    edge_queue: VecDeque<(usize, NodeId, EdgeRef)>,
    depleted: bool,
}

impl CondTraverse {
    pub fn new(
        child: OpId,
        relation: Option<RelationId>,
        dir: TraverseDir,
        src_slot: usize,
        dest_slot: usize,
        record_cap: usize,
    ) -> Self {
        Self {
            children: vec![child],
            relation,
            dir,
            src_slot,
            dest_slot,
            edge_slot: None,
            record_cap: record_cap.max(1),
            records: Vec::new(),
            results: VecDeque::new(),
            edge_queue: VecDeque::new(),
            depleted: false,
        }
    }

    pub fn with_edge_slot(mut self, slot: usize) -> Self {
        self.edge_slot = Some(slot);
        self
    }

    /// Pulls up to `record_cap` child records and computes the batch's
    /// result pairs. Returns false when the child is depleted and nothing
    /// was buffered.
    fn refill(&mut self, plan: &mut ExecutionPlan, ctx: &mut ExecCtx<'_>) -> Result<bool> {
        self.records.clear();
        self.results.clear();
        let child = self.children[0];
        while self.records.len() < self.record_cap {
            match plan.pull(child, ctx)? {
                Some(record) => self.records.push(record),
                None => {
                    self.depleted = true;
                    break;
                }
            }
        }
        if self.records.is_empty() {
            return Ok(false);
        }

        // filter matrix: one row per buffered record, selecting its source
        let node_dim = ctx.g.node_capacity();
        let mut filter = SparseMatrix::new(self.records.len() as u64, node_dim);
        for (i, record) in self.records.iter().enumerate() {
            let src = record.node(self.src_slot).ok_or_else(|| {
                GraphError::Corruption(format!("traverse source slot {} unbound", self.src_slot))
            })?;
            filter.set(i as u64, src, true);
        }

        let result = match (self.relation, self.dir) {
            (Some(rel), dir) => {
                let store = ctx.g.relation(rel).ok_or_else(|| {
                    GraphError::InvalidArgument(format!("unknown relation id {rel}"))
                })?;
                match dir {
                    TraverseDir::Outgoing => bool_mxm(&filter, store.matrix()),
                    TraverseDir::Incoming => {
                        let transposed = transpose_logical(store.matrix());
                        bool_mxm(&filter, &transposed)
                    }
                }
            }
            (None, TraverseDir::Outgoing) => bool_mxm(&filter, ctx.g.adjacency_matrix()),
            (None, TraverseDir::Incoming) => {
                let transposed = transpose_logical(ctx.g.adjacency_matrix());
                bool_mxm(&filter, &transposed)
            }
        };

        for (rec_idx, dest, _) in result.iter() {
            self.results.push_back((rec_idx as usize, dest));
        }
        Ok(true)
    }

    /// Expands one (record, dest) pair into per-edge emissions.
    fn queue_edges(&mut self, ctx: &ExecCtx<'_>, rec_idx: usize, dest: NodeId) {
        let Some(rel) = self.relation else {
            return;
        };
        let Some(src) = self.records[rec_idx].node(self.src_slot) else {
            return;
        };
        let (from, to) = match self.dir {
            TraverseDir::Outgoing => (src, dest),
            TraverseDir::Incoming => (dest, src),
        };
        for edge_id in ctx.g.edges_between(from, to, rel) {
            self.edge_queue.push_back((
                rec_idx,
                dest,
                EdgeRef {
                    id: edge_id,
                    src: from,
                    dest: to,
                    relation: rel,
                },
            ));
        }
    }

    fn emit(&self, rec_idx: usize, dest: NodeId, edge: Option<EdgeRef>) -> Record {
        let mut record = self.records[rec_idx].clone();
        record.set_node(self.dest_slot, dest);
        if let (Some(slot), Some(edge)) = (self.edge_slot, edge) {
            record.set_edge(slot, edge);
        }
        record
    }
}

impl Operator for CondTraverse {
    fn kind(&self) -> OpKind {
        OpKind::CondTraverse
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn modifies(&self) -> Vec<usize> {
        match self.edge_slot {
            Some(edge) => vec![self.dest_slot, edge],
            None => vec![self.dest_slot],
        }
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        loop {
            if let Some((rec_idx, dest, edge)) = self.edge_queue.pop_front() {
                return Ok(Some(self.emit(rec_idx, dest, Some(edge))));
            }

            if let Some((rec_idx, dest)) = self.results.pop_front() {
                if self.edge_slot.is_some() {
                    self.queue_edges(ctx, rec_idx, dest);
                    continue;
                }
                return Ok(Some(self.emit(rec_idx, dest, None)));
            }

            if self.depleted {
                return Ok(None);
            }
            if !self.refill(plan, ctx)? {
                return Ok(None);
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.records.clear();
        self.results.clear();
        self.edge_queue.clear();
        self.depleted = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        let mut op = CondTraverse::new(
            0,
            self.relation,
            self.dir,
            self.src_slot,
            self.dest_slot,
            self.record_cap,
        );
        op.edge_slot = self.edge_slot;
        Box::new(op)
    }
}
