//! Variable-length traversal by iterative depth-first expansion.

use smallvec::SmallVec;

use crate::error::{GraphError, Result};
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};
use crate::graph::GraphInner;
use crate::matrix::{transpose_logical, SparseMatrix};
use crate::types::{NodeId, RelationId};

use super::traverse::TraverseDir;
use super::{OpId, OpKind, Operator};

struct Frame {
    neighbors: SmallVec<[NodeId; 8]>,
    next: usize,
}

/// Expands `src_slot` over paths of `min_len..=max_len` edges, binding each
/// reachable destination to `dest_slot`.
///
/// A path may close a cycle (revisit a node already on the path) but the
/// revisited node is not expanded again. Minimum-length filtering is
/// applied to emissions only, and the same destination may be yielded once
/// per distinct path; deduplication is the consumer's concern.
pub struct VarLenTraverse {
    children: Vec<OpId>,
    relation: Option<RelationId>,
    dir: TraverseDir,
    src_slot: usize,
    dest_slot: usize,
    min_len: usize,
    max_len: usize,
    /// Transposed structure, materialized at init for incoming traversal.
    reversed: Option<SparseMatrix<bool>>,
    record: Option<Record>,
    stack: Vec<Frame>,
    path: Vec<NodeId>,
}

impl VarLenTraverse {
    pub fn new(
        child: OpId,
        relation: Option<RelationId>,
        dir: TraverseDir,
        src_slot: usize,
        dest_slot: usize,
        min_len: usize,
        max_len: usize,
    ) -> Result<Self> {
        if min_len > max_len {
            return Err(GraphError::Compile(format!(
                "variable-length range {min_len}..{max_len} is empty"
            )));
        }
        Ok(Self {
            children: vec![child],
            relation,
            dir,
            src_slot,
            dest_slot,
            min_len,
            max_len,
            reversed: None,
            record: None,
            stack: Vec::new(),
            path: Vec::new(),
        })
    }

    fn neighbors(&self, g: &GraphInner, node: NodeId) -> SmallVec<[NodeId; 8]> {
        if let Some(rev) = &self.reversed {
            return rev.row(node).iter().map(|(c, _)| *c).collect();
        }
        let mut out = SmallVec::new();
        match self.relation {
            Some(rel) => {
                if let Some(store) = g.relation(rel) {
                    out.extend(store.matrix().row_iter(node).map(|(c, _)| c));
                }
            }
            None => out.extend(g.adjacency_matrix().row_iter(node).map(|(c, _)| c)),
        }
        out
    }

    fn begin(&mut self, ctx: &ExecCtx<'_>, src: NodeId) {
        self.path.clear();
        self.stack.clear();
        self.path.push(src);
        self.stack.push(Frame {
            neighbors: self.neighbors(ctx.g, src),
            next: 0,
        });
    }

    /// Advances the DFS to the next destination, maintaining the invariant
    /// that `stack.len()` equals the current path depth in edges + 1.
    fn advance(&mut self, ctx: &ExecCtx<'_>) -> Option<NodeId> {
        while let Some(frame) = self.stack.last_mut() {
            if frame.next >= frame.neighbors.len() {
                self.stack.pop();
                self.path.pop();
                continue;
            }
            let node = frame.neighbors[frame.next];
            frame.next += 1;

            let depth = self.stack.len(); // edges traversed to reach `node`
            let emit = depth >= self.min_len;
            // a closed cycle is reported but never re-expanded
            let expand = depth < self.max_len && !self.path.contains(&node);
            if expand {
                let neighbors = self.neighbors(ctx.g, node);
                self.path.push(node);
                self.stack.push(Frame { neighbors, next: 0 });
            }
            if emit {
                return Some(node);
            }
        }
        None
    }
}

impl Operator for VarLenTraverse {
    fn kind(&self) -> OpKind {
        OpKind::VarLenTraverse
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn modifies(&self) -> Vec<usize> {
        vec![self.dest_slot]
    }

    fn init(&mut self, ctx: &mut ExecCtx<'_>) -> Result<()> {
        self.reversed = match self.dir {
            TraverseDir::Outgoing => None,
            TraverseDir::Incoming => Some(match self.relation {
                Some(rel) => {
                    let store = ctx.g.relation(rel).ok_or_else(|| {
                        GraphError::InvalidArgument(format!("unknown relation id {rel}"))
                    })?;
                    transpose_logical(store.matrix())
                }
                None => transpose_logical(ctx.g.adjacency_matrix()),
            }),
        };
        Ok(())
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        let child = self.children[0];
        loop {
            if self.record.is_some() {
                if let Some(dest) = self.advance(ctx) {
                    let mut record = self
                        .record
                        .as_ref()
                        .map(Record::clone)
                        .unwrap_or_else(|| ctx.new_record());
                    record.set_node(self.dest_slot, dest);
                    return Ok(Some(record));
                }
                self.record = None;
            }

            let Some(record) = plan.pull(child, ctx)? else {
                return Ok(None);
            };
            let src = record.node(self.src_slot).ok_or_else(|| {
                GraphError::Corruption(format!("traverse source slot {} unbound", self.src_slot))
            })?;
            self.begin(ctx, src);
            self.record = Some(record);
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.record = None;
        self.stack.clear();
        self.path.clear();
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Self {
            children: self.children.clone(),
            relation: self.relation,
            dir: self.dir,
            src_slot: self.src_slot,
            dest_slot: self.dest_slot,
            min_len: self.min_len,
            max_len: self.max_len,
            reversed: None,
            record: None,
            stack: Vec::new(),
            path: Vec::new(),
        })
    }
}
