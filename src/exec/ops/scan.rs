//! Scan operators: record sources backed by entity pools and label
//! matrices.

use crate::error::Result;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};
use crate::matrix::TupleIter;
use crate::storage::PoolScan;
use crate::types::LabelId;

use super::{OpId, OpKind, Operator};

/// Scans every live node in id order.
pub struct AllNodeScan {
    children: Vec<OpId>,
    node_slot: usize,
    scan: Option<PoolScan>,
}

impl AllNodeScan {
    pub fn new(node_slot: usize) -> Self {
        Self {
            children: Vec::new(),
            node_slot,
            scan: None,
        }
    }
}

impl Operator for AllNodeScan {
    fn kind(&self) -> OpKind {
        OpKind::AllNodeScan
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn modifies(&self) -> Vec<usize> {
        vec![self.node_slot]
    }

    fn init(&mut self, ctx: &mut ExecCtx<'_>) -> Result<()> {
        self.scan = Some(ctx.g.nodes().scan());
        Ok(())
    }

    fn consume(
        &mut self,
        _plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        let scan = self
            .scan
            .get_or_insert_with(|| ctx.g.nodes().scan());
        match scan.next(ctx.g.nodes()) {
            Some(id) => {
                let mut record = ctx.new_record();
                record.set_node(self.node_slot, id);
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn reset(&mut self) -> Result<()> {
        // rebuilt from the context on the next consume
        self.scan = None;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(AllNodeScan::new(self.node_slot))
    }
}

/// Consume-mode state machine for the label scan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScanMode {
    Standalone,
    FromChild,
    /// Unknown label or an id range outside the matrix: always exhausted.
    NoOp,
}

/// Scans nodes carrying one label by walking the label's diagonal matrix,
/// optionally restricted to an id range, optionally re-run per child
/// record for parameter binding.
pub struct NodeByLabelScan {
    children: Vec<OpId>,
    label_name: String,
    label_id: Option<LabelId>,
    node_slot: usize,
    /// Inclusive id range requested by the plan; tightened to the matrix
    /// bounds when the iterator is built.
    range: (u64, u64),
    ranged: bool,
    mode: ScanMode,
    iter: TupleIter,
    iter_live: bool,
    /// Set by `reset`; the iterator is rebuilt on the next consume.
    rebuild: bool,
    child_record: Option<Record>,
}

impl NodeByLabelScan {
    pub fn new(label_name: impl Into<String>, node_slot: usize) -> Self {
        Self {
            children: Vec::new(),
            label_name: label_name.into(),
            label_id: None,
            node_slot,
            range: (0, u64::MAX),
            ranged: false,
            mode: ScanMode::NoOp,
            iter: TupleIter::new(),
            iter_live: false,
            rebuild: false,
            child_record: None,
        }
    }

    pub fn with_child(mut self, child: OpId) -> Self {
        self.children = vec![child];
        self
    }

    /// Restricts the scan to an inclusive id range; the operator reports
    /// itself as a label-and-id scan afterwards.
    pub fn with_id_range(mut self, min: u64, max: u64) -> Self {
        self.range = (min, max);
        self.ranged = true;
        self
    }

    /// The label id may not have been registered when the plan was built;
    /// re-resolve it against the schema.
    fn update_label_id(&mut self, ctx: &ExecCtx<'_>) {
        if self.label_id.is_none() {
            self.label_id = ctx.g.schema().label_id(&self.label_name);
        }
    }

    /// Tightens the configured range to `[0, nrows)` and attaches the
    /// iterator. Fails when the tightened range is empty or starts outside
    /// the matrix.
    fn construct_iter(&mut self, ctx: &ExecCtx<'_>) -> bool {
        self.iter_live = false;
        let Some(label) = self.label_id else {
            return false;
        };
        let Some(matrix) = ctx.g.label_matrix(label) else {
            return false;
        };
        let nrows = matrix.nrows();
        if nrows == 0 {
            return false;
        }
        let min = self.range.0;
        let max = self.range.1.min(nrows - 1);
        if min > max {
            return false;
        }
        if self.iter.attach_range(matrix, min, max).is_err() {
            return false;
        }
        self.iter_live = true;
        true
    }

    fn next_node(&mut self, ctx: &ExecCtx<'_>) -> Option<u64> {
        if !self.iter_live {
            return None;
        }
        let label = self.label_id?;
        let matrix = ctx.g.label_matrix(label)?;
        self.iter.next(matrix).map(|(row, _, _)| row)
    }

    fn consume_standalone(&mut self, ctx: &mut ExecCtx<'_>) -> Result<Option<Record>> {
        if self.rebuild {
            self.rebuild = false;
            if !self.construct_iter(ctx) {
                self.mode = ScanMode::NoOp;
                return Ok(None);
            }
        }
        match self.next_node(ctx) {
            Some(id) => {
                let mut record = ctx.new_record();
                record.set_node(self.node_slot, id);
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Streams the whole label matrix once per child record, cloning the
    /// child record into each emission.
    fn consume_from_child(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        let child = self.children[0];
        loop {
            if self.child_record.is_some() {
                if let Some(id) = self.next_node(ctx) {
                    let mut record = self
                        .child_record
                        .as_ref()
                        .map(Record::clone)
                        .unwrap_or_else(|| ctx.new_record());
                    record.set_node(self.node_slot, id);
                    return Ok(Some(record));
                }
            }

            // iterator unbuilt or depleted: advance to the next child record
            self.child_record = plan.pull(child, ctx)?;
            if self.child_record.is_none() {
                return Ok(None);
            }
            self.update_label_id(ctx);
            if !self.construct_iter(ctx) {
                // no valid range for this child record, try the next
                continue;
            }
        }
    }
}

impl Operator for NodeByLabelScan {
    fn kind(&self) -> OpKind {
        if self.ranged {
            OpKind::NodeByLabelAndIdScan
        } else {
            OpKind::NodeByLabelScan
        }
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn modifies(&self) -> Vec<usize> {
        vec![self.node_slot]
    }

    fn init(&mut self, ctx: &mut ExecCtx<'_>) -> Result<()> {
        self.update_label_id(ctx);

        if !self.children.is_empty() {
            self.mode = ScanMode::FromChild;
            return Ok(());
        }

        if self.label_id.is_none() {
            // missing schema: scan produces nothing
            self.mode = ScanMode::NoOp;
            return Ok(());
        }

        if !self.construct_iter(ctx) {
            // the id range fell outside the matrix bounds
            self.mode = ScanMode::NoOp;
            return Ok(());
        }

        self.mode = ScanMode::Standalone;
        Ok(())
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        match self.mode {
            ScanMode::NoOp => Ok(None),
            ScanMode::Standalone => self.consume_standalone(ctx),
            ScanMode::FromChild => self.consume_from_child(plan, ctx),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.child_record = None;
        self.iter.detach();
        self.iter_live = false;
        self.rebuild = self.mode == ScanMode::Standalone;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        let mut op = NodeByLabelScan::new(self.label_name.clone(), self.node_slot);
        op.range = self.range;
        op.ranged = self.ranged;
        Box::new(op)
    }
}
