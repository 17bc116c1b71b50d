//! Operator contract and the concrete operator set.

mod aggregate;
mod apply;
mod bound;
mod filter;
mod load_csv;
mod mutate;
mod project;
mod scan;
mod shape;
mod traverse;
mod var_len;

pub use aggregate::{AggFn, AggSpec, Aggregate};
pub use apply::{Apply, Argument};
pub use bound::{Limit, Skip};
pub use filter::Filter;
pub use load_csv::LoadCsv;
pub use mutate::{Create, CreateEdgeSpec, CreateNodeSpec, Delete, EdgeEndpoint, Merge, Update, UpdateItem};
pub use project::{Project, Projection};
pub use scan::{AllNodeScan, NodeByLabelScan};
pub use shape::{Distinct, Results, Sort, SortKey};
pub use traverse::{CondTraverse, TraverseDir};
pub use var_len::VarLenTraverse;

use crate::error::Result;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan, QueryStats};
use crate::graph::GraphInner;

/// Arena index of an operator within its plan.
pub type OpId = usize;

/// Operator kind tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpKind {
    AllNodeScan,
    NodeByLabelScan,
    NodeByLabelAndIdScan,
    LoadCsv,
    CondTraverse,
    VarLenTraverse,
    Filter,
    Project,
    Skip,
    Limit,
    Create,
    Update,
    Delete,
    Merge,
    Apply,
    Argument,
    Aggregate,
    Sort,
    Distinct,
    Results,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::AllNodeScan => "All Node Scan",
            OpKind::NodeByLabelScan => "Node By Label Scan",
            OpKind::NodeByLabelAndIdScan => "Node By Label and ID Scan",
            OpKind::LoadCsv => "Load CSV",
            OpKind::CondTraverse => "Conditional Traverse",
            OpKind::VarLenTraverse => "Variable Length Traverse",
            OpKind::Filter => "Filter",
            OpKind::Project => "Project",
            OpKind::Skip => "Skip",
            OpKind::Limit => "Limit",
            OpKind::Create => "Create",
            OpKind::Update => "Update",
            OpKind::Delete => "Delete",
            OpKind::Merge => "Merge",
            OpKind::Apply => "Apply",
            OpKind::Argument => "Argument",
            OpKind::Aggregate => "Aggregate",
            OpKind::Sort => "Sort",
            OpKind::Distinct => "Distinct",
            OpKind::Results => "Results",
        }
    }
}

/// Contract every operator implements.
///
/// `consume` is a pull-based synchronous generator: it returns one record,
/// or `None` for stream exhaustion, pulling from children through the plan
/// arena as needed. Operators keep state between calls; `reset` rewinds to
/// the initial state without reallocating the operator.
pub trait Operator: Send {
    fn kind(&self) -> OpKind;

    /// Child operator ids in the plan arena.
    fn children(&self) -> &[OpId];

    /// Rewrites child links; used when cloning subtrees.
    fn set_children(&mut self, children: &[OpId]);

    /// Record slots this operator writes.
    fn modifies(&self) -> Vec<usize> {
        Vec::new()
    }

    /// Called once before the first `consume` of an execution.
    fn init(&mut self, _ctx: &mut ExecCtx<'_>) -> Result<()> {
        Ok(())
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>>;

    /// Rewinds for re-execution under an apply operator.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Deep structural copy, child links to be remapped by the plan.
    fn clone_op(&self) -> Box<dyn Operator>;

    /// Installs the outer record for an argument operator.
    fn receive_argument(&mut self, _record: Record) {}

    /// Remaps operator-internal plan links (beyond child edges) after a
    /// subtree clone. `map` returns the new id for a cloned operator.
    fn remap_links(&mut self, _map: &dyn Fn(OpId) -> Option<OpId>) {}

    /// True for operators that stage graph mutations.
    fn is_mutating(&self) -> bool {
        false
    }

    /// Applies staged mutations at the commit barrier. Runs under the
    /// write lock.
    fn commit(&mut self, _g: &mut GraphInner, _stats: &mut QueryStats) -> Result<()> {
        Ok(())
    }

    /// Drops staged mutations after a failed execution.
    fn discard(&mut self) {}
}
