//! Projection of expressions into record slots.

use crate::error::Result;
use crate::exec::expr::Expr;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};

use super::{OpId, OpKind, Operator};

/// One projected output: an expression, its destination slot, and the
/// alias surfaced in the result header.
#[derive(Clone)]
pub struct Projection {
    pub expr: Expr,
    pub slot: usize,
    pub alias: String,
}

/// Evaluates a projection list against each child record.
pub struct Project {
    children: Vec<OpId>,
    projections: Vec<Projection>,
}

impl Project {
    pub fn new(child: OpId, projections: Vec<Projection>) -> Self {
        Self {
            children: vec![child],
            projections,
        }
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }
}

impl Operator for Project {
    fn kind(&self) -> OpKind {
        OpKind::Project
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn modifies(&self) -> Vec<usize> {
        self.projections.iter().map(|p| p.slot).collect()
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        let Some(mut record) = plan.pull(self.children[0], ctx)? else {
            return Ok(None);
        };
        for projection in &self.projections {
            let value = projection.expr.eval(&record, ctx)?;
            record.set_scalar(projection.slot, value);
        }
        Ok(Some(record))
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Project::new(0, self.projections.clone()))
    }
}
