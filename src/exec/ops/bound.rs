//! Skip and Limit: bounded pass-through operators.
//!
//! Both keep the unevaluated expression alongside the evaluated count.
//! Evaluation happens against the execution parameters at init, and clones
//! carry the expression template rather than the resolved constant, so a
//! parameterized plan re-resolves on every execution.

use crate::error::{GraphError, Result};
use crate::exec::expr::Expr;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};
use crate::value::Value;

use super::{OpId, OpKind, Operator};

fn eval_count(expr: &Expr, ctx: &ExecCtx<'_>, what: &'static str) -> Result<u64> {
    let empty = Record::new(0);
    match expr.eval(&empty, ctx)? {
        Value::Int(n) if n >= 0 => Ok(n as u64),
        _ => Err(GraphError::ExpectedNonNegativeInt(what)),
    }
}

/// Discards the first `n` child records, then passes the rest through.
pub struct Skip {
    children: Vec<OpId>,
    expr: Expr,
    skip: u64,
    skipped: u64,
}

impl Skip {
    pub fn new(child: OpId, expr: Expr) -> Self {
        Self {
            children: vec![child],
            expr,
            skip: 0,
            skipped: 0,
        }
    }
}

impl Operator for Skip {
    fn kind(&self) -> OpKind {
        OpKind::Skip
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn init(&mut self, ctx: &mut ExecCtx<'_>) -> Result<()> {
        self.skip = eval_count(&self.expr, ctx, "Skip")?;
        self.skipped = 0;
        Ok(())
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        let child = self.children[0];
        while self.skipped < self.skip {
            match plan.pull(child, ctx)? {
                Some(_) => self.skipped += 1,
                None => return Ok(None),
            }
        }
        plan.pull(child, ctx)
    }

    fn reset(&mut self) -> Result<()> {
        self.skipped = 0;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        // clone the expression, not the resolved count
        Box::new(Skip::new(0, self.expr.clone()))
    }
}

/// Passes the first `n` child records through, then reports exhaustion.
pub struct Limit {
    children: Vec<OpId>,
    expr: Expr,
    limit: u64,
    consumed: u64,
}

impl Limit {
    pub fn new(child: OpId, expr: Expr) -> Self {
        Self {
            children: vec![child],
            expr,
            limit: 0,
            consumed: 0,
        }
    }
}

impl Operator for Limit {
    fn kind(&self) -> OpKind {
        OpKind::Limit
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn init(&mut self, ctx: &mut ExecCtx<'_>) -> Result<()> {
        self.limit = eval_count(&self.expr, ctx, "Limit")?;
        self.consumed = 0;
        Ok(())
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        if self.consumed >= self.limit {
            return Ok(None);
        }
        match plan.pull(self.children[0], ctx)? {
            Some(record) => {
                self.consumed += 1;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.consumed = 0;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Limit::new(0, self.expr.clone()))
    }
}
