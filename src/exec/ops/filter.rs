//! Predicate filter.

use crate::error::{GraphError, Result};
use crate::exec::expr::Expr;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};
use crate::value::Value;

use super::{OpId, OpKind, Operator};

/// Passes through records whose predicate evaluates to `true`. Null and
/// `false` drop the record; any other value is a runtime type error.
pub struct Filter {
    children: Vec<OpId>,
    predicate: Expr,
}

impl Filter {
    pub fn new(child: OpId, predicate: Expr) -> Self {
        Self {
            children: vec![child],
            predicate,
        }
    }
}

impl Operator for Filter {
    fn kind(&self) -> OpKind {
        OpKind::Filter
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        let child = self.children[0];
        loop {
            let Some(record) = plan.pull(child, ctx)? else {
                return Ok(None);
            };
            match self.predicate.eval(&record, ctx)? {
                Value::Bool(true) => return Ok(Some(record)),
                Value::Bool(false) | Value::Null => continue,
                other => {
                    return Err(GraphError::TypeMismatch {
                        expected: "bool",
                        got: other.type_name(),
                    })
                }
            }
        }
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Filter::new(0, self.predicate.clone()))
    }
}
