//! Apply and Argument: per-record re-execution of a subtree.

use crate::error::Result;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};

use super::{OpId, OpKind, Operator};

/// Runs its right subtree once per record produced by its left subtree,
/// installing the left record in the right subtree's argument operator and
/// resetting the right subtree after each run.
pub struct Apply {
    children: Vec<OpId>,
    /// The argument operator inside the right subtree.
    argument: OpId,
    right_active: bool,
}

impl Apply {
    pub fn new(left: OpId, right: OpId, argument: OpId) -> Self {
        Self {
            children: vec![left, right],
            argument,
            right_active: false,
        }
    }
}

impl Operator for Apply {
    fn kind(&self) -> OpKind {
        OpKind::Apply
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
        let (left, right) = (self.children[0], self.children[1]);
        loop {
            if self.right_active {
                if let Some(record) = plan.pull(right, ctx)? {
                    return Ok(Some(record));
                }
                self.right_active = false;
            }

            let Some(record) = plan.pull(left, ctx)? else {
                return Ok(None);
            };
            plan.reset_subtree(right)?;
            plan.send_argument(self.argument, record)?;
            self.right_active = true;
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.right_active = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Apply::new(0, 0, self.argument))
    }

    fn remap_links(&mut self, map: &dyn Fn(OpId) -> Option<OpId>) {
        if let Some(new_id) = map(self.argument) {
            self.argument = new_id;
        }
    }
}

/// Source operator emitting the record installed by its apply parent,
/// exactly once per reset cycle.
pub struct Argument {
    children: Vec<OpId>,
    installed: Option<Record>,
    emitted: bool,
}

impl Argument {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            installed: None,
            emitted: false,
        }
    }
}

impl Default for Argument {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for Argument {
    fn kind(&self) -> OpKind {
        OpKind::Argument
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn consume(
        &mut self,
        _plan: &mut ExecutionPlan,
        _ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(self.installed.clone())
    }

    fn reset(&mut self) -> Result<()> {
        self.emitted = false;
        Ok(())
    }

    fn receive_argument(&mut self, record: Record) {
        self.installed = Some(record);
        self.emitted = false;
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Argument::new())
    }
}
