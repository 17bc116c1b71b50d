//! Grouped aggregation.

use rustc_hash::FxHashMap;

use crate::error::{GraphError, Result};
use crate::exec::expr::Expr;
use crate::exec::record::Record;
use crate::exec::{ExecCtx, ExecutionPlan};
use crate::value::Value;

use super::{OpId, OpKind, Operator};

/// Aggregation function.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Collect,
}

/// One aggregate output: function, argument, destination slot.
#[derive(Clone)]
pub struct AggSpec {
    pub func: AggFn,
    pub arg: Expr,
    pub slot: usize,
}

/// Group-key expressions with their destination slots, plus aggregates.
/// The child stream is drained on the first consume; one record per group
/// is emitted afterwards.
pub struct Aggregate {
    children: Vec<OpId>,
    keys: Vec<(Expr, usize)>,
    aggs: Vec<AggSpec>,
    groups: Option<Vec<Record>>,
    cursor: usize,
}

#[derive(Clone)]
struct AggState {
    count: u64,
    sum: f64,
    sum_is_int: bool,
    int_sum: i64,
    min: Option<Value>,
    max: Option<Value>,
    collected: Vec<Value>,
}

impl AggState {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_is_int: true,
            int_sum: 0,
            min: None,
            max: None,
            collected: Vec::new(),
        }
    }

    fn absorb(&mut self, func: AggFn, value: Value) -> Result<()> {
        if value.is_null() && func != AggFn::Count {
            return Ok(());
        }
        match func {
            AggFn::Count => {
                if !value.is_null() {
                    self.count += 1;
                }
            }
            AggFn::Sum | AggFn::Avg => {
                match &value {
                    Value::Int(v) => {
                        self.int_sum = self.int_sum.wrapping_add(*v);
                        self.sum += *v as f64;
                    }
                    Value::Float(v) => {
                        self.sum_is_int = false;
                        self.sum += v;
                    }
                    other => {
                        return Err(GraphError::TypeMismatch {
                            expected: "number",
                            got: other.type_name(),
                        })
                    }
                }
                self.count += 1;
            }
            AggFn::Min => {
                if self.min.as_ref().map_or(true, |m| value.cmp_total(m).is_lt()) {
                    self.min = Some(value);
                }
            }
            AggFn::Max => {
                if self.max.as_ref().map_or(true, |m| value.cmp_total(m).is_gt()) {
                    self.max = Some(value);
                }
            }
            AggFn::Collect => self.collected.push(value),
        }
        Ok(())
    }

    fn finish(self, func: AggFn) -> Value {
        match func {
            AggFn::Count => Value::Int(self.count as i64),
            AggFn::Sum => {
                if self.sum_is_int {
                    Value::Int(self.int_sum)
                } else {
                    Value::Float(self.sum)
                }
            }
            AggFn::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::Float(self.sum / self.count as f64)
                }
            }
            AggFn::Min => self.min.unwrap_or(Value::Null),
            AggFn::Max => self.max.unwrap_or(Value::Null),
            AggFn::Collect => Value::Array(self.collected),
        }
    }
}

impl Aggregate {
    pub fn new(child: OpId, keys: Vec<(Expr, usize)>, aggs: Vec<AggSpec>) -> Self {
        Self {
            children: vec![child],
            keys,
            aggs,
            groups: None,
            cursor: 0,
        }
    }

    fn drain(&mut self, plan: &mut ExecutionPlan, ctx: &mut ExecCtx<'_>) -> Result<Vec<Record>> {
        let child = self.children[0];
        let mut table: FxHashMap<Vec<Value>, Vec<AggState>> = FxHashMap::default();
        let mut order: Vec<Vec<Value>> = Vec::new();

        while let Some(record) = plan.pull(child, ctx)? {
            let mut key = Vec::with_capacity(self.keys.len());
            for (expr, _) in &self.keys {
                key.push(expr.eval(&record, ctx)?);
            }
            if !table.contains_key(&key) {
                order.push(key.clone());
                table.insert(key.clone(), vec![AggState::new(); self.aggs.len()]);
            }
            if let Some(states) = table.get_mut(&key) {
                for (spec, state) in self.aggs.iter().zip(states.iter_mut()) {
                    let value = spec.arg.eval(&record, ctx)?;
                    state.absorb(spec.func, value)?;
                }
            }
        }

        // an aggregation with no keys emits a single group even over an
        // empty stream
        if order.is_empty() && self.keys.is_empty() {
            order.push(Vec::new());
            table.insert(Vec::new(), vec![AggState::new(); self.aggs.len()]);
        }

        let mut out = Vec::with_capacity(order.len());
        for key in order {
            let states = table.remove(&key).unwrap_or_default();
            let mut record = ctx.new_record();
            for ((_, slot), value) in self.keys.iter().zip(key) {
                record.set_scalar(*slot, value);
            }
            for (spec, state) in self.aggs.iter().zip(states) {
                record.set_scalar(spec.slot, state.finish(spec.func));
            }
            out.push(record);
        }
        Ok(out)
    }
}

impl Operator for Aggregate {
    fn kind(&self) -> OpKind {
        OpKind::Aggregate
    }

    fn children(&self) -> &[OpId] {
        &self.children
    }

    fn set_children(&mut self, children: &[OpId]) {
        self.children = children.to_vec();
    }

    fn modifies(&self) -> Vec<usize> {
        self.keys
            .iter()
            .map(|(_, slot)| *slot)
            .chain(self.aggs.iter().map(|a| a.slot))
            .collect()
    }

    fn consume(
        &mut self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecCtx<'_>,
    ) -> Result<Option<Record>> {
        if self.groups.is_none() {
            self.groups = Some(self.drain(plan, ctx)?);
            self.cursor = 0;
        }
        let groups = self.groups.as_ref().map(Vec::as_slice).unwrap_or(&[]);
        if self.cursor < groups.len() {
            let record = groups[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.groups = None;
        self.cursor = 0;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Aggregate::new(0, self.keys.clone(), self.aggs.clone()))
    }
}
