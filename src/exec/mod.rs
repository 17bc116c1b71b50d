//! Execution plans and the pull-based operator pipeline.
//!
//! A plan is an arena of operators linked by integer ids, with a single
//! root. Pulling the root drives the whole pipeline; operators are stateful
//! between pulls and are reset for re-execution under an apply operator.
//! Mutating operators stage their effects and commit them at a single
//! barrier after the read phase.

pub mod expr;
pub mod ops;
pub mod record;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphInner};
use crate::types::AttrId;
use crate::value::Value;

pub use expr::{BinaryOp, Expr, UnaryOp};
pub use ops::{OpId, OpKind, Operator};
pub use record::{EdgeRef, Record, Slot};

/// Query parameter bindings.
pub type Params = FxHashMap<String, Value>;

/// Mutation and timing counters reported with every result set.
#[derive(Clone, Debug, Default)]
pub struct QueryStats {
    pub nodes_created: u64,
    pub edges_created: u64,
    pub nodes_deleted: u64,
    pub edges_deleted: u64,
    pub attrs_set: u64,
    pub rows: u64,
    pub execution_ms: u128,
}

/// Structured query response: header, rows, statistics.
#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: QueryStats,
}

/// Per-execution context handed to every operator: the locked graph view,
/// parameters, and interrupt state. Operators receive it explicitly; there
/// are no hidden thread-locals.
pub struct ExecCtx<'g> {
    pub g: &'g GraphInner,
    pub params: Params,
    width: usize,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl<'g> ExecCtx<'g> {
    pub fn new(
        g: &'g GraphInner,
        params: Params,
        width: usize,
        cancel: Option<Arc<AtomicBool>>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            g,
            params,
            width,
            cancel,
            deadline: (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms)),
        }
    }

    /// Fresh record of the plan's width.
    pub fn new_record(&self) -> Record {
        Record::new(self.width)
    }

    /// Checked at every operator consume entry.
    pub fn check_interrupt(&self) -> Result<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::SeqCst) {
                return Err(GraphError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(GraphError::Timeout);
            }
        }
        Ok(())
    }
}

/// Arena of operators forming one executable plan.
pub struct ExecutionPlan {
    ops: Vec<Option<Box<dyn Operator>>>,
    consume_calls: Vec<u64>,
    root: Option<OpId>,
    width: usize,
    columns: Vec<(String, usize)>,
}

impl ExecutionPlan {
    pub fn new(width: usize) -> Self {
        Self {
            ops: Vec::new(),
            consume_calls: Vec::new(),
            root: None,
            width,
            columns: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Adds an operator whose child ids were assigned by earlier `add_op`
    /// calls. Returns the operator's id.
    pub fn add_op(&mut self, op: Box<dyn Operator>) -> OpId {
        let id = self.ops.len();
        self.ops.push(Some(op));
        self.consume_calls.push(0);
        id
    }

    pub fn set_root(&mut self, id: OpId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<OpId> {
        self.root
    }

    /// Output columns as (alias, slot) pairs.
    pub fn set_columns(&mut self, columns: Vec<(String, usize)>) {
        self.columns = columns;
    }

    pub fn columns(&self) -> &[(String, usize)] {
        &self.columns
    }

    fn op_mut(&mut self, id: OpId) -> Result<&mut Box<dyn Operator>> {
        self.ops
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or_else(|| GraphError::Corruption(format!("operator {id} absent from plan")))
    }

    fn op_ref(&self, id: OpId) -> Result<&dyn Operator> {
        self.ops
            .get(id)
            .and_then(|slot| slot.as_deref())
            .ok_or_else(|| GraphError::Corruption(format!("operator {id} absent from plan")))
    }

    /// Initializes every operator. Called once per execution, before the
    /// first pull.
    pub fn init_all(&mut self, ctx: &mut ExecCtx<'_>) -> Result<()> {
        for id in 0..self.ops.len() {
            self.op_mut(id)?.init(ctx)?;
        }
        Ok(())
    }

    /// Pulls one record from operator `id`. The operator is taken out of
    /// the arena for the duration of the call so it can pull its own
    /// children through the plan.
    pub fn pull(&mut self, id: OpId, ctx: &mut ExecCtx<'_>) -> Result<Option<Record>> {
        ctx.check_interrupt()?;
        let mut op = self
            .ops
            .get_mut(id)
            .and_then(Option::take)
            .ok_or_else(|| GraphError::Corruption(format!("operator {id} pulled reentrantly")))?;
        self.consume_calls[id] += 1;
        let out = op.consume(self, ctx);
        self.ops[id] = Some(op);
        out
    }

    /// Resets the subtree rooted at `id` to its initial state.
    pub fn reset_subtree(&mut self, id: OpId) -> Result<()> {
        let children: Vec<OpId> = self.op_ref(id)?.children().to_vec();
        self.op_mut(id)?.reset()?;
        for child in children {
            self.reset_subtree(child)?;
        }
        Ok(())
    }

    /// Deep structural copy of the subtree rooted at `id`, remapping child
    /// links (and operator-internal links such as an apply's argument
    /// pointer) onto fresh arena slots. Returns the new root id.
    pub fn clone_subtree(&mut self, id: OpId) -> Result<OpId> {
        let mut mapping: FxHashMap<OpId, OpId> = FxHashMap::default();
        let new_root = self.clone_rec(id, &mut mapping)?;
        let new_ids: Vec<OpId> = mapping.values().copied().collect();
        let lookup = |old: OpId| mapping.get(&old).copied();
        for new_id in new_ids {
            if let Some(op) = self.ops.get_mut(new_id).and_then(Option::as_mut) {
                op.remap_links(&lookup);
            }
        }
        Ok(new_root)
    }

    fn clone_rec(&mut self, id: OpId, mapping: &mut FxHashMap<OpId, OpId>) -> Result<OpId> {
        let children: Vec<OpId> = self.op_ref(id)?.children().to_vec();
        let mut remapped = Vec::with_capacity(children.len());
        for child in children {
            remapped.push(self.clone_rec(child, mapping)?);
        }
        let mut op = self.op_ref(id)?.clone_op();
        op.set_children(&remapped);
        let new_id = self.add_op(op);
        mapping.insert(id, new_id);
        Ok(new_id)
    }

    /// Delivers `record` to an argument operator in an apply subtree.
    pub fn send_argument(&mut self, id: OpId, record: Record) -> Result<()> {
        self.op_mut(id)?.receive_argument(record);
        Ok(())
    }

    pub fn has_mutations(&self) -> bool {
        self.ops
            .iter()
            .flatten()
            .any(|op| op.is_mutating())
    }

    /// Applies every operator's staged mutations. Runs under the write
    /// lock at the commit barrier.
    pub fn commit_all(&mut self, g: &mut GraphInner, stats: &mut QueryStats) -> Result<()> {
        for id in 0..self.ops.len() {
            self.op_mut(id)?.commit(g, stats)?;
        }
        Ok(())
    }

    /// Drops staged mutations after a failed execution.
    pub fn discard_pending(&mut self) {
        for op in self.ops.iter_mut().flatten() {
            op.discard();
        }
    }

    /// Indented operator tree, root first.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.describe_into(root, 0, &mut out);
        }
        out
    }

    fn describe_into(&self, id: OpId, depth: usize, out: &mut String) {
        if let Ok(op) = self.op_ref(id) {
            for _ in 0..depth {
                out.push_str("    ");
            }
            out.push_str(op.kind().name());
            out.push('\n');
            for &child in op.children() {
                self.describe_into(child, depth + 1, out);
            }
        }
    }

    /// Per-operator consume counts gathered during execution.
    pub fn profile(&self) -> Vec<(String, u64)> {
        self.ops
            .iter()
            .zip(&self.consume_calls)
            .filter_map(|(op, calls)| op.as_ref().map(|op| (op.kind().name().to_owned(), *calls)))
            .collect()
    }
}

/// Runs a plan against a graph: read phase under the shared lock, then the
/// mutation barrier under the exclusive lock.
pub fn execute_plan(
    graph: &Graph,
    plan: &mut ExecutionPlan,
    params: Params,
    cancel: Option<Arc<AtomicBool>>,
    timeout_ms: u64,
) -> Result<ResultSet> {
    let started = Instant::now();
    let mut stats = QueryStats::default();

    let read_result = {
        let g = graph.read();
        let mut ctx = ExecCtx::new(&g, params, plan.width(), cancel, timeout_ms);
        run_read_phase(plan, &mut ctx)
    };

    let rows = match read_result {
        Ok(rows) => rows,
        Err(err) => {
            // the read guard is already released; staged buffers must not
            // survive the failed query
            plan.discard_pending();
            return Err(err);
        }
    };

    if plan.has_mutations() {
        let mut w = graph.write();
        if let Err(err) = plan.commit_all(&mut w, &mut stats) {
            drop(w);
            plan.discard_pending();
            return Err(err);
        }
        w.apply_all_pending(false);
    }

    stats.rows = rows.len() as u64;
    stats.execution_ms = started.elapsed().as_millis();
    trace!(rows = stats.rows, ms = stats.execution_ms as u64, "plan executed");

    Ok(ResultSet {
        columns: plan.columns().iter().map(|(name, _)| name.clone()).collect(),
        rows,
        stats,
    })
}

fn run_read_phase(plan: &mut ExecutionPlan, ctx: &mut ExecCtx<'_>) -> Result<Vec<Vec<Value>>> {
    plan.init_all(ctx)?;
    let root = plan
        .root()
        .ok_or_else(|| GraphError::Compile("plan has no root operator".into()))?;
    let mut rows = Vec::new();
    while let Some(record) = plan.pull(root, ctx)? {
        if plan.columns().is_empty() {
            continue;
        }
        let row = plan
            .columns()
            .iter()
            .map(|(_, slot)| slot_to_value(record.get(*slot), ctx))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Materializes a record slot as a response value. Entities surface as maps
/// with their id, labels or relation, and named attributes.
fn slot_to_value(slot: &Slot, ctx: &ExecCtx<'_>) -> Value {
    match slot {
        Slot::Empty => Value::Null,
        Slot::Scalar(v) => v.clone(),
        Slot::Node(id) => match ctx.g.get_node(*id) {
            None => Value::Null,
            Some(node) => {
                let mut pairs = vec![("id".to_owned(), Value::Int(*id as i64))];
                let labels = node
                    .labels
                    .iter()
                    .filter_map(|&l| ctx.g.schema().label_name(l))
                    .map(|name| Value::String(name.to_owned()))
                    .collect();
                pairs.push(("labels".to_owned(), Value::Array(labels)));
                pairs.push(("properties".to_owned(), attrs_to_map(ctx, &node.attrs)));
                Value::Map(pairs)
            }
        },
        Slot::Edge(e) => match ctx.g.get_edge(e.id) {
            None => Value::Null,
            Some(edge) => {
                let mut pairs = vec![
                    ("id".to_owned(), Value::Int(e.id as i64)),
                    ("src".to_owned(), Value::Int(edge.src as i64)),
                    ("dest".to_owned(), Value::Int(edge.dest as i64)),
                ];
                if let Some(name) = ctx.g.schema().relation_name(edge.relation) {
                    pairs.push(("type".to_owned(), Value::String(name.to_owned())));
                }
                pairs.push(("properties".to_owned(), attrs_to_map(ctx, &edge.attrs)));
                Value::Map(pairs)
            }
        },
    }
}

fn attrs_to_map(ctx: &ExecCtx<'_>, attrs: &crate::attrset::AttrSet) -> Value {
    let pairs = attrs
        .iter()
        .map(|(id, value): (AttrId, &Value)| {
            let name = ctx
                .g
                .schema()
                .attr_name(id)
                .map(str::to_owned)
                .unwrap_or_else(|| id.to_string());
            (name, value.clone())
        })
        .collect();
    Value::Map(pairs)
}
