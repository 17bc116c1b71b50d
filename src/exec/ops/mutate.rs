//! Mutating operators. All graph changes accumulate in per-operator
//! pending buffers during the read phase and are applied at the single
//! commit barrier, so reads within the query never observe its writes.

use smallvec::SmallVec;

use crate::attrset::AttrSet;
use crate::error::{GraphError, Result};
use crate::exec::expr::Expr;
use crate::exec::record::{Record, Slot};
use crate::exec::{ExecCtx, ExecutionPlan, QueryStats};
use crate::graph::GraphInner;
use crate::types::{AttrId, EdgeId, LabelId, NodeId, RelationId};

use super::{OpId, OpKind, Operator};

/// Blueprint for one node created per input record.
#[derive(Clone)]
pub struct CreateNodeSpec {
    pub labels: Vec<LabelId>,
    pub attrs: Vec<(AttrId, Expr)>,
}

/// Edge endpoint: either a node already bound in the record, or a node
/// staged by this operator from the same input record.
#[derive(Clone, Copy)]
pub enum EdgeEndpoint {
    Bound(usize),
    /// Index into the operator's node spec list.
    Created(usize),
}

/// Blueprint for one edge created per input record.
#[derive(Clone)]
pub struct CreateEdgeSpec {
    pub src: EdgeEndpoint,
    pub dest: EdgeEndpoint,
    pub relation: RelationId,
    pub attrs: Vec<(AttrId, Expr)>,
}

enum StagedEndpoint {
    Existing(NodeId),
    New(usize),
}

struct StagedRow {
    nodes: Vec<(Vec<LabelId>, AttrSet)>,
    edges: Vec<(StagedEndpoint, StagedEndpoint, RelationId, AttrSet)>,
}

/// Stages node and edge creation per input record.
pub struct Create {
    children: Vec<OpId>,
    node_specs: Vec<CreateNodeSpec>,
    edge_specs: Vec<CreateEdgeSpec>,
    pending: Vec<StagedRow>,
    /// For the childless form, which stages exactly once.
    ran: bool,
}

impl Create {
    pub fn new(
        child: Option<OpId>,
        node_specs: Vec<CreateNodeSpec>,
        edge_specs: Vec<CreateEdgeSpec>,
    ) -> Self {
        Self {
            children: child.into_iter().collect(),
            node_specs,
            edge_specs,
            pending: Vec::new(),
            ran: false,
        }
    }

    fn eval_attrs(&self, pairs: &[(AttrId, Expr)], record: &Record, ctx: &ExecCtx<'_>) -> Result<AttrSet> {
        let mut attrs = AttrSet::with_capacity(pairs.len());
        for (attr, expr) in pairs {
            let value = expr.eval(record, ctx)?;
            attrs.set(*attr, value);
        }
        Ok(attrs)
    }

    fn stage(&mut self, record: &Record, ctx: &ExecCtx<'_>) -> Result<()> {
        let mut nodes = Vec::with_capacity(self.node_specs.len());
        for spec in &self.node_specs {
            nodes.push((spec.labels.clone(), self.eval_attrs(&spec.attrs, record, ctx)?));
        }
        let mut edges = Vec::with_capacity(self.edge_specs.len());
        for spec in &self.edge_specs {
            let resolve = |ep: EdgeEndpoint| -> Result<StagedEndpoint> {
                match ep {
                    EdgeEndpoint::Bound(slot) => record
                        .node(slot)
                        .map(StagedEndpoint::Existing)
                        .ok_or_else(|| {
                            GraphError::Corruption(format!("edge endpoint slot {slot} unbound"))
                        }),
                    EdgeEndpoint::Created(idx) => Ok(StagedEndpoint::New(idx)),
                }
            };
            edges.push((
                resolve(spec.src)?,
                resolve(spec.dest)?,
                spec.relation,
                self.eval_attrs(&spec.attrs, record, ctx)?,
            ));
        }
        self.pending.push(StagedRow { nodes, edges });
        Ok(())
    }
}

impl Operator for Create {
    fn kind(&self) -> OpKind {
        OpKind::Create
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
        match self.children.first().copied() {
            Some(child) => match plan.pull(child, ctx)? {
                Some(record) => {
                    self.stage(&record, ctx)?;
                    Ok(Some(record))
                }
                None => Ok(None),
            },
            None => {
                if self.ran {
                    return Ok(None);
                }
                self.ran = true;
                let record = ctx.new_record();
                self.stage(&record, ctx)?;
                Ok(None)
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.ran = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Create::new(
            None,
            self.node_specs.clone(),
            self.edge_specs.clone(),
        ))
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn commit(&mut self, g: &mut GraphInner, stats: &mut QueryStats) -> Result<()> {
        for row in self.pending.drain(..) {
            let mut created: SmallVec<[NodeId; 4]> = SmallVec::new();
            for (labels, attrs) in row.nodes {
                created.push(g.create_node(&labels, attrs)?);
                stats.nodes_created += 1;
            }
            for (src, dest, relation, attrs) in row.edges {
                let resolve = |ep: &StagedEndpoint| -> Result<NodeId> {
                    match ep {
                        StagedEndpoint::Existing(id) => Ok(*id),
                        StagedEndpoint::New(idx) => created.get(*idx).copied().ok_or_else(|| {
                            GraphError::Corruption(format!("staged endpoint {idx} out of range"))
                        }),
                    }
                };
                g.create_edge(resolve(&src)?, resolve(&dest)?, relation, attrs)?;
                stats.edges_created += 1;
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.pending.clear();
    }
}

/// One attribute assignment staged per input record.
#[derive(Clone)]
pub struct UpdateItem {
    pub slot: usize,
    pub attr: AttrId,
    pub expr: Expr,
}

enum StagedTarget {
    Node(NodeId),
    Edge(EdgeId),
}

/// Stages attribute updates on bound entities.
pub struct Update {
    children: Vec<OpId>,
    items: Vec<UpdateItem>,
    pending: Vec<(StagedTarget, AttrId, crate::value::Value)>,
}

impl Update {
    pub fn new(child: OpId, items: Vec<UpdateItem>) -> Self {
        Self {
            children: vec![child],
            items,
            pending: Vec::new(),
        }
    }
}

impl Operator for Update {
    fn kind(&self) -> OpKind {
        OpKind::Update
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
        let Some(record) = plan.pull(self.children[0], ctx)? else {
            return Ok(None);
        };
        for item in &self.items {
            let value = item.expr.eval(&record, ctx)?;
            let target = match record.get(item.slot) {
                Slot::Node(id) => StagedTarget::Node(*id),
                Slot::Edge(e) => StagedTarget::Edge(e.id),
                other => {
                    return Err(GraphError::TypeMismatch {
                        expected: "node or edge",
                        got: match other {
                            Slot::Scalar(v) => v.type_name(),
                            _ => "nothing",
                        },
                    })
                }
            };
            self.pending.push((target, item.attr, value));
        }
        Ok(Some(record))
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Update::new(0, self.items.clone()))
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn commit(&mut self, g: &mut GraphInner, stats: &mut QueryStats) -> Result<()> {
        for (target, attr, value) in self.pending.drain(..) {
            let changed = match target {
                StagedTarget::Node(id) => g.set_node_attr(id, attr, value)?,
                StagedTarget::Edge(id) => g.set_edge_attr(id, attr, value)?,
            };
            if changed {
                stats.attrs_set += 1;
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.pending.clear();
    }
}

/// Stages deletion of the entities bound in the given slots.
pub struct Delete {
    children: Vec<OpId>,
    slots: Vec<usize>,
    pending_nodes: Vec<NodeId>,
    pending_edges: Vec<EdgeId>,
}

impl Delete {
    pub fn new(child: OpId, slots: Vec<usize>) -> Self {
        Self {
            children: vec![child],
            slots,
            pending_nodes: Vec::new(),
            pending_edges: Vec::new(),
        }
    }
}

impl Operator for Delete {
    fn kind(&self) -> OpKind {
        OpKind::Delete
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
        let Some(record) = plan.pull(self.children[0], ctx)? else {
            return Ok(None);
        };
        for &slot in &self.slots {
            match record.get(slot) {
                Slot::Node(id) => self.pending_nodes.push(*id),
                Slot::Edge(e) => self.pending_edges.push(e.id),
                Slot::Empty => {}
                Slot::Scalar(v) => {
                    return Err(GraphError::TypeMismatch {
                        expected: "node or edge",
                        got: v.type_name(),
                    })
                }
            }
        }
        Ok(Some(record))
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Delete::new(0, self.slots.clone()))
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn commit(&mut self, g: &mut GraphInner, stats: &mut QueryStats) -> Result<()> {
        // deleting a node may cascade into edges also staged here; dedupe
        // and tolerate entities that are already gone
        self.pending_edges.sort_unstable();
        self.pending_edges.dedup();
        for id in self.pending_edges.drain(..) {
            match g.delete_edge(id) {
                Ok(()) => stats.edges_deleted += 1,
                Err(GraphError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.pending_nodes.sort_unstable();
        self.pending_nodes.dedup();
        for id in self.pending_nodes.drain(..) {
            match g.delete_node(id) {
                Ok(edges) => {
                    stats.nodes_deleted += 1;
                    stats.edges_deleted += edges;
                }
                Err(GraphError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.pending_nodes.clear();
        self.pending_edges.clear();
    }
}

/// Match-or-create: passes matched records through; when the match subtree
/// produces nothing, stages its creation blueprint once.
pub struct Merge {
    children: Vec<OpId>,
    node_specs: Vec<CreateNodeSpec>,
    edge_specs: Vec<CreateEdgeSpec>,
    matched: bool,
    create: Create,
}

impl Merge {
    pub fn new(
        match_child: OpId,
        node_specs: Vec<CreateNodeSpec>,
        edge_specs: Vec<CreateEdgeSpec>,
    ) -> Self {
        Self {
            children: vec![match_child],
            node_specs: node_specs.clone(),
            edge_specs: edge_specs.clone(),
            matched: false,
            create: Create::new(None, node_specs, edge_specs),
        }
    }
}

impl Operator for Merge {
    fn kind(&self) -> OpKind {
        OpKind::Merge
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
        match plan.pull(self.children[0], ctx)? {
            Some(record) => {
                self.matched = true;
                Ok(Some(record))
            }
            None => {
                if !self.matched {
                    self.matched = true;
                    let record = ctx.new_record();
                    self.create.stage(&record, ctx)?;
                }
                Ok(None)
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.matched = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Merge::new(0, self.node_specs.clone(), self.edge_specs.clone()))
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn commit(&mut self, g: &mut GraphInner, stats: &mut QueryStats) -> Result<()> {
        self.create.commit(g, stats)
    }

    fn discard(&mut self) {
        self.create.discard();
    }
}
