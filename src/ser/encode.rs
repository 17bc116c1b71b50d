//! Snapshot encoder.

use tracing::debug;

use crate::error::Result;
use crate::graph::{EdgeSlot, GraphInner};
use crate::matrix::TupleIter;
use crate::storage::PoolScan;
use crate::types::{EdgeId, NodeId, RelationId};

use super::io::SerWriter;
use super::{write_value, PayloadKind, SNAPSHOT_VERSION};

/// Encodes a graph as `vkey_count` virtual keys. Entities are spread
/// evenly across the keys; the schema rides in every key's header so any
/// key can be decoded first... the decoder still requires arrival in
/// order, which the host's snapshot stream guarantees.
pub fn encode_graph(g: &GraphInner, name: &str, vkey_count: usize) -> Result<Vec<Vec<u8>>> {
    let vkey_count = vkey_count.max(1);
    let total_entities = g.node_count()
        + g.nodes().deleted_count()
        + g.edge_count()
        + g.edges().deleted_count();
    let budget = (total_entities / vkey_count as u64).max(1) + 1;

    let mut ctx = EncodeCtx::new(g);
    let mut keys = Vec::with_capacity(vkey_count);
    for key_idx in 0..vkey_count {
        let mut w = SerWriter::new();
        write_header(&mut w, g, name, vkey_count as u64);

        // plan this key's payload sections before writing them
        let last = key_idx == vkey_count - 1;
        let sections = ctx.plan_sections(if last { u64::MAX } else { budget });
        w.write_u64(sections.len() as u64);
        for (kind, count) in &sections {
            w.write_u64(*kind as u64);
            w.write_u64(*count);
        }
        for (kind, count) in sections {
            ctx.write_payload(&mut w, kind, count)?;
        }
        keys.push(w.into_bytes());
    }
    debug!(keys = keys.len(), entities = total_entities, "graph encoded");
    Ok(keys)
}

fn write_header(w: &mut SerWriter, g: &GraphInner, name: &str, key_count: u64) {
    w.write_u64(SNAPSHOT_VERSION);
    w.write_str(name);
    w.write_u64(g.node_count());
    w.write_u64(g.edge_count());
    w.write_u64(g.nodes().deleted_count());
    w.write_u64(g.edges().deleted_count());
    let schema = g.schema();
    w.write_u64(schema.label_count() as u64);
    w.write_u64(schema.relation_count() as u64);
    for rel in 0..schema.relation_count() {
        let multi = g
            .relation(rel as RelationId)
            .map(|store| store.is_multi())
            .unwrap_or(false);
        w.write_u64(u64::from(multi));
    }
    w.write_u64(key_count);

    // schema: label, relation, and attribute names in id order
    for label in 0..schema.label_count() {
        w.write_str(schema.label_name(label as u16).unwrap_or_default());
    }
    for rel in 0..schema.relation_count() {
        w.write_str(schema.relation_name(rel as u16).unwrap_or_default());
    }
    w.write_u64(schema.attr_count() as u64);
    for attr in 0..schema.attr_count() {
        w.write_str(schema.attr_name(attr as u16).unwrap_or_default());
    }
}

/// Cursor state carried across virtual keys so payload sections can split
/// anywhere, including inside a multi-edge cell.
struct EncodeCtx<'g> {
    g: &'g GraphInner,
    node_scan: PoolScan,
    nodes_left: u64,
    deleted_nodes_at: usize,
    edges_left: u64,
    deleted_edges_at: usize,
    edge_cursor: EdgeCursor,
}

struct EdgeCursor {
    relation: usize,
    iter: TupleIter,
    attached: bool,
    /// Multi-edge cell being drained: (src, dest, edge ids, next index).
    multi: Option<(NodeId, NodeId, Vec<EdgeId>, usize)>,
}

impl<'g> EncodeCtx<'g> {
    fn new(g: &'g GraphInner) -> Self {
        Self {
            g,
            node_scan: g.nodes().scan(),
            nodes_left: g.node_count(),
            deleted_nodes_at: 0,
            edges_left: g.edge_count(),
            deleted_edges_at: 0,
            edge_cursor: EdgeCursor {
                relation: 0,
                iter: TupleIter::new(),
                attached: false,
                multi: None,
            },
        }
    }

    /// Decides the payload sections for one key under an entity budget.
    fn plan_sections(&mut self, mut budget: u64) -> Vec<(PayloadKind, u64)> {
        let mut sections = Vec::new();
        let deleted_nodes_left =
            self.g.nodes().deleted_count() - self.deleted_nodes_at as u64;
        let deleted_edges_left =
            self.g.edges().deleted_count() - self.deleted_edges_at as u64;

        let mut take = |left: &mut u64, budget: &mut u64| -> u64 {
            let n = (*left).min(*budget);
            *left -= n;
            *budget -= n;
            n
        };

        let mut nodes_left = self.nodes_left;
        let n = take(&mut nodes_left, &mut budget);
        if n > 0 {
            sections.push((PayloadKind::Nodes, n));
        }
        let mut deleted_nodes = deleted_nodes_left;
        let n = take(&mut deleted_nodes, &mut budget);
        if n > 0 {
            sections.push((PayloadKind::DeletedNodes, n));
        }
        let mut edges_left = self.edges_left;
        let n = take(&mut edges_left, &mut budget);
        if n > 0 {
            sections.push((PayloadKind::Edges, n));
        }
        let mut deleted_edges = deleted_edges_left;
        let n = take(&mut deleted_edges, &mut budget);
        if n > 0 {
            sections.push((PayloadKind::DeletedEdges, n));
        }
        sections
    }

    fn write_payload(&mut self, w: &mut SerWriter, kind: PayloadKind, count: u64) -> Result<()> {
        match kind {
            PayloadKind::Nodes => self.write_nodes(w, count),
            PayloadKind::DeletedNodes => {
                let ids = self.g.nodes().deleted_ids();
                for i in 0..count as usize {
                    w.write_u64(ids[self.deleted_nodes_at + i]);
                }
                self.deleted_nodes_at += count as usize;
                Ok(())
            }
            PayloadKind::Edges => self.write_edges(w, count),
            PayloadKind::DeletedEdges => {
                let ids = self.g.edges().deleted_ids();
                for i in 0..count as usize {
                    w.write_u64(ids[self.deleted_edges_at + i]);
                }
                self.deleted_edges_at += count as usize;
                Ok(())
            }
            PayloadKind::GraphSchema => Ok(()),
        }
    }

    fn write_nodes(&mut self, w: &mut SerWriter, count: u64) -> Result<()> {
        for _ in 0..count {
            let Some(id) = self.node_scan.next(self.g.nodes()) else {
                break;
            };
            let Some(node) = self.g.get_node(id) else {
                continue;
            };
            w.write_u64(id);
            w.write_u64(node.labels.len() as u64);
            for &label in &node.labels {
                w.write_u64(label as u64);
            }
            write_attrs(w, &node.attrs);
            self.nodes_left -= 1;
        }
        Ok(())
    }

    fn write_edges(&mut self, w: &mut SerWriter, count: u64) -> Result<()> {
        let mut written = 0u64;
        while written < count {
            // drain a multi-edge cell left over from the previous key first
            if let Some((src, dest, ids, at)) = self.edge_cursor.multi.take() {
                let mut at = at;
                while at < ids.len() && written < count {
                    self.write_edge(w, ids[at], src, dest)?;
                    at += 1;
                    written += 1;
                }
                if at < ids.len() {
                    self.edge_cursor.multi = Some((src, dest, ids, at));
                    continue;
                }
            }

            let Some((src, dest, cell)) = self.next_cell() else {
                break;
            };
            match EdgeSlot::decode(cell) {
                EdgeSlot::Single(id) => {
                    self.write_edge(w, id, src, dest)?;
                    written += 1;
                }
                EdgeSlot::Multi(handle) => {
                    let store = self
                        .g
                        .relation(self.edge_cursor.relation as RelationId)
                        .expect("cursor on a registered relation");
                    let ids = store.arena_edges(handle).to_vec();
                    self.edge_cursor.multi = Some((src, dest, ids, 0));
                }
            }
        }
        self.edges_left -= written;
        Ok(())
    }

    /// Advances the relation-matrix cursor, moving to the next relation
    /// matrix when the current one is exhausted.
    fn next_cell(&mut self) -> Option<(NodeId, NodeId, u64)> {
        loop {
            if self.edge_cursor.relation >= self.g.schema().relation_count() {
                return None;
            }
            let store = self.g.relation(self.edge_cursor.relation as RelationId)?;
            if !self.edge_cursor.attached {
                self.edge_cursor.iter.attach(store.matrix());
                self.edge_cursor.attached = true;
            }
            match self.edge_cursor.iter.next(store.matrix()) {
                Some(tuple) => return Some(tuple),
                None => {
                    self.edge_cursor.relation += 1;
                    self.edge_cursor.attached = false;
                }
            }
        }
    }

    fn write_edge(&mut self, w: &mut SerWriter, id: EdgeId, src: NodeId, dest: NodeId) -> Result<()> {
        let Some(edge) = self.g.get_edge(id) else {
            return Ok(());
        };
        w.write_u64(id);
        w.write_u64(src);
        w.write_u64(dest);
        w.write_u64(edge.relation as u64);
        write_attrs(w, &edge.attrs);
        Ok(())
    }
}

fn write_attrs(w: &mut SerWriter, attrs: &crate::attrset::AttrSet) {
    w.write_u64(attrs.len() as u64);
    for (attr, value) in attrs.iter() {
        w.write_u64(attr as u64);
        write_value(w, value);
    }
}
