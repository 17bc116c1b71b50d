//! Snapshot decoder.

use smallvec::SmallVec;

use tracing::{debug, info};

use crate::attrset::AttrSet;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, Node, SyncPolicy};
use crate::index::IndexState;
use crate::types::{LabelId, RelationId};

use super::io::SerReader;
use super::{read_value, PayloadKind, MIN_SNAPSHOT_VERSION, SNAPSHOT_VERSION};

/// Streaming decoder: virtual keys are fed in order; `finish` seals the
/// graph. The first key pre-allocates stores and matrices to their final
/// sizes and switches the sync policy to resize-only so the remaining keys
/// stream entities without implicit flushes.
pub struct GraphDecoder {
    graph: Option<Graph>,
    keys_fed: u64,
    keys_expected: u64,
}

impl GraphDecoder {
    pub fn new() -> Self {
        Self {
            graph: None,
            keys_fed: 0,
            keys_expected: 0,
        }
    }

    /// Decodes one virtual key.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        let mut r = SerReader::new(bytes);
        let header = self.read_header(&mut r)?;

        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| GraphError::Corruption("decoder lost its graph".into()))?;
        let mut g = graph.write();

        let payload_count = r.read_u64()?;
        let mut sections = Vec::with_capacity(payload_count as usize);
        for _ in 0..payload_count {
            let kind = PayloadKind::from_u64(r.read_u64()?)?;
            let count = r.read_u64()?;
            sections.push((kind, count));
        }

        for (kind, count) in sections {
            match kind {
                PayloadKind::Nodes => {
                    for _ in 0..count {
                        let id = r.read_u64()?;
                        let label_count = r.read_u64()? as usize;
                        let mut labels: SmallVec<[LabelId; 4]> = SmallVec::new();
                        for _ in 0..label_count {
                            labels.push(r.read_u64()? as LabelId);
                        }
                        let attrs = read_attrs(&mut r)?;
                        g.restore_node(id, Node { labels, attrs });
                    }
                }
                PayloadKind::DeletedNodes => {
                    for _ in 0..count {
                        let id = r.read_u64()?;
                        g.restore_deleted_node(id);
                    }
                }
                PayloadKind::Edges => {
                    for _ in 0..count {
                        let id = r.read_u64()?;
                        let src = r.read_u64()?;
                        let dest = r.read_u64()?;
                        let relation = r.read_u64()? as RelationId;
                        let attrs = read_attrs(&mut r)?;
                        g.restore_edge(
                            id,
                            Edge {
                                src,
                                dest,
                                relation,
                                attrs,
                            },
                        )?;
                    }
                }
                PayloadKind::DeletedEdges => {
                    for _ in 0..count {
                        let id = r.read_u64()?;
                        g.restore_deleted_edge(id);
                    }
                }
                // schema is handled in the header
                PayloadKind::GraphSchema => {}
            }
        }

        drop(g);
        self.keys_fed += 1;
        self.keys_expected = header.key_count;
        debug!(key = self.keys_fed, of = self.keys_expected, "virtual key decoded");
        Ok(())
    }

    /// Seals the decode: rebuilds the node-label matrix, flushes every
    /// matrix, restores the steady-state sync policy, and enables indices
    /// still pending population.
    pub fn finish(mut self) -> Result<Graph> {
        let graph = self
            .graph
            .take()
            .ok_or_else(|| GraphError::Corruption("no virtual keys decoded".into()))?;
        if self.keys_expected != 0 && self.keys_fed != self.keys_expected {
            return Err(GraphError::Corruption(format!(
                "decoded {} of {} virtual keys",
                self.keys_fed, self.keys_expected
            )));
        }
        {
            let mut g = graph.write();
            g.rebuild_node_label_matrix();
            g.apply_all_pending(true);
            g.set_policy(SyncPolicy::FlushResize);
            for idx in g.indices().to_vec() {
                if idx.state() == IndexState::Populating {
                    idx.enable();
                }
            }
            info!(
                nodes = g.node_count(),
                edges = g.edge_count(),
                "graph decode finished"
            );
        }
        Ok(graph)
    }

    fn read_header(&mut self, r: &mut SerReader<'_>) -> Result<Header> {
        let version = r.read_u64()?;
        if !(MIN_SNAPSHOT_VERSION..=SNAPSHOT_VERSION).contains(&version) {
            return Err(GraphError::Corruption(format!(
                "unsupported snapshot version {version}"
            )));
        }
        let name = r.read_str()?;
        let node_count = r.read_u64()?;
        let edge_count = r.read_u64()?;
        let deleted_node_count = r.read_u64()?;
        let deleted_edge_count = r.read_u64()?;
        let label_count = r.read_u64()? as usize;
        let relation_count = r.read_u64()? as usize;
        let mut multi = Vec::with_capacity(relation_count);
        for _ in 0..relation_count {
            multi.push(r.read_u64()? != 0);
        }
        let key_count = r.read_u64()?;

        let mut label_names = Vec::with_capacity(label_count);
        for _ in 0..label_count {
            label_names.push(r.read_str()?);
        }
        let mut relation_names = Vec::with_capacity(relation_count);
        for _ in 0..relation_count {
            relation_names.push(r.read_str()?);
        }
        let attr_count = r.read_u64()? as usize;
        let mut attr_names = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            attr_names.push(r.read_str()?);
        }

        if self.graph.is_none() {
            // first virtual key: allocate everything at final size so the
            // remaining keys stream without reallocation
            let graph = Graph::new(name, SyncPolicy::Resize);
            {
                let mut g = graph.write();
                g.reserve_entities(
                    node_count + deleted_node_count,
                    edge_count + deleted_edge_count,
                );
                for label in &label_names {
                    g.add_label(label);
                }
                for relation in &relation_names {
                    g.add_relation(relation);
                }
                for attr in &attr_names {
                    g.schema_mut().add_attr(attr);
                }
                for (rel, &flag) in multi.iter().enumerate() {
                    g.set_relation_multi(rel as RelationId, flag);
                }
            }
            self.graph = Some(graph);
        }

        Ok(Header { key_count })
    }
}

impl Default for GraphDecoder {
    fn default() -> Self {
        Self::new()
    }
}

struct Header {
    key_count: u64,
}

fn read_attrs(r: &mut SerReader<'_>) -> Result<AttrSet> {
    let count = r.read_u64()? as usize;
    let mut attrs = AttrSet::with_capacity(count);
    for _ in 0..count {
        let attr = r.read_u64()? as u16;
        attrs.set(attr, read_value(r)?);
    }
    Ok(attrs)
}
