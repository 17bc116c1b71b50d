//! Batched index population.
//!
//! Entities are indexed in fixed-size batches while the graph's read lock
//! is held; the lock is released between batches so writers make progress
//! during a long population. Writers index their own changes directly while
//! the index is populating or active, so an entity indexed twice is fine;
//! an entity missed is not.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::graph::{EdgeSlot, Graph};
use crate::matrix::TupleIter;
use crate::types::EntityId;

use super::{Index, IndexState, IndexTarget};

/// Runs population to completion on the current thread, then enables the
/// index if its state is still `Populating`.
pub fn populate(idx: &Index, graph: &Graph, batch_size: usize) {
    debug_assert!(batch_size > 0);
    match idx.target() {
        IndexTarget::Node => populate_nodes(idx, graph, batch_size),
        IndexTarget::Edge => populate_edges(idx, graph, batch_size),
    }
    idx.enable();
}

/// Spawns population on a dedicated thread.
pub fn spawn_populate(idx: Arc<Index>, graph: Arc<Graph>, batch_size: usize) -> JoinHandle<()> {
    thread::spawn(move || populate(&idx, &graph, batch_size))
}

fn populate_nodes(idx: &Index, graph: &Graph, batch_size: usize) {
    let mut resume_row: u64 = 0;
    let mut it = TupleIter::new();

    loop {
        // a state change (drop, competing re-create) aborts population
        if idx.state() != IndexState::Populating {
            break;
        }

        let mut indexed = 0usize;
        let mut last_id: EntityId = 0;

        let g = graph.read();
        let matrix = match g.label_matrix(idx.label()) {
            Some(m) => m,
            None => break,
        };

        // the label matrix may have changed while the lock was free;
        // re-attach and resume from the last indexed row
        it.attach(matrix);
        it.jump_to_row(resume_row);

        while indexed < batch_size {
            let Some((id, _, _)) = it.next(matrix) else {
                break;
            };
            if let Some(node) = g.get_node(id) {
                idx.index_entity(id, &node.attrs);
            }
            last_id = id;
            indexed += 1;
        }

        drop(g);

        if indexed != batch_size {
            // iterator depleted, no more nodes to index
            break;
        }
        it.detach();
        // the label matrix is diagonal, so the next batch resumes at the
        // row after the last indexed node
        resume_row = last_id + 1;
        debug!(label = idx.label(), resume_row, "node index batch complete");
    }

    info!(label = idx.label(), "node index population finished");
}

fn populate_edges(idx: &Index, graph: &Graph, batch_size: usize) {
    // resume strictly after the last indexed (src, dest) pair
    let mut resume: Option<(u64, u64)> = None;
    let mut it = TupleIter::new();

    loop {
        if idx.state() != IndexState::Populating {
            break;
        }

        let mut indexed = 0usize;

        let g = graph.read();
        let store = match g.relation(idx.label()) {
            Some(r) => r,
            None => break,
        };
        let matrix = store.matrix();

        it.attach(matrix);
        if let Some((prev_src, _)) = resume {
            it.jump_to_row(prev_src);
        }

        // skip previously indexed entries
        let mut tuple = it.next(matrix);
        if let Some((prev_src, prev_dest)) = resume {
            while let Some((src, dest, _)) = tuple {
                if (src, dest) > (prev_src, prev_dest) {
                    break;
                }
                tuple = it.next(matrix);
            }
        }

        // batch: a multi-edge slot is expanded atomically, so the batch
        // size is a soft cap
        while let Some((src, dest, cell)) = tuple {
            match EdgeSlot::decode(cell) {
                EdgeSlot::Single(edge_id) => {
                    if let Some(edge) = g.get_edge(edge_id) {
                        idx.index_entity(edge_id, &edge.attrs);
                    }
                }
                EdgeSlot::Multi(handle) => {
                    for &edge_id in store.arena_edges(handle) {
                        if let Some(edge) = g.get_edge(edge_id) {
                            idx.index_entity(edge_id, &edge.attrs);
                        }
                    }
                }
            }
            resume = Some((src, dest));
            indexed += 1;
            if indexed >= batch_size {
                break;
            }
            tuple = it.next(matrix);
        }

        drop(g);

        if indexed != batch_size {
            // iterator depleted, no more edges to index
            break;
        }
        it.detach();
        debug!(relation = idx.label(), "edge index batch complete");
    }

    info!(relation = idx.label(), "edge index population finished");
}
