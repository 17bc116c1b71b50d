use deltagraph::attrset::AttrSet;
use deltagraph::exec::ops::{AllNodeScan, CondTraverse, NodeByLabelScan, Project, Projection, TraverseDir, VarLenTraverse};
use deltagraph::exec::{execute_plan, ExecutionPlan, Expr, Params};
use deltagraph::{Graph, NodeId, RelationId, SyncPolicy, Value};

fn chain_graph(n: u64) -> (Graph, RelationId) {
    // 0 -> 1 -> 2 -> ... -> n-1
    let graph = Graph::new("g", SyncPolicy::FlushResize);
    let rel = {
        let mut g = graph.write();
        g.add_label("N");
        let rel = g.add_relation("NEXT");
        for _ in 0..n {
            g.create_node(&[], AttrSet::new()).unwrap();
        }
        for i in 0..n - 1 {
            g.create_edge(i, i + 1, rel, AttrSet::new()).unwrap();
        }
        g.apply_all_pending(false);
        rel
    };
    (graph, rel)
}

fn pair_rows(rows: &[Vec<Value>]) -> Vec<(i64, i64)> {
    let mut pairs: Vec<(i64, i64)> = rows
        .iter()
        .map(|row| (row[0].as_int().unwrap(), row[1].as_int().unwrap()))
        .collect();
    pairs.sort_unstable();
    pairs
}

fn traverse_plan(rel: Option<RelationId>, dir: TraverseDir, record_cap: usize) -> ExecutionPlan {
    let mut plan = ExecutionPlan::new(4);
    let scan = plan.add_op(Box::new(AllNodeScan::new(0)));
    let traverse = plan.add_op(Box::new(CondTraverse::new(scan, rel, dir, 0, 1, record_cap)));
    let project = plan.add_op(Box::new(Project::new(
        traverse,
        vec![
            Projection {
                expr: Expr::EntityId(0),
                slot: 2,
                alias: "src".into(),
            },
            Projection {
                expr: Expr::EntityId(1),
                slot: 3,
                alias: "dest".into(),
            },
        ],
    )));
    plan.set_root(project);
    plan.set_columns(vec![("src".into(), 2), ("dest".into(), 3)]);
    plan
}

#[test]
fn cond_traverse_expands_all_pairs() {
    let (graph, rel) = chain_graph(10);
    let mut plan = traverse_plan(Some(rel), TraverseDir::Outgoing, 16);
    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    let expected: Vec<(i64, i64)> = (0..9).map(|i| (i, i + 1)).collect();
    assert_eq!(pair_rows(&result.rows), expected);
}

/// A record cap smaller than the input forces multiple batch refills; the
/// output must not change.
#[test]
fn cond_traverse_batches_by_record_cap() {
    let (graph, rel) = chain_graph(30);
    let mut plan = traverse_plan(Some(rel), TraverseDir::Outgoing, 4);
    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    let expected: Vec<(i64, i64)> = (0..29).map(|i| (i, i + 1)).collect();
    assert_eq!(pair_rows(&result.rows), expected);
}

#[test]
fn cond_traverse_incoming_flips_direction() {
    let (graph, rel) = chain_graph(5);
    let mut plan = traverse_plan(Some(rel), TraverseDir::Incoming, 16);
    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    let expected: Vec<(i64, i64)> = (1..5).map(|i| (i, i - 1)).collect();
    assert_eq!(pair_rows(&result.rows), expected);
}

#[test]
fn cond_traverse_binds_parallel_edges() {
    let graph = Graph::new("g", SyncPolicy::FlushResize);
    let rel = {
        let mut g = graph.write();
        let rel = g.add_relation("R");
        let a = g.create_node(&[], AttrSet::new()).unwrap();
        let b = g.create_node(&[], AttrSet::new()).unwrap();
        g.create_edge(a, b, rel, AttrSet::new()).unwrap();
        g.create_edge(a, b, rel, AttrSet::new()).unwrap();
        g.apply_all_pending(false);
        rel
    };

    let mut plan = ExecutionPlan::new(4);
    let scan = plan.add_op(Box::new(AllNodeScan::new(0)));
    let traverse = plan.add_op(Box::new(
        CondTraverse::new(scan, Some(rel), TraverseDir::Outgoing, 0, 1, 16).with_edge_slot(2),
    ));
    let project = plan.add_op(Box::new(Project::new(
        traverse,
        vec![Projection {
            expr: Expr::EntityId(2),
            slot: 3,
            alias: "edge".into(),
        }],
    )));
    plan.set_root(project);
    plan.set_columns(vec![("edge".into(), 3)]);

    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    let mut edges: Vec<i64> = result.rows.iter().map(|r| r[0].as_int().unwrap()).collect();
    edges.sort_unstable();
    assert_eq!(edges, vec![0, 1]);
}

/// `a -> b -> c -> a`, paths of length 1..=3 from `a`: the cycle closes
/// back to `a` but is not expanded further.
#[test]
fn var_len_cycle_closes_without_reexpansion() {
    let graph = Graph::new("g", SyncPolicy::FlushResize);
    let (rel, a) = {
        let mut g = graph.write();
        let l = g.add_label("Start");
        let rel = g.add_relation("R");
        let a = g.create_node(&[l], AttrSet::new()).unwrap();
        let b = g.create_node(&[], AttrSet::new()).unwrap();
        let c = g.create_node(&[], AttrSet::new()).unwrap();
        g.create_edge(a, b, rel, AttrSet::new()).unwrap();
        g.create_edge(b, c, rel, AttrSet::new()).unwrap();
        g.create_edge(c, a, rel, AttrSet::new()).unwrap();
        g.apply_all_pending(false);
        (rel, a)
    };
    assert_eq!(a, 0);

    let mut plan = ExecutionPlan::new(3);
    let scan = plan.add_op(Box::new(NodeByLabelScan::new("Start", 0)));
    let var_len = plan.add_op(Box::new(
        VarLenTraverse::new(scan, Some(rel), TraverseDir::Outgoing, 0, 1, 1, 3).unwrap(),
    ));
    let project = plan.add_op(Box::new(Project::new(
        var_len,
        vec![Projection {
            expr: Expr::EntityId(1),
            slot: 2,
            alias: "x".into(),
        }],
    )));
    plan.set_root(project);
    plan.set_columns(vec![("x".into(), 2)]);

    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    let reached: Vec<i64> = result.rows.iter().map(|r| r[0].as_int().unwrap()).collect();
    assert_eq!(reached, vec![1, 2, 0]);
}

#[test]
fn var_len_min_length_filters_short_paths() {
    let (graph, rel) = chain_graph(5);
    let mut plan = ExecutionPlan::new(3);
    let scan = plan.add_op(Box::new(AllNodeScan::new(0)));
    let var_len = plan.add_op(Box::new(
        VarLenTraverse::new(scan, Some(rel), TraverseDir::Outgoing, 0, 1, 2, 3).unwrap(),
    ));
    let project = plan.add_op(Box::new(Project::new(
        var_len,
        vec![
            Projection {
                expr: Expr::EntityId(0),
                slot: 2,
                alias: "src".into(),
            },
        ],
    )));
    plan.set_root(project);
    plan.set_columns(vec![("src".into(), 2)]);

    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    // from node 0: destinations 2 and 3; from 1: 3 and 4; from 2: 4
    assert_eq!(result.rows.len(), 5);
}

/// Spec scenario: a reader holding the lock does not observe a concurrent
/// writer; after release the writer's changes become visible.
#[test]
fn reader_sees_consistent_view_under_concurrent_writer() {
    let graph = std::sync::Arc::new(Graph::new("g", SyncPolicy::FlushResize));
    {
        let mut g = graph.write();
        let l = g.add_label("L");
        for _ in 0..3 {
            g.create_node(&[l], AttrSet::new()).unwrap();
        }
        g.apply_all_pending(false);
    }

    let reader_guard = graph.read();
    let before = reader_guard.node_count();

    let writer = {
        let graph = std::sync::Arc::clone(&graph);
        std::thread::spawn(move || {
            let mut g = graph.write(); // blocks until the reader releases
            let l = g.schema().label_id("L").unwrap();
            g.create_node(&[l], AttrSet::new()).unwrap();
            g.apply_all_pending(false);
        })
    };

    // the writer is blocked; the reader's view is unchanged
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(reader_guard.node_count(), before);
    drop(reader_guard);

    writer.join().unwrap();
    assert_eq!(graph.read().node_count(), before + 1);
}

#[test]
fn adjacency_traversal_spans_all_relations() {
    let graph = Graph::new("g", SyncPolicy::FlushResize);
    {
        let mut g = graph.write();
        let r1 = g.add_relation("A");
        let r2 = g.add_relation("B");
        let n0: NodeId = g.create_node(&[], AttrSet::new()).unwrap();
        let n1 = g.create_node(&[], AttrSet::new()).unwrap();
        let n2 = g.create_node(&[], AttrSet::new()).unwrap();
        g.create_edge(n0, n1, r1, AttrSet::new()).unwrap();
        g.create_edge(n0, n2, r2, AttrSet::new()).unwrap();
        g.apply_all_pending(false);
    }

    let mut plan = traverse_plan(None, TraverseDir::Outgoing, 16);
    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    assert_eq!(pair_rows(&result.rows), vec![(0, 1), (0, 2)]);
}
