use std::sync::Arc;
use std::time::Duration;

use deltagraph::attrset::AttrSet;
use deltagraph::index::{populate, spawn_populate, Index, IndexKind, IndexState, IndexTarget};
use deltagraph::{Config, Graph, GraphStore, SyncPolicy, Value};

fn labeled_graph(n: u64) -> (Arc<Graph>, u16, u16) {
    let graph = Graph::new("g", SyncPolicy::FlushResize);
    let (label, attr) = {
        let mut g = graph.write();
        let label = g.add_label("P");
        let attr = g.schema_mut().add_attr("v");
        for i in 0..n {
            let mut attrs = AttrSet::new();
            attrs.set(attr, Value::Int(i as i64));
            g.create_node(&[label], attrs).unwrap();
        }
        g.apply_all_pending(false);
        (label, attr)
    };
    (Arc::new(graph), label, attr)
}

#[test]
fn node_population_indexes_everything() {
    let (graph, label, attr) = labeled_graph(100);
    let index = Arc::new(Index::new(
        IndexTarget::Node,
        label,
        vec![attr],
        IndexKind::Range,
    ));
    index.set_state(IndexState::Populating);
    graph.write().register_index(Arc::clone(&index));

    // batch size 3 forces many release windows
    populate(&index, &graph, 3);

    assert_eq!(index.state(), IndexState::Active);
    assert_eq!(index.entity_count(), 100);
    for i in 0..100i64 {
        assert_eq!(index.lookup(attr, &Value::Int(i)).len(), 1, "value {i}");
    }
}

/// Spec scenario: a node inserted while the populator is between batches
/// must end up indexed, either by the populator pass or by the writer's
/// direct path.
#[test]
fn population_is_complete_under_concurrent_insertion() {
    let (graph, label, attr) = labeled_graph(100);
    let index = Arc::new(Index::new(
        IndexTarget::Node,
        label,
        vec![attr],
        IndexKind::Range,
    ));
    index.set_state(IndexState::Populating);
    graph.write().register_index(Arc::clone(&index));

    let populator = spawn_populate(Arc::clone(&index), Arc::clone(&graph), 3);

    // compete for the lock while the populator yields between batches
    let inserted = {
        let mut g = graph.write();
        let mut attrs = AttrSet::new();
        attrs.set(attr, Value::Int(1000));
        let id = g.create_node(&[label], attrs).unwrap();
        g.apply_all_pending(false);
        id
    };

    populator.join().unwrap();

    assert_eq!(index.state(), IndexState::Active);
    assert_eq!(index.entity_count(), 101);
    assert_eq!(index.lookup(attr, &Value::Int(1000)), vec![inserted]);
}

#[test]
fn edge_population_expands_multi_edge_slots() {
    let graph = Arc::new(Graph::new("g", SyncPolicy::FlushResize));
    let (rel, attr) = {
        let mut g = graph.write();
        let rel = g.add_relation("R");
        let attr = g.schema_mut().add_attr("w");
        for _ in 0..10 {
            g.create_node(&[], AttrSet::new()).unwrap();
        }
        // a chain plus a fat parallel bundle in the middle
        for i in 0..9u64 {
            let mut attrs = AttrSet::new();
            attrs.set(attr, Value::Int(i as i64));
            g.create_edge(i, i + 1, rel, attrs).unwrap();
        }
        for j in 0..7u64 {
            let mut attrs = AttrSet::new();
            attrs.set(attr, Value::Int(100 + j as i64));
            g.create_edge(4, 5, rel, attrs).unwrap();
        }
        g.apply_all_pending(false);
        (rel, attr)
    };

    let index = Arc::new(Index::new(
        IndexTarget::Edge,
        rel,
        vec![attr],
        IndexKind::Range,
    ));
    index.set_state(IndexState::Populating);
    graph.write().register_index(Arc::clone(&index));

    // batch of 2 slots: the multi-edge slot overflows the soft cap and
    // the resume position must not skip or repeat edges
    populate(&index, &graph, 2);

    assert_eq!(index.state(), IndexState::Active);
    assert_eq!(index.entity_count(), 16);
}

#[test]
fn population_aborts_on_state_change() {
    let (graph, label, attr) = labeled_graph(50);
    let index = Arc::new(Index::new(
        IndexTarget::Node,
        label,
        vec![attr],
        IndexKind::Range,
    ));
    // never set to Populating: the loop exits before indexing anything
    graph.write().register_index(Arc::clone(&index));
    populate(&index, &graph, 10);
    assert_eq!(index.state(), IndexState::Created);
    assert_eq!(index.entity_count(), 0);
}

#[test]
fn writers_update_active_indices_directly() {
    let (graph, label, attr) = labeled_graph(10);
    let index = Arc::new(Index::new(
        IndexTarget::Node,
        label,
        vec![attr],
        IndexKind::Range,
    ));
    index.set_state(IndexState::Populating);
    graph.write().register_index(Arc::clone(&index));
    populate(&index, &graph, 1000);
    assert_eq!(index.state(), IndexState::Active);

    {
        let mut g = graph.write();
        let mut attrs = AttrSet::new();
        attrs.set(attr, Value::Int(777));
        g.create_node(&[label], attrs).unwrap();
        g.apply_all_pending(false);
    }
    assert_eq!(index.lookup(attr, &Value::Int(777)).len(), 1);

    // attribute updates move postings
    {
        let mut g = graph.write();
        g.set_node_attr(0, attr, Value::Int(888)).unwrap();
    }
    assert!(index.lookup(attr, &Value::Int(0)).is_empty());
    assert_eq!(index.lookup(attr, &Value::Int(888)), vec![0]);

    // deletion removes postings
    {
        let mut g = graph.write();
        g.delete_node(1).unwrap();
        g.apply_all_pending(false);
    }
    assert!(index.lookup(attr, &Value::Int(1)).is_empty());
}

#[test]
fn store_surface_drives_index_lifecycle() {
    let store = GraphStore::new(Config::default());
    {
        let graph = store.get_or_create("social");
        let mut g = graph.write();
        let label = g.add_label("Person");
        let age = g.schema_mut().add_attr("age");
        for i in 0..25 {
            let mut attrs = AttrSet::new();
            attrs.set(age, Value::Int(20 + (i % 5)));
            g.create_node(&[label], attrs).unwrap();
        }
        g.apply_all_pending(false);
    }

    let (index, handle) = store
        .create_node_index("social", "Person", &["age"], IndexKind::Range)
        .unwrap();
    handle.join().unwrap();
    assert_eq!(index.state(), IndexState::Active);
    assert_eq!(index.entity_count(), 25);

    let age = store
        .get("social")
        .unwrap()
        .read()
        .schema()
        .attr_id("age")
        .unwrap();
    assert_eq!(index.lookup(age, &Value::Int(22)).len(), 5);
    let in_range = index.lookup_range(age, &Value::Int(21), &Value::Int(23));
    assert_eq!(in_range.len(), 15);

    // double create is rejected; drop then recreate is fine
    assert!(store
        .create_node_index("social", "Person", &["age"], IndexKind::Range)
        .is_err());
    store
        .drop_index("social", IndexTarget::Node, "Person")
        .unwrap();
    assert_eq!(index.state(), IndexState::Dropped);
    let (index2, handle2) = store
        .create_node_index("social", "Person", &["age"], IndexKind::Range)
        .unwrap();
    handle2.join().unwrap();
    assert_eq!(index2.state(), IndexState::Active);
}

#[test]
fn vector_flavored_index_populates_through_the_same_protocol() {
    let graph = Arc::new(Graph::new("g", SyncPolicy::FlushResize));
    let (label, attr) = {
        let mut g = graph.write();
        let label = g.add_label("Doc");
        let attr = g.schema_mut().add_attr("embedding");
        for i in 0..8 {
            let mut attrs = AttrSet::new();
            attrs.set(attr, Value::Vector(vec![i as f32, 1.0]));
            g.create_node(&[label], attrs).unwrap();
        }
        g.apply_all_pending(false);
        (label, attr)
    };

    let index = Arc::new(Index::new(
        IndexTarget::Node,
        label,
        vec![attr],
        IndexKind::Vector,
    ));
    index.set_state(IndexState::Populating);
    graph.write().register_index(Arc::clone(&index));
    populate(&index, &graph, 3);
    assert_eq!(index.state(), IndexState::Active);
    assert_eq!(index.entity_count(), 8);
}

#[test]
fn populator_thread_yields_between_batches() {
    // a large graph with a tiny batch: the populator must finish even
    // while another thread repeatedly takes the write lock
    let (graph, label, attr) = labeled_graph(500);
    let index = Arc::new(Index::new(
        IndexTarget::Node,
        label,
        vec![attr],
        IndexKind::Range,
    ));
    index.set_state(IndexState::Populating);
    graph.write().register_index(Arc::clone(&index));

    let populator = spawn_populate(Arc::clone(&index), Arc::clone(&graph), 7);
    for _ in 0..5 {
        let mut g = graph.write();
        g.apply_all_pending(false);
        drop(g);
        std::thread::sleep(Duration::from_millis(1));
    }
    populator.join().unwrap();
    assert!(index.entity_count() >= 500);
    assert_eq!(index.state(), IndexState::Active);
}
