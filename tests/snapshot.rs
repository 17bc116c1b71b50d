use std::io::{Read, Write};

use deltagraph::attrset::AttrSet;
use deltagraph::graph::EdgeSlot;
use deltagraph::ser::{encode_graph, GraphDecoder};
use deltagraph::{Graph, GraphError, SyncPolicy, Value};

fn sample_graph() -> Graph {
    let graph = Graph::new("snapshot-test", SyncPolicy::FlushResize);
    {
        let mut g = graph.write();
        let person = g.add_label("Person");
        let city = g.add_label("City");
        let knows = g.add_relation("KNOWS");
        let lives_in = g.add_relation("LIVES_IN");
        let name = g.schema_mut().add_attr("name");
        let pos = g.schema_mut().add_attr("pos");
        let tags = g.schema_mut().add_attr("tags");

        let mut attrs = AttrSet::new();
        attrs.set(name, Value::String("ada".into()));
        attrs.set(tags, Value::Array(vec![Value::Int(1), Value::String("x".into())]));
        let a = g.create_node(&[person], attrs).unwrap();

        let mut attrs = AttrSet::new();
        attrs.set(name, Value::String("grace".into()));
        let b = g.create_node(&[person], attrs).unwrap();

        let mut attrs = AttrSet::new();
        attrs.set(name, Value::String("london".into()));
        attrs.set(pos, Value::Point { lat: 51.5, lon: -0.12 });
        let c = g.create_node(&[city], attrs).unwrap();

        let mut attrs = AttrSet::new();
        attrs.set(name, Value::Map(vec![("since".into(), Value::Int(1970))]));
        g.create_edge(a, b, knows, attrs).unwrap();
        g.create_edge(a, c, lives_in, AttrSet::new()).unwrap();
        g.create_edge(b, c, lives_in, AttrSet::new()).unwrap();

        // leave a hole in the id layout
        let doomed = g.create_node(&[person], AttrSet::new()).unwrap();
        g.create_node(&[], AttrSet::new()).unwrap();
        g.delete_node(doomed).unwrap();

        g.apply_all_pending(false);
    }
    graph
}

fn decode(keys: &[Vec<u8>]) -> Graph {
    let mut decoder = GraphDecoder::new();
    for key in keys {
        decoder.feed(key).unwrap();
    }
    decoder.finish().unwrap()
}

fn assert_graphs_equal(a: &Graph, b: &Graph) {
    let ga = a.read();
    let gb = b.read();
    assert_eq!(ga.node_count(), gb.node_count());
    assert_eq!(ga.edge_count(), gb.edge_count());
    assert_eq!(ga.nodes().deleted_ids(), gb.nodes().deleted_ids());
    assert_eq!(ga.edges().deleted_ids(), gb.edges().deleted_ids());
    assert_eq!(ga.schema().label_count(), gb.schema().label_count());
    assert_eq!(ga.schema().relation_count(), gb.schema().relation_count());

    let mut scan = ga.nodes().scan();
    while let Some(id) = scan.next(ga.nodes()) {
        assert_eq!(ga.get_node(id), gb.get_node(id), "node {id}");
    }
    let mut scan = ga.edges().scan();
    while let Some(id) = scan.next(ga.edges()) {
        assert_eq!(ga.get_edge(id), gb.get_edge(id), "edge {id}");
    }
}

#[test]
fn roundtrip_single_key() {
    let graph = sample_graph();
    let keys = encode_graph(&graph.read(), "snapshot-test", 1).unwrap();
    assert_eq!(keys.len(), 1);
    let restored = decode(&keys);
    assert_graphs_equal(&graph, &restored);
}

#[test]
fn roundtrip_streams_across_virtual_keys() {
    let graph = sample_graph();
    let keys = encode_graph(&graph.read(), "snapshot-test", 4).unwrap();
    assert_eq!(keys.len(), 4);
    let restored = decode(&keys);
    assert_graphs_equal(&graph, &restored);
}

/// Spec scenario: two parallel edges survive a snapshot cycle with their
/// ids and the multi-tagged matrix slot intact.
#[test]
fn multi_edge_slot_survives_roundtrip() {
    let graph = Graph::new("multi", SyncPolicy::FlushResize);
    let (rel, e1, e2, weight) = {
        let mut g = graph.write();
        let rel = g.add_relation("R");
        let weight = g.schema_mut().add_attr("w");
        let n1 = g.create_node(&[], AttrSet::new()).unwrap();
        let n2 = g.create_node(&[], AttrSet::new()).unwrap();
        assert_eq!((n1, n2), (0, 1));
        let mut attrs = AttrSet::new();
        attrs.set(weight, Value::Float(1.5));
        let e1 = g.create_edge(n1, n2, rel, attrs).unwrap();
        let mut attrs = AttrSet::new();
        attrs.set(weight, Value::Float(2.5));
        let e2 = g.create_edge(n1, n2, rel, attrs).unwrap();
        g.apply_all_pending(false);
        (rel, e1, e2, weight)
    };

    let keys = encode_graph(&graph.read(), "multi", 1).unwrap();
    let restored = decode(&keys);
    let g = restored.read();

    let store = g.relation(rel).unwrap();
    assert!(store.is_multi());
    let cell = store.matrix().get(0, 1).unwrap();
    assert!(matches!(EdgeSlot::decode(cell), EdgeSlot::Multi(_)));
    let mut ids = g.edges_between(0, 1, rel);
    ids.sort_unstable();
    assert_eq!(ids.as_slice(), &[e1, e2]);
    assert_eq!(
        g.get_edge(e1).unwrap().attrs.get(weight),
        Some(&Value::Float(1.5))
    );
    assert_eq!(
        g.get_edge(e2).unwrap().attrs.get(weight),
        Some(&Value::Float(2.5))
    );
}

/// A multi-edge cell larger than one key's entity budget resumes encoding
/// in the next virtual key.
#[test]
fn multi_edge_cell_splits_across_keys() {
    let graph = Graph::new("wide", SyncPolicy::FlushResize);
    {
        let mut g = graph.write();
        let rel = g.add_relation("R");
        let a = g.create_node(&[], AttrSet::new()).unwrap();
        let b = g.create_node(&[], AttrSet::new()).unwrap();
        for _ in 0..20 {
            g.create_edge(a, b, rel, AttrSet::new()).unwrap();
        }
        g.apply_all_pending(false);
    }
    let keys = encode_graph(&graph.read(), "wide", 6).unwrap();
    let restored = decode(&keys);
    assert_graphs_equal(&graph, &restored);
}

#[test]
fn snapshot_survives_disk_write() {
    let graph = sample_graph();
    let keys = encode_graph(&graph.read(), "snapshot-test", 2).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    for key in &keys {
        file.write_all(&(key.len() as u64).to_le_bytes()).unwrap();
        file.write_all(key).unwrap();
    }
    file.flush().unwrap();

    let mut bytes = Vec::new();
    std::fs::File::open(file.path())
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    let mut read_keys = Vec::new();
    let mut at = 0usize;
    while at < bytes.len() {
        let len = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap()) as usize;
        at += 8;
        read_keys.push(bytes[at..at + len].to_vec());
        at += len;
    }

    let restored = decode(&read_keys);
    assert_graphs_equal(&graph, &restored);
}

#[test]
fn decoder_rejects_unknown_version() {
    let graph = sample_graph();
    let mut keys = encode_graph(&graph.read(), "snapshot-test", 1).unwrap();
    // version is the first u64 of the key
    keys[0][0..8].copy_from_slice(&99u64.to_le_bytes());
    let mut decoder = GraphDecoder::new();
    assert!(matches!(
        decoder.feed(&keys[0]),
        Err(GraphError::Corruption(_))
    ));
}

#[test]
fn decoder_requires_all_keys() {
    let graph = sample_graph();
    let keys = encode_graph(&graph.read(), "snapshot-test", 3).unwrap();
    let mut decoder = GraphDecoder::new();
    decoder.feed(&keys[0]).unwrap();
    assert!(matches!(
        decoder.finish(),
        Err(GraphError::Corruption(_))
    ));
}

#[test]
fn restored_graph_reuses_deleted_ids() {
    let graph = sample_graph();
    let expected_free = graph.read().nodes().deleted_ids().to_vec();
    assert!(!expected_free.is_empty());
    let hole = expected_free[0];

    let keys = encode_graph(&graph.read(), "snapshot-test", 1).unwrap();
    let restored = decode(&keys);
    {
        let mut g = restored.write();
        let id = g.create_node(&[], AttrSet::new()).unwrap();
        assert_eq!(id, hole);
    }
}
