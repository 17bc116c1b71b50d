use deltagraph::attrset::AttrSet;
use deltagraph::exec::ops::{
    Create, CreateEdgeSpec, CreateNodeSpec, EdgeEndpoint, Merge, NodeByLabelScan, Project,
    Projection, Results,
};
use deltagraph::exec::{ExecutionPlan, Expr, Params};
use deltagraph::{Config, GraphError, GraphStore, Value};

fn store_with_people(n: i64) -> GraphStore {
    let store = GraphStore::new(Config::default());
    let graph = store.get_or_create("social");
    {
        let mut g = graph.write();
        let person = g.add_label("Person");
        let age = g.schema_mut().add_attr("age");
        for i in 0..n {
            let mut attrs = AttrSet::new();
            attrs.set(age, Value::Int(20 + i));
            g.create_node(&[person], attrs).unwrap();
        }
        g.apply_all_pending(false);
    }
    store
}

fn people_plan(store: &GraphStore) -> ExecutionPlan {
    let age = store
        .get("social")
        .unwrap()
        .read()
        .schema()
        .attr_id("age")
        .unwrap();
    let mut plan = ExecutionPlan::new(2);
    let scan = plan.add_op(Box::new(NodeByLabelScan::new("Person", 0)));
    let project = plan.add_op(Box::new(Project::new(
        scan,
        vec![Projection {
            expr: Expr::Attr { slot: 0, attr: age },
            slot: 1,
            alias: "age".into(),
        }],
    )));
    let results = plan.add_op(Box::new(Results::new(project)));
    plan.set_root(results);
    plan.set_columns(vec![("age".into(), 1)]);
    plan
}

#[test]
fn query_returns_header_rows_and_stats() {
    let store = store_with_people(3);
    let mut plan = people_plan(&store);
    let result = store.query("social", &mut plan, Params::default()).unwrap();
    assert_eq!(result.columns, vec!["age".to_owned()]);
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.stats.rows, 3);
    assert_eq!(result.rows[0][0], Value::Int(20));
}

#[test]
fn ro_query_rejects_mutating_plans() {
    let store = store_with_people(1);
    let mut plan = ExecutionPlan::new(1);
    let create = plan.add_op(Box::new(Create::new(
        None,
        vec![CreateNodeSpec {
            labels: vec![],
            attrs: vec![],
        }],
        vec![],
    )));
    plan.set_root(create);

    let err = store
        .ro_query("social", &mut plan, Params::default())
        .unwrap_err();
    assert!(matches!(err, GraphError::Compile(_)));
}

#[test]
fn explain_renders_the_operator_tree() {
    let store = store_with_people(1);
    let plan = people_plan(&store);
    let text = store.explain(&plan);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Results");
    assert!(lines[1].trim_start().starts_with("Project"));
    assert!(lines[2].trim_start().starts_with("Node By Label Scan"));
}

#[test]
fn profile_reports_consume_counts() {
    let store = store_with_people(4);
    let mut plan = people_plan(&store);
    let (result, counts) = store
        .profile("social", &mut plan, Params::default())
        .unwrap();
    assert_eq!(result.rows.len(), 4);
    let results_count = counts
        .iter()
        .find(|(name, _)| name == "Results")
        .map(|(_, calls)| *calls)
        .unwrap();
    // one call per row plus the exhausting pull
    assert_eq!(results_count, 5);
}

#[test]
fn delete_graph_removes_the_key() {
    let store = store_with_people(1);
    store.delete_graph("social").unwrap();
    assert!(store.get("social").is_none());
    assert!(matches!(
        store.delete_graph("social"),
        Err(GraphError::NotFound("graph"))
    ));
}

#[test]
fn create_staged_edges_link_new_nodes() {
    let store = GraphStore::new(Config::default());
    let graph = store.get_or_create("g");
    let rel = {
        let mut g = graph.write();
        g.add_relation("PAIRED")
    };

    let mut plan = ExecutionPlan::new(1);
    // CREATE (a)-[:PAIRED]->(b): two nodes and one edge between them
    let create = plan.add_op(Box::new(Create::new(
        None,
        vec![
            CreateNodeSpec {
                labels: vec![],
                attrs: vec![],
            },
            CreateNodeSpec {
                labels: vec![],
                attrs: vec![],
            },
        ],
        vec![CreateEdgeSpec {
            src: EdgeEndpoint::Created(0),
            dest: EdgeEndpoint::Created(1),
            relation: rel,
            attrs: vec![],
        }],
    )));
    plan.set_root(create);

    let result = store.query("g", &mut plan, Params::default()).unwrap();
    assert_eq!(result.stats.nodes_created, 2);
    assert_eq!(result.stats.edges_created, 1);
    let g = graph.read();
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edges_between(0, 1, rel).len(), 1);
}

#[test]
fn merge_creates_only_on_empty_match() {
    let store = store_with_people(0);
    let graph = store.get("social").unwrap();
    let person = graph.read().schema().label_id("Person").unwrap();

    let mut plan = ExecutionPlan::new(1);
    let scan = plan.add_op(Box::new(NodeByLabelScan::new("Person", 0)));
    let merge = plan.add_op(Box::new(Merge::new(
        scan,
        vec![CreateNodeSpec {
            labels: vec![person],
            attrs: vec![],
        }],
        vec![],
    )));
    plan.set_root(merge);

    // no match: the blueprint is created
    let result = store.query("social", &mut plan, Params::default()).unwrap();
    assert_eq!(result.stats.nodes_created, 1);
    assert_eq!(graph.read().node_count(), 1);

    // match present: nothing new is created
    let mut plan = ExecutionPlan::new(1);
    let scan = plan.add_op(Box::new(NodeByLabelScan::new("Person", 0)));
    let merge = plan.add_op(Box::new(Merge::new(
        scan,
        vec![CreateNodeSpec {
            labels: vec![person],
            attrs: vec![],
        }],
        vec![],
    )));
    plan.set_root(merge);
    let result = store.query("social", &mut plan, Params::default()).unwrap();
    assert_eq!(result.stats.nodes_created, 0);
    assert_eq!(graph.read().node_count(), 1);
}

#[test]
fn timeout_zero_disables_the_deadline() {
    let store = store_with_people(2);
    assert_eq!(store.config().query_timeout_ms, 0);
    let mut plan = people_plan(&store);
    assert!(store.query("social", &mut plan, Params::default()).is_ok());
}
