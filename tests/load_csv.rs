use std::io::Write;

use deltagraph::exec::ops::{LoadCsv, Project, Projection};
use deltagraph::exec::{execute_plan, ExecutionPlan, Expr, Params};
use deltagraph::{Graph, GraphError, SyncPolicy, Value};

fn csv_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn empty_graph() -> Graph {
    Graph::new("g", SyncPolicy::FlushResize)
}

#[test]
fn rows_without_headers_are_arrays() {
    let file = csv_file("a,1\nb,2\nc,3\n");
    let graph = empty_graph();

    let mut plan = ExecutionPlan::new(1);
    let load = plan.add_op(Box::new(LoadCsv::new(
        None,
        Expr::lit(file.path().to_string_lossy().into_owned()),
        false,
        0,
    )));
    plan.set_root(load);
    plan.set_columns(vec![("row".into(), 0)]);

    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    assert_eq!(result.rows.len(), 3);
    assert_eq!(
        result.rows[0][0],
        Value::Array(vec![Value::String("a".into()), Value::String("1".into())])
    );
}

#[test]
fn rows_with_headers_are_maps() {
    let file = csv_file("name,age\nada,36\ngrace,85\n");
    let graph = empty_graph();

    let mut plan = ExecutionPlan::new(1);
    let load = plan.add_op(Box::new(LoadCsv::new(
        None,
        Expr::lit(file.path().to_string_lossy().into_owned()),
        true,
        0,
    )));
    plan.set_root(load);
    plan.set_columns(vec![("row".into(), 0)]);

    let result = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap();
    assert_eq!(result.rows.len(), 2);
    let row = &result.rows[0][0];
    assert_eq!(row.map_get("name"), Some(&Value::String("ada".into())));
    assert_eq!(row.map_get("age"), Some(&Value::String("36".into())));
}

#[test]
fn missing_file_raises_runtime_exception() {
    let graph = empty_graph();
    let mut plan = ExecutionPlan::new(1);
    let load = plan.add_op(Box::new(LoadCsv::new(
        None,
        Expr::lit("/definitely/not/a/file.csv"),
        false,
        0,
    )));
    plan.set_root(load);

    let err = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap_err();
    assert!(matches!(err, GraphError::InvalidCsvPath(_)));
}

#[test]
fn non_string_path_raises_runtime_exception() {
    let graph = empty_graph();
    let mut plan = ExecutionPlan::new(1);
    let load = plan.add_op(Box::new(LoadCsv::new(None, Expr::lit(42i64), false, 0)));
    plan.set_root(load);

    let err = execute_plan(&graph, &mut plan, Params::default(), None, 0).unwrap_err();
    assert!(matches!(err, GraphError::InvalidCsvPath(_)));
}

#[test]
fn path_from_parameter_is_resolved_per_execution() {
    let file = csv_file("x\n1\n2\n");
    let graph = empty_graph();

    let mut plan = ExecutionPlan::new(2);
    let load = plan.add_op(Box::new(LoadCsv::new(None, Expr::param("uri"), true, 0)));
    let project = plan.add_op(Box::new(Project::new(
        load,
        vec![Projection {
            expr: Expr::SlotRef(0),
            slot: 1,
            alias: "row".into(),
        }],
    )));
    plan.set_root(project);
    plan.set_columns(vec![("row".into(), 1)]);

    let mut params = Params::default();
    params.insert(
        "uri".into(),
        Value::String(file.path().to_string_lossy().into_owned()),
    );
    let result = execute_plan(&graph, &mut plan, params, None, 0).unwrap();
    assert_eq!(result.rows.len(), 2);
}
