//! Named-graph registry and the command surface the host server binds to.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::exec::{execute_plan, ExecutionPlan, Params, ResultSet};
use crate::graph::Graph;
use crate::index::{spawn_populate, Index, IndexKind, IndexState, IndexTarget};

/// Registry of named graphs plus the query entry points: the boundary the
/// host key-value server calls into.
pub struct GraphStore {
    config: Config,
    graphs: RwLock<FxHashMap<String, Arc<Graph>>>,
}

impl GraphStore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            graphs: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get(&self, name: &str) -> Option<Arc<Graph>> {
        self.graphs.read().get(name).cloned()
    }

    pub fn get_or_create(&self, name: &str) -> Arc<Graph> {
        if let Some(graph) = self.get(name) {
            return graph;
        }
        let mut graphs = self.graphs.write();
        graphs
            .entry(name.to_owned())
            .or_insert_with(|| {
                info!(graph = name, "graph created");
                Arc::new(Graph::new(name, self.config.sync_policy))
            })
            .clone()
    }

    /// Installs an already-built graph (snapshot restore).
    pub fn insert(&self, graph: Graph) -> Arc<Graph> {
        let graph = Arc::new(graph);
        self.graphs
            .write()
            .insert(graph.name().to_owned(), Arc::clone(&graph));
        graph
    }

    pub fn delete_graph(&self, name: &str) -> Result<()> {
        self.graphs
            .write()
            .remove(name)
            .map(|_| info!(graph = name, "graph deleted"))
            .ok_or(GraphError::NotFound("graph"))
    }

    /// Executes a read-write plan against a named graph.
    pub fn query(
        &self,
        name: &str,
        plan: &mut ExecutionPlan,
        params: Params,
    ) -> Result<ResultSet> {
        let graph = self.get_or_create(name);
        execute_plan(&graph, plan, params, None, self.config.query_timeout_ms)
    }

    /// Executes a plan rejected up-front if it stages mutations.
    pub fn ro_query(
        &self,
        name: &str,
        plan: &mut ExecutionPlan,
        params: Params,
    ) -> Result<ResultSet> {
        if plan.has_mutations() {
            return Err(GraphError::Compile(
                "read-only query contains mutating operators".into(),
            ));
        }
        let graph = self.get(name).ok_or(GraphError::NotFound("graph"))?;
        execute_plan(&graph, plan, params, None, self.config.query_timeout_ms)
    }

    /// Operator tree without executing it.
    pub fn explain(&self, plan: &ExecutionPlan) -> String {
        plan.describe()
    }

    /// Executes and returns per-operator consume counts alongside results.
    pub fn profile(
        &self,
        name: &str,
        plan: &mut ExecutionPlan,
        params: Params,
    ) -> Result<(ResultSet, Vec<(String, u64)>)> {
        let result = self.query(name, plan, params)?;
        let counts = plan.profile();
        Ok((result, counts))
    }

    /// Registers a node index over `label`, covering `attrs`, and starts
    /// its background population.
    pub fn create_node_index(
        &self,
        graph_name: &str,
        label: &str,
        attrs: &[&str],
        kind: IndexKind,
    ) -> Result<(Arc<Index>, JoinHandle<()>)> {
        self.create_index(graph_name, IndexTarget::Node, label, attrs, kind)
    }

    /// Registers an edge index over `relation`, covering `attrs`, and
    /// starts its background population.
    pub fn create_edge_index(
        &self,
        graph_name: &str,
        relation: &str,
        attrs: &[&str],
        kind: IndexKind,
    ) -> Result<(Arc<Index>, JoinHandle<()>)> {
        self.create_index(graph_name, IndexTarget::Edge, relation, attrs, kind)
    }

    fn create_index(
        &self,
        graph_name: &str,
        target: IndexTarget,
        label: &str,
        attrs: &[&str],
        kind: IndexKind,
    ) -> Result<(Arc<Index>, JoinHandle<()>)> {
        let graph = self.get_or_create(graph_name);
        let index = {
            let mut g = graph.write();
            let label_id = match target {
                IndexTarget::Node => g.add_label(label),
                IndexTarget::Edge => g.add_relation(label),
            };
            if g.find_index(target, label_id).is_some() {
                return Err(GraphError::InvalidArgument(format!(
                    "index over {label} already exists"
                )));
            }
            let attr_ids = attrs
                .iter()
                .map(|attr| g.schema_mut().add_attr(attr))
                .collect();
            let index = Arc::new(Index::new(target, label_id, attr_ids, kind));
            index.set_state(IndexState::Populating);
            g.register_index(Arc::clone(&index));
            index
        };
        info!(graph = graph_name, label, "index population started");
        let handle = spawn_populate(
            Arc::clone(&index),
            Arc::clone(&graph),
            self.config.index_batch_size,
        );
        Ok((index, handle))
    }

    pub fn drop_index(&self, graph_name: &str, target: IndexTarget, label: &str) -> Result<()> {
        let graph = self.get(graph_name).ok_or(GraphError::NotFound("graph"))?;
        let mut g = graph.write();
        let label_id = match target {
            IndexTarget::Node => g.schema().label_id(label),
            IndexTarget::Edge => g.schema().relation_id(label),
        }
        .ok_or(GraphError::NotFound("index"))?;
        g.drop_index(target, label_id)
    }

    /// Indices registered on a graph, for the lifecycle listing command.
    pub fn list_indices(&self, graph_name: &str) -> Result<Vec<Arc<Index>>> {
        let graph = self.get(graph_name).ok_or(GraphError::NotFound("graph"))?;
        let g = graph.read();
        Ok(g.indices().to_vec())
    }
}
