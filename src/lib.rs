pub mod attrset;
pub mod config;
pub mod error;
pub mod exec;
pub mod graph;
pub mod index;
pub mod matrix;
pub mod ser;
pub mod storage;
pub mod store;
pub mod types;
pub mod value;

pub use crate::attrset::AttrSet;
pub use crate::config::Config;
pub use crate::error::{GraphError, Result};
pub use crate::exec::{execute_plan, ExecutionPlan, Params, QueryStats, ResultSet};
pub use crate::graph::{Edge, Graph, Node, SyncPolicy};
pub use crate::index::{Index, IndexKind, IndexState, IndexTarget};
pub use crate::store::GraphStore;
pub use crate::types::{AttrId, EdgeId, EntityId, LabelId, NodeId, RelationId};
pub use crate::value::Value;
