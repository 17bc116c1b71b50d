//! Entity storage: block-allocated pools for nodes and edges.

mod pool;

pub use pool::{EntityPool, PoolScan};
