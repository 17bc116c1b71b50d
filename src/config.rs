use crate::graph::SyncPolicy;

/// Engine configuration accepted at store construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default matrix synchronization policy for new graphs.
    pub sync_policy: SyncPolicy,
    /// Maximum number of entities indexed per populator batch.
    pub index_batch_size: usize,
    /// Number of input records a traversal buffers before computing its
    /// result matrix.
    pub traverse_record_cap: usize,
    /// Per-query wall-clock timeout in milliseconds. Zero disables.
    pub query_timeout_ms: u64,
    /// Maximum number of queries waiting for a thread.
    pub max_queued_queries: usize,
    /// Worker threads servicing queries.
    pub thread_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_policy: SyncPolicy::FlushResize,
            index_batch_size: 1000,
            traverse_record_cap: 16,
            query_timeout_ms: 0,
            max_queued_queries: 25,
            thread_count: 8,
        }
    }
}

impl Config {
    /// Configuration suited to bulk loading: implicit flushes suppressed,
    /// larger traversal batches.
    pub fn bulk_load() -> Self {
        Self {
            sync_policy: SyncPolicy::Resize,
            traverse_record_cap: 64,
            ..Self::default()
        }
    }
}
