use super::message::NodeName;
use super::recent::{DEFAULT_RECENTLY_REQUESTED_CAPACITY, DEFAULT_RECENTLY_RETIRED_CAPACITY};

/// Settings for one node's [`Propagator`](super::Propagator).
#[derive(Debug, Clone)]
pub struct PropagatorConfig {
    /// This node's name; its own votes are recorded under it.
    pub node_name: NodeName,
    /// Replica instances a forwarded request is handed to. Each one frees
    /// the request once.
    pub num_replicas: usize,
    /// How many digests to remember as already re-requested.
    pub recently_requested_capacity: usize,
    /// How many retired request keys to remember, so that late votes for
    /// them are dropped.
    pub recently_retired_capacity: usize,
}

impl PropagatorConfig {
    /// One replica instance per tolerated fault plus the master, for a
    /// pool of `pool_size` nodes.
    pub fn new(node_name: impl Into<NodeName>, pool_size: usize) -> Self {
        Self {
            node_name: node_name.into(),
            num_replicas: super::quorum::max_faulty(pool_size) + 1,
            recently_requested_capacity: DEFAULT_RECENTLY_REQUESTED_CAPACITY,
            recently_retired_capacity: DEFAULT_RECENTLY_RETIRED_CAPACITY,
        }
    }

    pub fn with_num_replicas(mut self, num_replicas: usize) -> Self {
        self.num_replicas = num_replicas;
        self
    }

    pub fn with_recently_requested_capacity(mut self, capacity: usize) -> Self {
        self.recently_requested_capacity = capacity;
        self
    }

    pub fn with_recently_retired_capacity(mut self, capacity: usize) -> Self {
        self.recently_retired_capacity = capacity;
        self
    }
}
