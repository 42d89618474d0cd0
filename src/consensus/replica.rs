use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::common::TransportError;
use super::message::RequestKey;

/// Hands finalised requests to the ordering replicas.
pub trait ReplicaBus: Send {
    fn send_to_internal_bus(&self, key: RequestKey) -> Result<(), TransportError>;
}

impl ReplicaBus for UnboundedSender<RequestKey> {
    fn send_to_internal_bus(&self, key: RequestKey) -> Result<(), TransportError> {
        self.send(key).map_err(|_| TransportError::ReplicaBusClosed)
    }
}

/// Observability hook for requests that are waiting to be ordered.
pub trait Monitor: Send {
    fn request_unordered(&self, key: &RequestKey);
}

/// Monitor that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn request_unordered(&self, key: &RequestKey) {
        debug!(key = %key, "Request awaiting ordering");
    }
}

pub(crate) fn hand_to_replicas(bus: &dyn ReplicaBus, key: RequestKey) {
    let shown = key.to_string();
    if let Err(e) = bus.send_to_internal_bus(key) {
        warn!(key = %shown, error = %e, "Could not hand request to replicas");
    }
}
