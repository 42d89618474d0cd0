use tokio::sync::mpsc::Receiver;
use tracing::{debug, info};

use crate::common::crypto::Digest;
use crate::consensus::message::{Message, NodeName, Request, RequestKey};
use crate::consensus::propagator::Propagator;

/// Everything that can change a node's propagation state. The node applies
/// events one at a time, in the order they were queued.
#[derive(Debug)]
pub enum NodeEvent {
    /// A validated request straight from a client.
    ClientRequest { request: Request, client: String },
    Inbound { from: NodeName, message: Message },
    /// A replica instance ordered the request.
    Ordered(RequestKey),
    /// A replica instance is done with the request.
    Freed(RequestKey),
    Executed(RequestKey),
    ForceFree(RequestKey),
    /// Ask peers for PROPAGATEs of these digests.
    MissingPropagates(Vec<Digest>),
    PeerConnected(NodeName),
    PeerDisconnected(NodeName),
    Shutdown,
}

/// Owns a [`Propagator`] and feeds it from a single mailbox, so no two
/// events ever touch the request store at the same time.
pub struct Node {
    propagator: Propagator,
    events: Receiver<NodeEvent>,
}

impl Node {
    pub fn new(propagator: Propagator, events: Receiver<NodeEvent>) -> Self {
        Node { propagator, events }
    }

    pub fn name(&self) -> &NodeName {
        self.propagator.name()
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    /// Processes events until [`NodeEvent::Shutdown`] or until every sender
    /// is gone, then hands the propagator back.
    pub async fn run(mut self) -> Propagator {
        info!(node = %self.name(), "Running propagation node");
        while let Some(event) = self.events.recv().await {
            if matches!(event, NodeEvent::Shutdown) {
                break;
            }
            self.handle(event);
        }
        info!(
            node = %self.name(),
            tracked = self.propagator.store().len(),
            finalised = self.propagator.store().finalised_count(),
            "Propagation node stopped"
        );
        self.propagator
    }

    pub fn handle(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::ClientRequest { request, client } => {
                self.propagator.record_and_propagate(&request, &client);
            }
            NodeEvent::Inbound { from, message } => match message {
                Message::Propagate(propagate) => {
                    self.propagator.process_propagate(propagate, &from);
                }
                Message::PropagateRequest(request) => {
                    self.propagator.answer_propagate_request(&request, &from);
                }
            },
            NodeEvent::Ordered(key) => self.propagator.ordered_by_replica(&key),
            NodeEvent::Freed(key) => self.propagator.free(&key),
            NodeEvent::Executed(key) => self.propagator.mark_as_executed(&key),
            NodeEvent::ForceFree(key) => self.propagator.force_free(&key),
            NodeEvent::MissingPropagates(digests) => {
                let issued = self.propagator.request_propagates(&digests);
                debug!(node = %self.name(), asked = digests.len(), issued, "Requested missing PROPAGATEs");
            }
            NodeEvent::PeerConnected(peer) => {
                if !self.propagator.peers_mut().mark_connected(&peer) {
                    debug!(node = %self.name(), peer = %peer, "Ignoring connection from unknown peer");
                }
            }
            NodeEvent::PeerDisconnected(peer) => self.propagator.peers_mut().mark_disconnected(&peer),
            NodeEvent::Shutdown => {}
        }
    }
}
