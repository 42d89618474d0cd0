pub mod node;

pub use node::*;

use tokio::sync::mpsc::UnboundedSender;

use crate::common::TransportError;
use crate::consensus::message::{Message, NodeName, PropagateRequest};

/*
    Network communication is point-to-point, authenticated and reliable: one
    correct node receives a message from another correct node if and only if
    the latter sent it. A "broadcast" is the same point-to-point message sent
    to every connected peer. Sends are fire-and-forget; the propagation layer
    never waits on the network.
*/

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Recipients {
    /// Every connected peer.
    All,
    Only(Vec<NodeName>),
}

/// A message leaving this node.
#[derive(Clone, Debug)]
pub struct Outbound {
    pub from: NodeName,
    pub to: Recipients,
    pub message: Message,
}

pub trait Transport: Send {
    fn send(&self, message: Message, to: Recipients) -> Result<(), TransportError>;

    /// Asks peers to send us a message we are missing.
    fn request_msg(&self, request: PropagateRequest, to: Recipients) -> Result<(), TransportError> {
        self.send(Message::PropagateRequest(request), to)
    }
}

/// Transport that queues outbound messages on a channel for a router task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    from: NodeName,
    outbound: UnboundedSender<Outbound>,
}

impl ChannelTransport {
    pub fn new(from: NodeName, outbound: UnboundedSender<Outbound>) -> Self {
        ChannelTransport { from, outbound }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: Message, to: Recipients) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound {
                from: self.from.clone(),
                to,
                message,
            })
            .map_err(|_| TransportError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_transport() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = ChannelTransport::new(NodeName::new("Alpha"), tx);

        transport
            .request_msg(PropagateRequest { digest: [1; 64] }, Recipients::All)
            .unwrap();
        let out = rx.try_recv().unwrap();
        assert_eq!(out.from, NodeName::new("Alpha"));
        assert_eq!(out.to, Recipients::All);
        assert!(matches!(out.message, Message::PropagateRequest(r) if r.digest == [1; 64]));

        drop(rx);
        assert!(transport.send(Message::PropagateRequest(PropagateRequest { digest: [2; 64] }), Recipients::All).is_err());
    }
}
