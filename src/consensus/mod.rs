pub mod config;
pub mod message;
pub mod peers;
pub mod propagator;
pub mod quorum;
pub mod recent;
pub mod replica;
pub mod state;
pub mod store;

pub use config::*;
pub use message::*;
pub use peers::*;
pub use propagator::*;
pub use quorum::*;
pub use recent::*;
pub use replica::*;
pub use state::*;
pub use store::*;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tokio::sync::mpsc::{self, Sender, UnboundedReceiver};

    use crate::common::crypto::Keypair;
    use crate::network::{ChannelTransport, Node, NodeEvent, Outbound, Recipients};
    use super::*;

    const NAMES: [&str; 4] = ["Alpha", "Beta", "Gamma", "Delta"];

    struct Cluster {
        senders: BTreeMap<NodeName, Sender<NodeEvent>>,
        handles: Vec<tokio::task::JoinHandle<Propagator>>,
        outbound: UnboundedReceiver<Outbound>,
        replicas: Vec<UnboundedReceiver<RequestKey>>,
    }

    fn spawn_cluster() -> Cluster {
        let keys: Vec<(NodeName, Keypair)> = NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| (NodeName::new(*name), Keypair::from_seed([i as u8 + 10; 32])))
            .collect();
        let (out_tx, outbound) = mpsc::unbounded_channel();

        let mut senders = BTreeMap::new();
        let mut handles = Vec::new();
        let mut replicas = Vec::new();
        for (name, keypair) in &keys {
            let peers = Peers::all_connected(
                keys.iter()
                    .filter(|(other, _)| other != name)
                    .map(|(other, kp)| (other.clone(), kp.pubkey()))
                    .collect(),
            );
            let (bus_tx, bus_rx) = mpsc::unbounded_channel();
            let propagator = Propagator::new(
                PropagatorConfig::new(name.clone(), NAMES.len()),
                keypair.clone(),
                Box::new(peers),
                Box::new(Quorums::new(NAMES.len()).propagate),
                Box::new(ChannelTransport::new(name.clone(), out_tx.clone())),
                Box::new(bus_tx),
                Box::new(TracingMonitor),
            );
            let (event_tx, event_rx) = mpsc::channel(100);
            handles.push(tokio::spawn(Node::new(propagator, event_rx).run()));
            senders.insert(name.clone(), event_tx);
            replicas.push(bus_rx);
        }

        Cluster { senders, handles, outbound, replicas }
    }

    impl Cluster {
        /// Delivers one outbound message to its recipients.
        async fn route_one(&mut self) {
            let out = self.outbound.recv().await.unwrap();
            let to: Vec<NodeName> = match out.to {
                Recipients::All => self.senders.keys().filter(|n| **n != out.from).cloned().collect(),
                Recipients::Only(names) => names,
            };
            for name in to {
                self.senders[&name]
                    .send(NodeEvent::Inbound { from: out.from.clone(), message: out.message.clone() })
                    .await
                    .unwrap();
            }
        }

        async fn shutdown(self) -> Vec<Propagator> {
            for sender in self.senders.values() {
                sender.send(NodeEvent::Shutdown).await.unwrap();
            }
            let mut propagators = Vec::new();
            for handle in self.handles {
                propagators.push(handle.await.unwrap());
            }
            propagators
        }
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let mut cluster = spawn_cluster();
        let request = Request::new("client1", 1, b"transfer 10".to_vec()).unwrap();
        let key = request.key().clone();

        // Arrange: the client only reached Alpha
        cluster.senders[&NodeName::new("Alpha")]
            .send(NodeEvent::ClientRequest { request: request.clone(), client: "client1".into() })
            .await
            .unwrap();

        // Act: Alpha's PROPAGATE reaches the others, each of them votes and
        // forwards as soon as it holds two matching votes
        cluster.route_one().await;
        for replicas in cluster.replicas.iter_mut().skip(1) {
            assert_eq!(replicas.recv().await.unwrap(), key);
        }

        // Act: their PROPAGATEs bring Alpha to quorum too
        for _ in 0..3 {
            cluster.route_one().await;
        }
        assert_eq!(cluster.replicas[0].recv().await.unwrap(), key);

        // Act: executor and both replica instances finish on every node
        for sender in cluster.senders.values() {
            sender.send(NodeEvent::Ordered(key.clone())).await.unwrap();
            sender.send(NodeEvent::Freed(key.clone())).await.unwrap();
            sender.send(NodeEvent::Executed(key.clone())).await.unwrap();
            sender.send(NodeEvent::Freed(key.clone())).await.unwrap();
        }

        // Assert: all bookkeeping is gone
        for propagator in cluster.shutdown().await {
            assert!(propagator.store().is_empty(), "{} kept state", propagator.name());
            assert_eq!(propagator.store().finalised_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_missing_propagate_is_fetched() {
        let mut cluster = spawn_cluster();
        let request = Request::new("client2", 5, b"mint".to_vec()).unwrap();
        let alpha = NodeName::new("Alpha");
        let beta = NodeName::new("Beta");

        cluster.senders[&beta]
            .send(NodeEvent::ClientRequest { request: request.clone(), client: "client2".into() })
            .await
            .unwrap();
        // Beta's broadcast is lost
        let _ = cluster.outbound.recv().await.unwrap();

        cluster.senders[&alpha]
            .send(NodeEvent::MissingPropagates(vec![request.digest()]))
            .await
            .unwrap();
        // Alpha asks every connected peer; only Beta has something to share
        cluster.route_one().await;
        // Beta's answer gives Alpha its first vote; Alpha votes too
        cluster.route_one().await;
        // Alpha's own PROPAGATE goes out to the pool
        cluster.route_one().await;

        let propagators = cluster.shutdown().await;
        let alpha = &propagators[0];
        assert_eq!(alpha.store().votes(request.key()), 2);
        assert!(alpha.store().has_propagated(request.key(), &beta));
        assert!(alpha.store().is_finalised(request.key()));
    }
}
