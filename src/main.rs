//! Runs a four-node pool over in-process channels and pushes a few client
//! requests through PROPAGATE, forwarding and retirement.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc::{self, Sender, UnboundedReceiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bft_propagator::common::crypto::Keypair;
use bft_propagator::consensus::{
    NodeName, Peers, Propagator, PropagatorConfig, Quorums, Request, RequestKey, TracingMonitor,
};
use bft_propagator::network::{ChannelTransport, Node, NodeEvent, Outbound, Recipients};

const POOL: [&str; 4] = ["Alpha", "Beta", "Gamma", "Delta"];

/// Delivers outbound messages to the mailboxes of their recipients.
async fn route(mut outbound: UnboundedReceiver<Outbound>, mailboxes: BTreeMap<NodeName, Sender<NodeEvent>>) {
    while let Some(out) = outbound.recv().await {
        let to: Vec<NodeName> = match out.to {
            Recipients::All => mailboxes.keys().filter(|n| **n != out.from).cloned().collect(),
            Recipients::Only(names) => names,
        };
        for name in to {
            let Some(mailbox) = mailboxes.get(&name) else {
                warn!(to = %name, "No route to node");
                continue;
            };
            let event = NodeEvent::Inbound {
                from: out.from.clone(),
                message: out.message.clone(),
            };
            if mailbox.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Stands in for the ordering replicas and the executor of one node: every
/// forwarded request is ordered and freed by each replica instance, then
/// executed.
async fn replicas(
    mut forwarded: UnboundedReceiver<RequestKey>,
    mailbox: Sender<NodeEvent>,
    instances: usize,
) {
    while let Some(key) = forwarded.recv().await {
        let mut events = Vec::with_capacity(2 * instances + 1);
        for _ in 0..instances {
            events.push(NodeEvent::Ordered(key.clone()));
            events.push(NodeEvent::Freed(key.clone()));
        }
        events.push(NodeEvent::Executed(key));
        for event in events {
            if mailbox.send(event).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let keys: Vec<(NodeName, Keypair)> = POOL
        .iter()
        .enumerate()
        .map(|(i, name)| (NodeName::new(*name), Keypair::from_seed([i as u8 + 1; 32])))
        .collect();
    let quorums = Quorums::new(POOL.len());
    info!(n = quorums.n, f = quorums.f, quorum = quorums.propagate.value, "Starting pool");

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let mut mailboxes = BTreeMap::new();
    let mut nodes = Vec::new();
    for (name, keypair) in &keys {
        let peers = Peers::all_connected(
            keys.iter()
                .filter(|(other, _)| other != name)
                .map(|(other, kp)| (other.clone(), kp.pubkey()))
                .collect(),
        );
        let config = PropagatorConfig::new(name.clone(), POOL.len());
        let instances = config.num_replicas;
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        let propagator = Propagator::new(
            config,
            keypair.clone(),
            Box::new(peers),
            Box::new(quorums.propagate),
            Box::new(ChannelTransport::new(name.clone(), out_tx.clone())),
            Box::new(bus_tx),
            Box::new(TracingMonitor),
        );

        let (event_tx, event_rx) = mpsc::channel(100);
        tokio::spawn(replicas(bus_rx, event_tx.clone(), instances));
        nodes.push(tokio::spawn(Node::new(propagator, event_rx).run()));
        mailboxes.insert(name.clone(), event_tx);
    }
    tokio::spawn(route(out_rx, mailboxes.clone()));

    // One request reaches a single node, one reaches the whole pool.
    let requests = [
        (Request::new("client1", 1, b"transfer 10 to bob".to_vec()), vec!["Alpha"]),
        (Request::new("client2", 1, b"mint 5".to_vec()), POOL.to_vec()),
    ];
    for (request, receivers) in requests {
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Client request rejected");
                continue;
            }
        };
        for receiver in receivers {
            let event = NodeEvent::ClientRequest {
                request: request.clone(),
                client: request.key().identifier.clone(),
            };
            if mailboxes[&NodeName::new(receiver)].send(event).await.is_err() {
                warn!(node = receiver, "Node mailbox closed");
            }
        }
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    for mailbox in mailboxes.values() {
        let _ = mailbox.send(NodeEvent::Shutdown).await;
    }
    for node in nodes {
        match node.await {
            Ok(propagator) => info!(
                node = %propagator.name(),
                tracked = propagator.store().len(),
                finalised = propagator.store().finalised_count(),
                "Node finished"
            ),
            Err(e) => warn!(error = %e, "Node task failed"),
        }
    }
}
