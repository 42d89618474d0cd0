use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::common::crypto::{short_digest, Digest, Keypair};
use crate::network::{Recipients, Transport};
use super::config::PropagatorConfig;
use super::message::{Message, NodeName, Propagate, PropagateRequest, Request, RequestKey};
use super::peers::PeerList;
use super::quorum::QuorumOracle;
use super::recent::{RecentlyRequested, RecentlyRetired};
use super::replica::{hand_to_replicas, Monitor, ReplicaBus};
use super::store::RequestStore;

/*
    A request is only handed to the replicas once f + 1 nodes, this one
    included, have sent PROPAGATE votes carrying the same digest. Every node
    that sees a request, from the client or from a peer's vote, votes for it
    once. Forwarding is retried whenever a new vote arrives; nothing here is
    timed.
*/

/// Why a request was not forwarded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ForwardBlock {
    AlreadyForwarded,
    NotFinalised,
}

impl fmt::Display for ForwardBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardBlock::AlreadyForwarded => f.write_str("already forwarded"),
            ForwardBlock::NotFinalised => f.write_str("not finalised"),
        }
    }
}

pub struct Propagator {
    config: PropagatorConfig,
    keypair: Keypair,
    store: RequestStore,
    recently_requested: RecentlyRequested,
    recently_retired: RecentlyRetired,
    quorum: Box<dyn QuorumOracle>,
    peers: Box<dyn PeerList>,
    transport: Box<dyn Transport>,
    replica_bus: Box<dyn ReplicaBus>,
    monitor: Box<dyn Monitor>,
}

impl Propagator {
    pub fn new(
        config: PropagatorConfig,
        keypair: Keypair,
        peers: Box<dyn PeerList>,
        quorum: Box<dyn QuorumOracle>,
        transport: Box<dyn Transport>,
        replica_bus: Box<dyn ReplicaBus>,
        monitor: Box<dyn Monitor>,
    ) -> Self {
        let recently_requested = RecentlyRequested::new(config.recently_requested_capacity);
        let recently_retired = RecentlyRetired::new(config.recently_retired_capacity);
        Propagator {
            config,
            keypair,
            store: RequestStore::new(),
            recently_requested,
            recently_retired,
            quorum,
            peers,
            transport,
            replica_bus,
            monitor,
        }
    }

    pub fn name(&self) -> &NodeName {
        &self.config.node_name
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    pub fn peers(&self) -> &dyn PeerList {
        self.peers.as_ref()
    }

    pub fn peers_mut(&mut self) -> &mut dyn PeerList {
        self.peers.as_mut()
    }

    /// True if `key` was retired or force-freed recently.
    pub fn is_retired(&self, key: &RequestKey) -> bool {
        self.recently_retired.contains(key)
    }

    /// Replaces the PROPAGATE quorum, e.g. after the pool changed size.
    pub fn set_quorum(&mut self, quorum: Box<dyn QuorumOracle>) {
        self.quorum = quorum;
    }

    pub fn create_propagate(&self, req: &Request, client_name: &str) -> Propagate {
        Propagate::new(req.to_body(), client_name, &self.keypair)
    }

    /// Votes for `req` and broadcasts the vote, unless this node already
    /// voted for the key.
    #[instrument(skip(self, req, client_name), fields(node = %self.config.node_name, key = %req.key()))]
    pub fn propagate(&mut self, req: &Request, client_name: &str) {
        let me = self.config.node_name.clone();
        if self.store.has_propagated(req.key(), &me) {
            debug!("Already propagated");
            return;
        }

        self.store.add_propagate(req, &me);
        self.store.note_sender_client(req.key(), client_name);

        let propagate = self.create_propagate(req, client_name);
        debug!(digest = %short_digest(&req.digest()), "Broadcasting PROPAGATE");
        if let Err(e) = self.transport.send(Message::Propagate(propagate), Recipients::All) {
            warn!(error = %e, "Could not broadcast PROPAGATE");
        }
    }

    /// `None` means the request may be forwarded now. On that path the
    /// agreed copy has just been recorded as finalised.
    pub fn can_forward(&mut self, req: &Request) -> Option<ForwardBlock> {
        let key = req.key();
        if self.store.is_forwarded(key) {
            return Some(ForwardBlock::AlreadyForwarded);
        }

        if !self.quorum.is_reached(self.store.votes(key)) {
            return Some(ForwardBlock::NotFinalised);
        }

        match self.store.req_with_acceptable_quorum(key, self.quorum.as_ref()) {
            Some(agreed) => {
                self.store.set_finalised(&agreed);
                None
            }
            None => Some(ForwardBlock::NotFinalised),
        }
    }

    /// Hands the request to the replicas. Callers check [`Self::can_forward`]
    /// first.
    pub fn forward(&mut self, req: &Request) {
        let key = req.key();
        info!(
            node = %self.config.node_name,
            key = %key,
            replicas = self.config.num_replicas,
            "Forwarding request to replicas"
        );
        hand_to_replicas(self.replica_bus.as_ref(), key.clone());
        self.monitor.request_unordered(key);
        self.store.mark_as_forwarded(key, self.config.num_replicas);
    }

    /// Entry point for a request received directly from a client.
    pub fn record_and_propagate(&mut self, req: &Request, client_name: &str) {
        if self.is_retired(req.key()) {
            debug!(node = %self.config.node_name, key = %req.key(), "Ignoring request that was already retired");
            return;
        }
        self.store.add(req);
        self.propagate(req, client_name);
        self.try_forwarding(req);
    }

    /// Forwards the request if it is ready. Returns true if it was
    /// forwarded by this call.
    pub fn try_forwarding(&mut self, req: &Request) -> bool {
        match self.can_forward(req) {
            None => {
                self.forward(req);
                true
            }
            Some(reason) => {
                debug!(
                    node = %self.config.node_name,
                    key = %req.key(),
                    votes = self.store.votes(req.key()),
                    "Not forwarding request: {}",
                    reason
                );
                false
            }
        }
    }

    /// Handles a PROPAGATE from `from`. Votes that are not signed by the
    /// named pool member, or whose request is malformed, are dropped.
    #[instrument(skip(self, propagate, from), fields(node = %self.config.node_name, from = %from))]
    pub fn process_propagate(&mut self, propagate: Propagate, from: &NodeName) {
        let signed = self
            .peers
            .pubkey_of(from)
            .map(|pubkey| propagate.is_signed_by(pubkey))
            .unwrap_or(false);
        if !signed {
            warn!("Dropping PROPAGATE with bad signature or unknown sender");
            return;
        }

        let req = match Request::try_from(propagate.request) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "Dropping PROPAGATE with malformed request");
                return;
            }
        };

        if self.is_retired(req.key()) {
            debug!(key = %req.key(), "Dropping PROPAGATE for retired request");
            return;
        }

        self.store.add_propagate(&req, from);
        self.propagate(&req, &propagate.sender_client);
        self.try_forwarding(&req);
    }

    /// Replies to a peer asking for our PROPAGATE of `request.digest`.
    /// Returns true if a reply was sent.
    pub fn answer_propagate_request(&self, request: &PropagateRequest, from: &NodeName) -> bool {
        let me = &self.config.node_name;
        let own_vote = self
            .store
            .key_for_digest(&request.digest)
            .and_then(|key| self.store.get(key))
            .and_then(|state| {
                state
                    .propagates()
                    .get(me)
                    .filter(|vote| vote.digest() == request.digest)
                    .map(|vote| (vote, state.sender_client().unwrap_or_default()))
            });

        let Some((vote, client)) = own_vote else {
            debug!(
                node = %me,
                from = %from,
                digest = %short_digest(&request.digest),
                "No PROPAGATE to share"
            );
            return false;
        };

        let reply = self.create_propagate(vote, client);
        match self
            .transport
            .send(Message::Propagate(reply), Recipients::Only(vec![from.clone()]))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(node = %me, error = %e, "Could not answer PROPAGATE request");
                false
            }
        }
    }

    /// Asks peers for PROPAGATEs we are missing. Digests asked about
    /// recently are skipped. Returns how many requests went out.
    pub fn request_propagates(&mut self, missing: &[Digest]) -> usize {
        let mut issued = 0;
        for digest in missing {
            if self.recently_requested.contains(digest) {
                debug!(digest = %short_digest(digest), "PROPAGATE already requested recently");
                continue;
            }

            let connected = self.peers.connected();
            let to: Vec<NodeName> = match self.store.key_for_digest(digest) {
                None => connected,
                Some(key) => connected
                    .into_iter()
                    .filter(|peer| !self.store.has_propagated(key, peer))
                    .collect(),
            };
            let to = (!to.is_empty()).then_some(Recipients::Only(to));
            self.recently_requested.insert(*digest);

            let Some(to) = to else {
                continue;
            };
            debug!(digest = %short_digest(digest), to = ?to, "Requesting PROPAGATE");
            match self.transport.request_msg(PropagateRequest { digest: *digest }, to) {
                Ok(()) => issued += 1,
                Err(e) => warn!(error = %e, "Could not request PROPAGATE"),
            }
        }
        issued
    }

    pub fn ordered_by_replica(&mut self, key: &RequestKey) {
        self.store.ordered_by_replica(key);
    }

    pub fn mark_as_executed(&mut self, key: &RequestKey) {
        if self.store.mark_as_executed(key) {
            debug!(node = %self.config.node_name, key = %key, "Request retired");
            self.recently_retired.insert(key.clone());
        }
    }

    pub fn free(&mut self, key: &RequestKey) {
        if self.store.free(key) {
            debug!(node = %self.config.node_name, key = %key, "Request retired");
            self.recently_retired.insert(key.clone());
        }
    }

    pub fn force_free(&mut self, key: &RequestKey) {
        if self.store.force_free(key) {
            info!(node = %self.config.node_name, key = %key, "Request force-freed");
            self.recently_retired.insert(key.clone());
        }
    }
}
