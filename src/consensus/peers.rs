use std::collections::{BTreeMap, BTreeSet};

use crate::common::crypto::Pubkey;
use super::message::NodeName;

/// The other pool members as the propagator sees them: who may vote, with
/// which key, and who is reachable right now.
pub trait PeerList: Send {
    /// Connected peers, excluding this node.
    fn connected(&self) -> Vec<NodeName>;

    /// Verification key of a pool member, `None` for outsiders.
    fn pubkey_of(&self, name: &NodeName) -> Option<&Pubkey>;

    /// Returns false for names outside the pool.
    fn mark_connected(&mut self, name: &NodeName) -> bool;

    fn mark_disconnected(&mut self, name: &NodeName);
}

/// Registry of the other nodes in the pool: their verification keys and
/// whether we currently hold a connection to them.
#[derive(Debug, Clone, Default)]
pub struct Peers {
    members: BTreeMap<NodeName, Pubkey>,
    connected: BTreeSet<NodeName>,
}

impl Peers {
    pub fn new(members: Vec<(NodeName, Pubkey)>) -> Self {
        Peers {
            members: members.into_iter().collect(),
            connected: BTreeSet::new(),
        }
    }

    /// All members marked connected.
    pub fn all_connected(members: Vec<(NodeName, Pubkey)>) -> Self {
        let mut peers = Peers::new(members);
        peers.connected = peers.members.keys().cloned().collect();
        peers
    }

    pub fn is_member(&self, name: &NodeName) -> bool {
        self.members.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl PeerList for Peers {
    fn connected(&self) -> Vec<NodeName> {
        self.connected.iter().cloned().collect()
    }

    fn pubkey_of(&self, name: &NodeName) -> Option<&Pubkey> {
        self.members.get(name)
    }

    fn mark_connected(&mut self, name: &NodeName) -> bool {
        if !self.is_member(name) {
            return false;
        }
        self.connected.insert(name.clone());
        true
    }

    fn mark_disconnected(&mut self, name: &NodeName) {
        self.connected.remove(name);
    }
}
