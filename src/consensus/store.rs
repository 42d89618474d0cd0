use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::common::crypto::{short_digest, Digest};
use super::message::{NodeName, Request, RequestKey};
use super::quorum::QuorumOracle;
use super::state::{Phase, RequestState};

/// Every request this node is tracking, keyed by [`RequestKey`].
///
/// All mutation goes through the store so that `finalised_count` and the
/// digest index always agree with the entries. Lookups for keys that are
/// not present return empty values: a vote routinely arrives before the
/// request it votes for.
#[derive(Debug, Default)]
pub struct RequestStore {
    requests: HashMap<RequestKey, RequestState>,
    by_digest: HashMap<Digest, RequestKey>,
    finalised_count: usize,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn finalised_count(&self) -> usize {
        self.finalised_count
    }

    pub fn get(&self, key: &RequestKey) -> Option<&RequestState> {
        self.requests.get(key)
    }

    /// Key of a request known under `digest`, either as the first copy we
    /// saw or as some peer's vote.
    pub fn key_for_digest(&self, digest: &Digest) -> Option<&RequestKey> {
        self.by_digest.get(digest)
    }

    /// Starts tracking `req`, or returns the existing state for its key.
    pub fn add(&mut self, req: &Request) -> &RequestState {
        self.entry(req)
    }

    fn entry(&mut self, req: &Request) -> &mut RequestState {
        let key = req.key().clone();
        let by_digest = &mut self.by_digest;
        self.requests.entry(key.clone()).or_insert_with(|| {
            by_digest.insert(req.digest(), key);
            RequestState::new(req.clone())
        })
    }

    /// Records `sender`'s vote for `req`. A later vote from the same sender
    /// replaces the earlier one, even when the digests differ.
    pub fn add_propagate(&mut self, req: &Request, sender: &NodeName) {
        let digest = req.digest();
        self.by_digest
            .entry(digest)
            .or_insert_with(|| req.key().clone());

        let state = self.entry(req);
        let Some(previous) = state.propagates.insert(sender.clone(), req.clone()) else {
            return;
        };
        let old = previous.digest();
        if old == digest {
            return;
        }

        // Same sender, different content: last write wins.
        debug!(
            key = %req.key(),
            sender = %sender,
            old_digest = %short_digest(&old),
            new_digest = %short_digest(&digest),
            "Sender replaced its PROPAGATE with a different digest"
        );
        let still_carried = state.request.digest() == old
            || state.finalised.as_ref().map(Request::digest) == Some(old)
            || state.propagates.values().any(|vote| vote.digest() == old);
        if !still_carried && self.by_digest.get(&old) == Some(req.key()) {
            self.by_digest.remove(&old);
        }
    }

    /// Remembers which client `key` came from. The first name wins.
    pub fn note_sender_client(&mut self, key: &RequestKey, client: &str) {
        if let Some(state) = self.requests.get_mut(key) {
            state.sender_client.get_or_insert_with(|| client.to_string());
        }
    }

    pub fn votes(&self, key: &RequestKey) -> usize {
        self.requests
            .get(key)
            .map(|state| state.propagates.len())
            .unwrap_or(0)
    }

    /// Finds a request whose digest is backed by a quorum of well-formed
    /// senders. Votes are grouped by digest, so a split between copies never
    /// adds up to a quorum.
    pub fn req_with_acceptable_quorum(
        &self,
        key: &RequestKey,
        quorum: &dyn QuorumOracle,
    ) -> Option<Request> {
        let state = self.requests.get(key)?;

        let mut by_digest: BTreeMap<Digest, (usize, &Request)> = BTreeMap::new();
        for (sender, req) in &state.propagates {
            if !sender.is_well_formed() {
                trace!(key = %key, sender = ?sender.as_str(), "Ignoring vote from malformed sender");
                continue;
            }
            by_digest.entry(req.digest()).or_insert((0, req)).0 += 1;
        }

        by_digest
            .into_values()
            .find(|(count, _)| quorum.is_reached(*count))
            .map(|(_, req)| req.clone())
    }

    /// Records `req` as the agreed copy for its key.
    pub fn set_finalised(&mut self, req: &Request) {
        let state = self.entry(req);
        if state.finalise(req.clone()) {
            self.finalised_count += 1;
        }
    }

    pub fn mark_as_forwarded(&mut self, key: &RequestKey, to: usize) {
        if let Some(state) = self.requests.get_mut(key) {
            state.forward(to);
        }
    }

    pub fn ordered_by_replica(&mut self, key: &RequestKey) {
        if let Some(state) = self.requests.get_mut(key) {
            state.ordered_by_replica();
        }
    }

    /// Returns true if this retired the request.
    pub fn mark_as_executed(&mut self, key: &RequestKey) -> bool {
        match self.requests.get_mut(key) {
            Some(state) => {
                state.executed = true;
                self.clean(key)
            }
            None => false,
        }
    }

    /// One replica instance is done with the request. Returns true if this
    /// retired it.
    pub fn free(&mut self, key: &RequestKey) -> bool {
        match self.requests.get_mut(key) {
            Some(state) => {
                state.release_replica();
                self.clean(key)
            }
            None => false,
        }
    }

    /// Drops the request whatever its phase.
    pub fn force_free(&mut self, key: &RequestKey) -> bool {
        self.remove(key).is_some()
    }

    fn clean(&mut self, key: &RequestKey) -> bool {
        let ready = self
            .requests
            .get_mut(key)
            .map(RequestState::retire_if_ready)
            .unwrap_or(false);
        if ready {
            self.remove(key);
        }
        ready
    }

    fn remove(&mut self, key: &RequestKey) -> Option<RequestState> {
        let state = self.requests.remove(key)?;
        if state.finalised.is_some() {
            self.finalised_count -= 1;
        }

        let digests = std::iter::once(&state.request)
            .chain(state.propagates.values())
            .chain(state.finalised.iter())
            .map(Request::digest);
        for digest in digests {
            if self.by_digest.get(&digest) == Some(key) {
                self.by_digest.remove(&digest);
            }
        }

        debug!(key = %key, phase = ?state.phase, "Request removed from store");
        Some(state)
    }

    pub fn has_propagated(&self, key: &RequestKey, sender: &NodeName) -> bool {
        self.requests
            .get(key)
            .map(|state| state.propagates.contains_key(sender))
            .unwrap_or(false)
    }

    pub fn is_finalised(&self, key: &RequestKey) -> bool {
        self.requests
            .get(key)
            .map(|state| state.finalised.is_some())
            .unwrap_or(false)
    }

    pub fn is_forwarded(&self, key: &RequestKey) -> bool {
        self.requests
            .get(key)
            .map(RequestState::forwarded)
            .unwrap_or(false)
    }

    /// Digest of the finalised copy, if there is one.
    pub fn digest(&self, key: &RequestKey) -> Option<Digest> {
        self.requests
            .get(key)
            .and_then(|state| state.finalised.as_ref())
            .map(Request::digest)
    }

    pub fn phase(&self, key: &RequestKey) -> Option<Phase> {
        self.requests.get(key).map(RequestState::phase)
    }
}
