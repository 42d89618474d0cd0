//! Per-request bookkeeping.

use std::collections::HashMap;
use std::time::Instant;

use super::message::{NodeName, Request};

/// Where a request is in its life on this node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    /// Collecting PROPAGATE votes.
    Pending,
    /// A digest reached quorum; the agreed request is recorded.
    Finalised,
    /// Handed to the replicas; waiting for them and the executor.
    Forwarded,
    /// Executed and released by every replica. The store drops it.
    Retired,
}

/// Tracking record for one request key.
///
/// Two independent signals retire a request: the executor marks it
/// executed, and each replica instance it was forwarded to frees it once.
/// [`RequestState::retire_if_ready`] is the only transition into
/// [`Phase::Retired`] and runs after either signal changes.
#[derive(Debug)]
pub struct RequestState {
    pub(crate) request: Request,
    pub(crate) propagates: HashMap<NodeName, Request>,
    pub(crate) sender_client: Option<String>,
    pub(crate) phase: Phase,
    pub(crate) forwarded_to: usize,
    pub(crate) unordered_by_replicas: usize,
    pub(crate) finalised: Option<Request>,
    pub(crate) executed: bool,
    pub(crate) added_at: Instant,
    pub(crate) finalised_at: Option<Instant>,
}

impl RequestState {
    pub(crate) fn new(request: Request) -> Self {
        RequestState {
            request,
            propagates: HashMap::new(),
            sender_client: None,
            phase: Phase::Pending,
            forwarded_to: 0,
            unordered_by_replicas: 0,
            finalised: None,
            executed: false,
            added_at: Instant::now(),
            finalised_at: None,
        }
    }

    /// The copy this node first saw, either from the client or from a vote.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn propagates(&self) -> &HashMap<NodeName, Request> {
        &self.propagates
    }

    /// Client the request was attributed to when this node voted for it.
    pub fn sender_client(&self) -> Option<&str> {
        self.sender_client.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn forwarded(&self) -> bool {
        matches!(self.phase, Phase::Forwarded | Phase::Retired)
    }

    pub fn forwarded_to(&self) -> usize {
        self.forwarded_to
    }

    pub fn unordered_by_replicas(&self) -> usize {
        self.unordered_by_replicas
    }

    pub fn finalised(&self) -> Option<&Request> {
        self.finalised.as_ref()
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn added_at(&self) -> Instant {
        self.added_at
    }

    pub fn finalised_at(&self) -> Option<Instant> {
        self.finalised_at
    }

    /// Records the agreed request. Returns true only the first time.
    pub(crate) fn finalise(&mut self, request: Request) -> bool {
        let first = self.finalised.is_none();
        if first {
            self.finalised_at = Some(Instant::now());
        }
        self.finalised = Some(request);
        if self.phase == Phase::Pending {
            self.phase = Phase::Finalised;
        }
        first
    }

    pub(crate) fn forward(&mut self, to: usize) {
        self.phase = Phase::Forwarded;
        self.forwarded_to = to;
        self.unordered_by_replicas = to;
    }

    pub(crate) fn release_replica(&mut self) {
        self.forwarded_to = self.forwarded_to.saturating_sub(1);
    }

    pub(crate) fn ordered_by_replica(&mut self) {
        self.unordered_by_replicas = self.unordered_by_replicas.saturating_sub(1);
    }

    /// Moves to [`Phase::Retired`] once executed and released by every
    /// replica it was forwarded to.
    pub(crate) fn retire_if_ready(&mut self) -> bool {
        if self.executed && self.forwarded_to == 0 {
            self.phase = Phase::Retired;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new("client1", 1, b"op".to_vec()).unwrap()
    }

    #[test]
    fn test_phase_transitions() {
        let mut state = RequestState::new(request());
        assert_eq!(state.phase(), Phase::Pending);
        assert!(!state.forwarded());

        assert!(state.finalise(request()));
        assert!(!state.finalise(request()));
        assert_eq!(state.phase(), Phase::Finalised);
        assert!(state.finalised_at().is_some());

        state.forward(2);
        assert_eq!(state.phase(), Phase::Forwarded);
        assert_eq!(state.forwarded_to(), 2);
        assert_eq!(state.unordered_by_replicas(), 2);

        state.executed = true;
        state.release_replica();
        assert!(!state.retire_if_ready());
        state.release_replica();
        assert!(state.retire_if_ready());
        assert_eq!(state.phase(), Phase::Retired);
    }

    #[test]
    fn test_release_never_underflows() {
        let mut state = RequestState::new(request());
        state.release_replica();
        state.ordered_by_replica();
        assert_eq!(state.forwarded_to(), 0);
        assert_eq!(state.unordered_by_replicas(), 0);
    }
}
