/*
    Request propagation for a Byzantine-fault-tolerant pool of N nodes, of
    which at most f = floor((N - 1) / 3) may be faulty.

    Before a client request may be ordered, f + 1 nodes must attest that they
    received the same request by sending PROPAGATE messages carrying the same
    digest. A node that sees a request, either from the client or from a
    peer's PROPAGATE, votes for it once. When a digest collects f + 1 votes
    the request is finalised and handed to every replica instance, and its
    bookkeeping is released once the request was executed and every replica
    instance freed it.
*/

pub mod common;
pub mod consensus;
pub mod network;
