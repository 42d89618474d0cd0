/*
    With N nodes the pool tolerates f = floor((N - 1) / 3) Byzantine nodes.
    A request is safe to order once f + 1 nodes report the same digest for
    it: at least one of them is correct, so the request really came from
    the client.
*/

/// Decides whether a number of matching votes is enough.
pub trait QuorumOracle: Send {
    fn is_reached(&self, votes: usize) -> bool;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Quorum {
    pub value: usize,
}

impl Quorum {
    pub fn new(value: usize) -> Self {
        Quorum { value }
    }
}

impl QuorumOracle for Quorum {
    fn is_reached(&self, votes: usize) -> bool {
        votes >= self.value
    }
}

/// Quorums derived from the pool size.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Quorums {
    pub n: usize,
    pub f: usize,
    pub propagate: Quorum,
}

impl Quorums {
    pub fn new(n: usize) -> Self {
        let f = max_faulty(n);
        Quorums {
            n,
            f,
            propagate: Quorum::new(f + 1),
        }
    }
}

pub fn max_faulty(n: usize) -> usize {
    n.saturating_sub(1) / 3
}
