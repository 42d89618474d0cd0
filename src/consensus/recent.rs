use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use crate::common::crypto::Digest;
use super::message::RequestKey;

pub const DEFAULT_RECENTLY_REQUESTED_CAPACITY: usize = 1000;
pub const DEFAULT_RECENTLY_RETIRED_CAPACITY: usize = 1000;

/// Bounded set that remembers the most recent insertions, oldest first.
/// Inserting past capacity evicts the oldest item.
#[derive(Debug)]
pub struct RecentSet<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
    capacity: usize,
}

/// Digests we recently asked peers about.
pub type RecentlyRequested = RecentSet<Digest>;

/// Requests this node already retired or force-freed. Late votes for them
/// are dropped.
pub type RecentlyRetired = RecentSet<RequestKey>;

impl<T: Hash + Eq + Clone> RecentSet<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RecentSet {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.members.contains(item)
    }

    /// Returns false if the item was already present. Re-inserting does
    /// not refresh its position.
    pub fn insert(&mut self, item: T) -> bool {
        if !self.members.insert(item.clone()) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(item);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Hash + Eq + Clone> Default for RecentSet<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RECENTLY_REQUESTED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(i: u32) -> Digest {
        let mut d = [0u8; 64];
        d[..4].copy_from_slice(&i.to_be_bytes());
        d
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut recent = RecentlyRequested::new(3);
        for i in 0..3 {
            assert!(recent.insert(digest(i)));
        }
        assert!(!recent.insert(digest(0)));
        assert_eq!(recent.len(), 3);

        recent.insert(digest(3));
        assert!(!recent.contains(&digest(0)));
        assert!(recent.contains(&digest(1)));
        assert!(recent.contains(&digest(3)));
        assert_eq!(recent.len(), 3);
    }

    #[test]
    fn test_default_capacity() {
        let mut recent = RecentlyRequested::default();
        assert_eq!(recent.capacity(), 1000);
        for i in 0..1500 {
            recent.insert(digest(i));
        }
        assert_eq!(recent.len(), 1000);
        assert!(!recent.contains(&digest(499)));
        assert!(recent.contains(&digest(500)));
    }

    #[test]
    fn test_retired_keys() {
        let mut retired = RecentlyRetired::new(2);
        let first = RequestKey::new("client1", 1);
        assert!(retired.insert(first.clone()));
        assert!(!retired.insert(first.clone()));
        retired.insert(RequestKey::new("client1", 2));
        retired.insert(RequestKey::new("client1", 3));
        assert!(!retired.contains(&first));
        assert!(retired.contains(&RequestKey::new("client1", 3)));
    }
}
