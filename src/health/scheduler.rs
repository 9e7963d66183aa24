//! Monitor scheduling.
//!
//! # Responsibilities
//! - Cycle through every host for background checks, each once per epoch
//! - Let a caller push a host to the very front ("check this one next")
//!
//! # Design Decisions
//! - Two queues partition the host set: `pending` (not yet visited this epoch)
//!   and `visited`. When `pending` runs dry they swap; that is the epoch boundary
//! - A priority request removes the host from whichever queue holds it and
//!   puts it first in `pending`
//! - The partition is verified on every `next()`; a mismatch is a bug

use std::collections::VecDeque;

use crate::error::InvariantViolation;

/// Fair cyclic scheduler with a priority override.
#[derive(Debug)]
pub struct MonitorScheduler<K> {
    pending: VecDeque<K>,
    visited: VecDeque<K>,
    hosts: usize,
}

impl<K> Default for MonitorScheduler<K> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            visited: VecDeque::new(),
            hosts: 0,
        }
    }
}

impl<K: Clone + PartialEq> MonitorScheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host; it will be visited in the current epoch.
    pub fn register(&mut self, key: K) {
        self.pending.push_back(key);
        self.hosts += 1;
    }

    pub fn len(&self) -> usize {
        self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.hosts == 0
    }

    /// Next host to check, `None` when no host is registered.
    pub fn next(&mut self) -> Result<Option<K>, InvariantViolation> {
        let queued = self.pending.len() + self.visited.len();
        if queued != self.hosts {
            return Err(InvariantViolation::SchedulerAccounting {
                queued,
                hosts: self.hosts,
            });
        }

        if self.pending.is_empty() {
            std::mem::swap(&mut self.pending, &mut self.visited);
        }

        let Some(next) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.visited.push_back(next.clone());
        Ok(Some(next))
    }

    /// Make `key` the very next host returned by [`next`](Self::next).
    ///
    /// Idempotent. Returns false, and changes nothing, for an unknown key.
    pub fn request_immediate(&mut self, key: &K) -> bool {
        let in_pending = remove(&mut self.pending, key);
        let in_visited = remove(&mut self.visited, key);
        if !(in_pending || in_visited) {
            return false;
        }
        self.pending.push_front(key.clone());
        true
    }
}

fn remove<K: PartialEq>(queue: &mut VecDeque<K>, key: &K) -> bool {
    match queue.iter().position(|k| k == key) {
        Some(index) => {
            queue.remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(keys: &[char]) -> MonitorScheduler<char> {
        let mut s = MonitorScheduler::new();
        for &k in keys {
            s.register(k);
        }
        s
    }

    fn take(s: &mut MonitorScheduler<char>, n: usize) -> Vec<char> {
        (0..n).map(|_| s.next().unwrap().unwrap()).collect()
    }

    #[test]
    fn every_host_once_per_epoch() {
        let mut s = scheduler(&['a', 'b', 'c']);
        let seq = take(&mut s, 12);
        for window in seq.windows(3) {
            let mut w = window.to_vec();
            w.sort_unstable();
            assert_eq!(w, vec!['a', 'b', 'c'], "window {:?}", window);
        }
        assert_eq!(&seq[..3], &['a', 'b', 'c']);
    }

    #[test]
    fn request_immediate_from_visited() {
        let mut s = scheduler(&['a', 'b', 'c']);
        assert_eq!(take(&mut s, 2), vec!['a', 'b']);
        // 'b' sits in visited now
        assert!(s.request_immediate(&'b'));
        assert_eq!(s.next().unwrap(), Some('b'));
        assert_eq!(s.next().unwrap(), Some('c'));
    }

    #[test]
    fn request_immediate_from_pending_and_idempotent() {
        let mut s = scheduler(&['a', 'b', 'c']);
        assert!(s.request_immediate(&'c'));
        assert!(s.request_immediate(&'c'));
        assert_eq!(s.len(), 3);
        assert_eq!(take(&mut s, 3), vec!['c', 'a', 'b']);
    }

    #[test]
    fn request_immediate_at_epoch_boundary() {
        let mut s = scheduler(&['a', 'b']);
        assert_eq!(take(&mut s, 2), vec!['a', 'b']);
        // pending is empty, both visited
        assert!(s.request_immediate(&'b'));
        assert_eq!(take(&mut s, 3), vec!['b', 'a', 'b']);
    }

    #[test]
    fn unknown_key_is_ignored() {
        let mut s = scheduler(&['a']);
        assert!(!s.request_immediate(&'z'));
        assert_eq!(take(&mut s, 2), vec!['a', 'a']);
    }

    #[test]
    fn empty_scheduler_yields_nothing() {
        let mut s: MonitorScheduler<char> = MonitorScheduler::new();
        assert!(s.is_empty());
        assert_eq!(s.next().unwrap(), None);
    }

    #[test]
    fn accounting_mismatch_is_reported() {
        let mut s = scheduler(&['a', 'b']);
        s.visited.push_back('a');
        assert_eq!(
            s.next(),
            Err(InvariantViolation::SchedulerAccounting { queued: 3, hosts: 2 })
        );
    }
}
