//! [`TimerQueue`] – the single logical timeline of one watchdog context.
//!
//! Entries are ordered by `(deadline, insertion sequence)`: the earliest
//! deadline pops first and equal deadlines pop in the order they were added.
//! Cancelling removes the entry; a handle that already fired or was already
//! cancelled cancels nothing.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Returned by [`TimerQueue::after`] / [`TimerQueue::at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<(Duration, u64), T>,
    deadlines: HashMap<u64, Duration>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `token` at `now + delay`.
    pub fn after(&mut self, now: Duration, delay: Duration, token: T) -> TimerHandle {
        self.at(now.saturating_add(delay), token)
    }

    /// Schedule `token` at the absolute offset `deadline`.
    pub fn at(&mut self, deadline: Duration, token: T) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline, seq), token);
        self.deadlines.insert(seq, deadline);
        TimerHandle(seq)
    }

    /// Remove a pending entry, returning its token if it had not fired yet.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        let deadline = self.deadlines.remove(&handle.0)?;
        self.entries.remove(&(deadline, handle.0))
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest entry whose deadline is `<= now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        let (&(deadline, seq), _) = self.entries.first_key_value()?;
        if deadline > now {
            return None;
        }
        self.deadlines.remove(&seq);
        self.entries
            .remove(&(deadline, seq))
            .map(|token| (deadline, token))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut q = TimerQueue::new();
        q.after(secs(0), secs(8), "c");
        q.after(secs(0), secs(1), "a");
        q.after(secs(0), secs(5), "b");

        assert_eq!(q.next_deadline(), Some(secs(1)));
        assert_eq!(q.pop_due(secs(4)), Some((secs(1), "a")));
        assert_eq!(q.pop_due(secs(4)), None);
        assert_eq!(q.pop_due(secs(10)), Some((secs(5), "b")));
        assert_eq!(q.pop_due(secs(10)), Some((secs(8), "c")));
        assert!(q.is_empty());
    }

    #[test]
    fn equal_deadlines_are_fifo() {
        let mut q = TimerQueue::new();
        q.at(secs(3), 1);
        q.at(secs(3), 2);
        q.at(secs(3), 3);
        let order: Vec<i32> = std::iter::from_fn(|| q.pop_due(secs(3)).map(|(_, t)| t)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn cancel_removes_only_pending_entries() {
        let mut q = TimerQueue::new();
        let a = q.at(secs(1), 'a');
        let b = q.at(secs(2), 'b');

        assert_eq!(q.cancel(b), Some('b'));
        assert_eq!(q.cancel(b), None);
        assert!(!q.is_pending(b));

        assert_eq!(q.pop_due(secs(5)), Some((secs(1), 'a')));
        assert_eq!(q.cancel(a), None);
        assert_eq!(q.len(), 0);
        assert_eq!(q.next_deadline(), None);
    }
}
