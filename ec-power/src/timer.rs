//! Deferred work owned by a single state machine task. Entries are keyed, so
//! scheduling an already pending key moves it instead of queueing it twice;
//! scheduling with a zero delay makes it due on the next poll.

use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: Vec<(T, Instant)>,
}

impl<T: Copy + PartialEq> TimerQueue<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn schedule(&mut self, key: T, at: Instant) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = at,
            None => self.entries.push((key, at)),
        }
    }

    pub fn schedule_after(&mut self, key: T, now: Instant, delay: Duration) {
        self.schedule(key, now + delay);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove and return the earliest entry that is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, (_, at))| *at <= now)
            .min_by_key(|(_, (_, at))| *at)
            .map(|(i, _)| i)?;
        Some(self.entries.remove(idx).0)
    }
}

impl<T: Copy + PartialEq> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Key {
        A,
        B,
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn reschedule_replaces() {
        let mut q = TimerQueue::new();
        q.schedule(Key::A, at(10));
        q.schedule(Key::A, at(30));
        assert_eq!(q.pop_due(at(20)), None);
        assert_eq!(q.pop_due(at(30)), Some(Key::A));
        assert_eq!(q.pop_due(at(30)), None);
    }

    #[test]
    fn earliest_first() {
        let mut q = TimerQueue::new();
        q.schedule(Key::A, at(20));
        q.schedule(Key::B, at(10));
        assert_eq!(q.pop_due(at(50)), Some(Key::B));
        assert_eq!(q.pop_due(at(50)), Some(Key::A));
    }

    #[test]
    fn zero_delay_is_due_immediately() {
        let mut q = TimerQueue::new();
        q.schedule(Key::A, at(100));
        q.schedule_after(Key::A, at(5), Duration::from_millis(0));
        assert_eq!(q.pop_due(at(5)), Some(Key::A));
    }

    #[test]
    fn clear_drops_everything() {
        let mut q = TimerQueue::new();
        q.schedule(Key::A, at(1));
        q.schedule(Key::B, at(2));
        q.clear();
        assert_eq!(q.pop_due(at(10)), None);
    }
}
