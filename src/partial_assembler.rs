//! Assembles a complete message out of two or more partial rows captured in
//! separate packages, within a time window.
//!
//! Some protocols (`secplus_v2` among them) split one logical message
//! across two back-to-back button-press transmissions; a decoder that only
//! ever sees one package at a time needs somewhere to hold the first half
//! while it waits for the second.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Holds partial fragments of type `T`, matched by a caller-supplied key,
/// until either a match completes them or they age out of `window`.
pub struct PartialAssembler<K, T> {
    window: Duration,
    pending: VecDeque<(K, T, DateTime<Utc>)>,
}

impl<K: PartialEq + Clone, T> PartialAssembler<K, T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: VecDeque::new(),
        }
    }

    /// Offer a new fragment. If a pending fragment with an equal key exists
    /// within the window, it is removed and returned alongside the new one
    /// (caller combines them into a full message); otherwise the fragment
    /// is queued and `None` is returned.
    pub fn offer(&mut self, key: K, fragment: T, now: DateTime<Utc>) -> Option<(T, T)> {
        self.evict_expired(now);
        if let Some(pos) = self.pending.iter().position(|(k, _, _)| *k == key) {
            let (_, first, _) = self.pending.remove(pos).unwrap();
            Some((first, fragment))
        } else {
            self.pending.push_back((key, fragment, now));
            None
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        while let Some((_, _, seen_at)) = self.pending.front() {
            if now.signed_duration_since(*seen_at) > self.window {
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_key_within_window_completes_pair() {
        let mut asm: PartialAssembler<u32, &'static str> = PartialAssembler::new(Duration::milliseconds(500));
        let t0 = Utc::now();
        assert!(asm.offer(1, "first-half", t0).is_none());
        let pair = asm.offer(1, "second-half", t0 + Duration::milliseconds(100));
        assert_eq!(pair, Some(("first-half", "second-half")));
    }

    #[test]
    fn stale_fragment_is_evicted_and_not_matched() {
        let mut asm: PartialAssembler<u32, &'static str> = PartialAssembler::new(Duration::milliseconds(100));
        let t0 = Utc::now();
        assert!(asm.offer(1, "first-half", t0).is_none());
        let pair = asm.offer(1, "second-half", t0 + Duration::milliseconds(500));
        assert!(pair.is_none());
        assert_eq!(asm.pending_count(), 1);
    }

    #[test]
    fn different_keys_stay_independent() {
        let mut asm: PartialAssembler<u32, &'static str> = PartialAssembler::new(Duration::milliseconds(500));
        let t0 = Utc::now();
        assert!(asm.offer(1, "a", t0).is_none());
        assert!(asm.offer(2, "b", t0).is_none());
        assert_eq!(asm.pending_count(), 2);
    }
}
