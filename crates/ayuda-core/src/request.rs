//! Request identifiers for discarding stale async results.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use crate::cache::lock;

/// Opaque request id for matching async results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// Tracks the latest active request and ignores stale results.
#[derive(Debug, Default)]
pub struct LatestOnly {
    next: u64,
    active: Option<RequestId>,
}

impl LatestOnly {
    /// Start a new request and mark it as active.
    pub fn begin(&mut self) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        self.active = Some(id);
        id
    }

    /// Cancel any active request.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    /// Returns true if the provided id is still the active request.
    pub fn is_active(&self, id: RequestId) -> bool {
        self.active == Some(id)
    }

    /// Finish the request if it's still active.
    pub fn finish_if_active(&mut self, id: RequestId) -> bool {
        if self.is_active(id) {
            self.active = None;
            true
        } else {
            false
        }
    }
}

/// A request tagged with its key and issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    pub key: K,
    pub seq: u64,
}

#[derive(Debug)]
struct KeyState {
    issued: u64,
    applied: Option<u64>,
}

/// Per-key monotonically increasing sequence numbers.
///
/// A result is accepted only when its sequence number is at least the last
/// one applied for the same key, so an older response that resolves late can
/// never overwrite a newer one ("latest-issued-wins").
#[derive(Debug)]
pub struct KeyedSequencer<K> {
    keys: Mutex<HashMap<K, KeyState>>,
}

impl<K> Default for KeyedSequencer<K> {
    fn default() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedSequencer<K> {
    pub fn begin(&self, key: K) -> Ticket<K> {
        let mut keys = lock(&self.keys);
        let state = keys.entry(key.clone()).or_insert(KeyState {
            issued: 0,
            applied: None,
        });
        state.issued += 1;
        Ticket {
            key,
            seq: state.issued,
        }
    }

    /// Records the ticket as applied if it is not older than the last
    /// applied result for its key.
    pub fn accept(&self, ticket: &Ticket<K>) -> bool {
        let mut keys = lock(&self.keys);
        let Some(state) = keys.get_mut(&ticket.key) else {
            // Sequencer was reset (logout) after the request was issued.
            return false;
        };
        if state.applied.is_some_and(|applied| ticket.seq < applied) {
            return false;
        }
        state.applied = Some(ticket.seq);
        true
    }

    pub fn reset(&self) {
        lock(&self.keys).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_only_ignores_superseded() {
        let mut latest = LatestOnly::default();
        let first = latest.begin();
        let second = latest.begin();
        assert!(!latest.finish_if_active(first));
        assert!(latest.finish_if_active(second));
        assert!(!latest.is_active(second));
    }

    #[test]
    fn test_latest_only_cancel() {
        let mut latest = LatestOnly::default();
        let id = latest.begin();
        latest.cancel();
        assert!(!latest.finish_if_active(id));
    }

    #[test]
    fn test_sequencer_rejects_older_after_newer_applied() {
        let seq = KeyedSequencer::default();
        let old = seq.begin("a");
        let new = seq.begin("a");
        assert!(seq.accept(&new));
        assert!(!seq.accept(&old));
    }

    #[test]
    fn test_sequencer_accepts_older_when_newer_never_applied() {
        let seq = KeyedSequencer::default();
        let old = seq.begin("a");
        let new = seq.begin("a");
        // The newer request failed; the older result is still the freshest data.
        assert!(seq.accept(&old));
        assert!(seq.accept(&new));
    }

    #[test]
    fn test_sequencer_keys_are_independent() {
        let seq = KeyedSequencer::default();
        let a = seq.begin("a");
        let b1 = seq.begin("b");
        let b2 = seq.begin("b");
        assert!(seq.accept(&b2));
        assert!(seq.accept(&a));
        assert!(!seq.accept(&b1));
    }

    #[test]
    fn test_sequencer_reset_rejects_in_flight() {
        let seq = KeyedSequencer::default();
        let ticket = seq.begin("a");
        seq.reset();
        assert!(!seq.accept(&ticket));
    }
}
