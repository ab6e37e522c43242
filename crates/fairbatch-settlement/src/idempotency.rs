//! Idempotency guard: remembers which one-shot actions already happened.
//!
//! Each key can be marked once. Callers map a repeated mark to their own
//! error (`AlreadyClaimed` for reward claims) or to a no-op (treasury
//! deliveries and sweeps). Keys are never forgotten: a claim must be
//! rejected however long ago it happened.

use std::collections::HashSet;
use std::hash::Hash;

/// Set of keys already acted on.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard<K> {
    seen: HashSet<K>,
}

impl<K: Eq + Hash> IdempotencyGuard<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Mark `key`. Returns `false` if it was already marked.
    pub fn mark(&mut self, key: K) -> bool {
        self.seen.insert(key)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl<K: Eq + Hash> Default for IdempotencyGuard<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use fairbatch_types::{BatchId, ParticipantId};

    use super::*;

    #[test]
    fn first_mark_wins() {
        let mut guard = IdempotencyGuard::new();
        let key = (BatchId(1), ParticipantId::new());
        assert!(guard.mark(key));
        assert!(!guard.mark(key));
        assert!(guard.contains(&key));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn keeps_everything() {
        let mut guard = IdempotencyGuard::new();
        for i in 0..10_000u64 {
            guard.mark(i);
        }
        assert_eq!(guard.len(), 10_000);
        assert!(guard.contains(&0));
    }

    #[test]
    fn string_keys() {
        let mut guard: IdempotencyGuard<(BatchId, String)> = IdempotencyGuard::default();
        assert!(guard.is_empty());
        assert!(guard.mark((BatchId(1), "proceeds:USDC".into())));
        assert!(guard.mark((BatchId(1), "proceeds:ETH".into())));
        assert!(!guard.mark((BatchId(1), "proceeds:USDC".into())));
    }
}
