//! Set of keys that each expire a fixed time after insertion.

use super::CacheStats;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Clone, Debug)]
pub(super) struct ExpiringSet<K> {
    /// Key -> expiry (Unix-style milliseconds).
    entries: HashMap<K, u64>,
    lifetime_ms: u64,
}

impl<K: Hash + Eq + Copy> ExpiringSet<K> {
    pub(super) fn new(lifetime_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            lifetime_ms,
        }
    }

    /// Returns true if `key` is present and live; otherwise records it.
    pub(super) fn check_and_insert(&mut self, key: K, now_ms: u64) -> bool {
        if let Some(&expires_at) = self.entries.get(&key)
            && now_ms < expires_at
        {
            return true;
        }
        self.entries
            .insert(key, now_ms.saturating_add(self.lifetime_ms));
        false
    }

    pub(super) fn contains(&self, key: &K, now_ms: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|&expires_at| now_ms < expires_at)
    }

    pub(super) fn purge(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, &mut expires_at| now_ms < expires_at);
        before - self.entries.len()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn lifetime_ms(&self) -> u64 {
        self.lifetime_ms
    }

    pub(super) fn stats(&self, now_ms: u64) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            expired: self
                .entries
                .values()
                .filter(|&&expires_at| now_ms >= expires_at)
                .count(),
            lifetime_ms: self.lifetime_ms,
        }
    }
}
