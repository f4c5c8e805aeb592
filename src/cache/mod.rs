//! Duplicate suppression caches.
//!
//! [`IdCache`] remembers (originator, RREQ id) pairs so a flooded request
//! is processed once. [`DuplicatePacketDetection`] does the same for
//! broadcast data packets keyed by (source, packet id). Entries expire
//! after a fixed lifetime; expiry is checked lazily on access and in bulk
//! by `purge`.

mod dpd;
mod expiring;
mod id_cache;

pub use dpd::DuplicatePacketDetection;
pub use id_cache::IdCache;

/// Cache statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries (including expired ones not yet purged).
    pub entries: usize,
    /// Number of expired entries.
    pub expired: usize,
    /// Entry lifetime in milliseconds.
    pub lifetime_ms: u64,
}
