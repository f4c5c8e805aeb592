//! Per-second control message rate limiting.
//!
//! Caps how many RREQs and RERRs this node originates per one-second
//! window. The window is reset by a periodic timer owned by the engine.

/// Length of a rate limiting window.
pub const RATE_WINDOW_MS: u64 = 1000;

/// Counter for messages sent in the current window.
#[derive(Clone, Debug)]
pub struct ControlRateLimiter {
    /// Maximum messages per window.
    limit: u16,
    /// Messages sent in the current window.
    count: u16,
    /// When the current window ends (ms).
    window_ends_at_ms: u64,
}

impl ControlRateLimiter {
    /// Create a limiter whose first window starts at `now_ms`.
    pub fn new(limit: u16, now_ms: u64) -> Self {
        Self {
            limit,
            count: 0,
            window_ends_at_ms: now_ms + RATE_WINDOW_MS,
        }
    }

    /// Take one slot in the current window.
    ///
    /// Returns false when the window is exhausted.
    pub fn try_acquire(&mut self) -> bool {
        if self.count >= self.limit {
            return false;
        }
        self.count += 1;
        true
    }

    /// Start a new window.
    pub fn reset(&mut self, now_ms: u64) {
        self.count = 0;
        self.window_ends_at_ms = now_ms + RATE_WINDOW_MS;
    }

    /// Milliseconds until the current window closes.
    pub fn ms_until_reset(&self, now_ms: u64) -> u64 {
        self.window_ends_at_ms.saturating_sub(now_ms)
    }

    pub fn is_exhausted(&self) -> bool {
        self.count >= self.limit
    }

    pub fn count(&self) -> u16 {
        self.count
    }
}
