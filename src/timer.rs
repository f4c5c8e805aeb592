//! Timer service.
//!
//! Protocol timers are typed [`TimerEvent`] values rather than callbacks.
//! The engine schedules them on a [`Scheduler`] and drains due events in
//! its own dispatch loop, so timer handling shares `&mut Node` with packet
//! handling.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;

/// Handle for cancelling a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer:{}", self.0)
    }
}

/// Everything the engine can be woken up for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerEvent {
    /// Route discovery for a destination timed out.
    RreqRetry(Ipv4Addr),
    /// A rate-limited discovery may now be sent.
    DeferredRequest(Ipv4Addr),
    /// No RREP-ACK arrived from a neighbor.
    AckTimeout(Ipv4Addr),
    /// Periodic hello.
    Hello,
    /// Reset the per-second RREQ counter.
    RreqRateReset,
    /// Reset the per-second RERR counter.
    RerrRateReset,
    /// Periodic expiry of routes, neighbors, caches and queued packets.
    Maintenance,
    /// Advertise our CPDA keys.
    SendKey,
    /// Flood the CPDA cluster query.
    SendQuery,
    /// A CPDA join request went unanswered.
    JoinTimeout(Ipv4Addr),
}

/// Timer collaborator used by the engine.
///
/// Events due at the same instant fire in the order they were scheduled.
pub trait Scheduler {
    /// Current time in milliseconds on a monotonic clock.
    fn now_ms(&self) -> u64;

    /// Schedule `event` to fire `delay_ms` from now.
    fn schedule(&mut self, delay_ms: u64, event: TimerEvent) -> TimerId;

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    fn cancel(&mut self, id: TimerId) -> bool;

    /// Remove and return the next event whose deadline has passed.
    fn pop_due(&mut self) -> Option<(TimerId, TimerEvent)>;

    /// Deadline of the earliest pending event.
    fn next_deadline(&self) -> Option<u64>;
}

/// In-process scheduler driven by an externally advanced clock.
#[derive(Debug, Default)]
pub struct TimerQueue {
    now_ms: u64,
    next_id: u64,
    /// Pending events ordered by (deadline, id).
    pending: BTreeMap<(u64, TimerId), TimerEvent>,
    deadlines: HashMap<TimerId, u64>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue whose clock starts at `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            now_ms,
            ..Self::default()
        }
    }

    /// Move the clock to `now_ms`. The clock never goes backwards.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&mut self, delta_ms: u64) {
        self.now_ms = self.now_ms.saturating_add(delta_ms);
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether `event` is pending.
    pub fn is_scheduled(&self, event: &TimerEvent) -> bool {
        self.pending.values().any(|e| e == event)
    }
}

impl Scheduler for TimerQueue {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn schedule(&mut self, delay_ms: u64, event: TimerEvent) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let deadline = self.now_ms.saturating_add(delay_ms);
        self.pending.insert((deadline, id), event);
        self.deadlines.insert(id, deadline);
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.pending.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    fn pop_due(&mut self) -> Option<(TimerId, TimerEvent)> {
        let (&(deadline, id), _) = self.pending.first_key_value()?;
        if deadline > self.now_ms {
            return None;
        }
        let event = self.pending.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        Some((id, event))
    }

    fn next_deadline(&self) -> Option<u64> {
        self.pending.keys().next().map(|&(deadline, _)| deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_due_respects_deadline() {
        let mut timers = TimerQueue::new();
        timers.schedule(100, TimerEvent::Hello);
        assert_eq!(timers.next_deadline(), Some(100));
        assert!(timers.pop_due().is_none());

        timers.advance(99);
        assert!(timers.pop_due().is_none());
        timers.advance(1);
        assert_eq!(timers.pop_due().map(|(_, e)| e), Some(TimerEvent::Hello));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_same_instant_fires_in_schedule_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(10, TimerEvent::SendKey);
        timers.schedule(5, TimerEvent::Hello);
        timers.schedule(10, TimerEvent::Maintenance);
        timers.set_now(10);

        let fired: Vec<TimerEvent> = std::iter::from_fn(|| timers.pop_due())
            .map(|(_, e)| e)
            .collect();
        assert_eq!(
            fired,
            vec![TimerEvent::Hello, TimerEvent::SendKey, TimerEvent::Maintenance]
        );
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerQueue::new();
        let dst = Ipv4Addr::new(10, 0, 0, 5);
        let id = timers.schedule(10, TimerEvent::RreqRetry(dst));
        assert!(timers.is_scheduled(&TimerEvent::RreqRetry(dst)));
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        timers.advance(20);
        assert!(timers.pop_due().is_none());
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let mut timers = TimerQueue::starting_at(500);
        timers.set_now(100);
        assert_eq!(timers.now_ms(), 500);
        timers.set_now(700);
        assert_eq!(timers.now_ms(), 700);
    }
}
