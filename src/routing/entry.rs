//! Routing table entry and its lifecycle state.

use crate::transport::InterfaceId;
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// Lifecycle state of a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteState {
    /// Usable route that has carried data.
    Valid,
    /// Broken or expired; kept for `delete_period` to remember the seqno.
    Invalid,
    /// Route discovery in progress; no usable next hop.
    InSearch,
    /// Usable route learned from control traffic only.
    ValidNoData,
}

impl RouteState {
    /// Whether a packet can be forwarded over a route in this state.
    pub fn is_usable(self) -> bool {
        matches!(self, RouteState::Valid | RouteState::ValidNoData)
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteState::Valid => "UP",
            RouteState::Invalid => "DOWN",
            RouteState::InSearch => "IN_SEARCH",
            RouteState::ValidNoData => "UP_NO_DATA",
        };
        write!(f, "{}", s)
    }
}

/// Serial-number comparison: is `a` strictly newer than `b`?
pub fn seqno_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// A route to one destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    destination: Ipv4Addr,
    seqno: u32,
    valid_seqno: bool,
    state: RouteState,
    next_hop: Ipv4Addr,
    interface: InterfaceId,
    hop_count: u8,
    /// Absolute expiry (ms).
    expires_at_ms: u64,
    precursors: BTreeSet<Ipv4Addr>,
    /// RREQ attempts sent at network-diameter TTL.
    rreq_count: u32,
}

impl RouteEntry {
    /// Create a valid route expiring `lifetime_ms` from `now_ms`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        destination: Ipv4Addr,
        valid_seqno: bool,
        seqno: u32,
        interface: InterfaceId,
        hop_count: u8,
        next_hop: Ipv4Addr,
        lifetime_ms: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            destination,
            seqno,
            valid_seqno,
            state: RouteState::Valid,
            next_hop,
            interface,
            hop_count,
            expires_at_ms: now_ms.saturating_add(lifetime_ms),
            precursors: BTreeSet::new(),
            rreq_count: 0,
        }
    }

    /// Create a placeholder for a destination under discovery.
    pub fn in_search(
        destination: Ipv4Addr,
        interface: InterfaceId,
        hop_count: u8,
        lifetime_ms: u64,
        now_ms: u64,
    ) -> Self {
        let mut entry = Self::new(
            destination,
            false,
            0,
            interface,
            hop_count,
            Ipv4Addr::UNSPECIFIED,
            lifetime_ms,
            now_ms,
        );
        entry.state = RouteState::InSearch;
        entry
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    pub fn set_seqno(&mut self, seqno: u32) {
        self.seqno = seqno;
    }

    pub fn valid_seqno(&self) -> bool {
        self.valid_seqno
    }

    pub fn set_valid_seqno(&mut self, valid: bool) {
        self.valid_seqno = valid;
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    pub fn set_state(&mut self, state: RouteState) {
        self.state = state;
    }

    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }

    pub fn next_hop(&self) -> Ipv4Addr {
        self.next_hop
    }

    pub fn set_next_hop(&mut self, next_hop: Ipv4Addr) {
        self.next_hop = next_hop;
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub fn set_interface(&mut self, interface: InterfaceId) {
        self.interface = interface;
    }

    pub fn hop_count(&self) -> u8 {
        self.hop_count
    }

    pub fn set_hop_count(&mut self, hop_count: u8) {
        self.hop_count = hop_count;
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    /// Remaining lifetime (0 if already expired).
    pub fn lifetime_ms(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms)
    }

    /// Set the expiry to `now + lifetime`, even if that shortens it.
    pub fn set_lifetime(&mut self, lifetime_ms: u64, now_ms: u64) {
        self.expires_at_ms = now_ms.saturating_add(lifetime_ms);
    }

    /// Move the expiry forward to `now + lifetime` if that is later.
    pub fn extend_lifetime(&mut self, lifetime_ms: u64, now_ms: u64) {
        self.expires_at_ms = self.expires_at_ms.max(now_ms.saturating_add(lifetime_ms));
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn rreq_count(&self) -> u32 {
        self.rreq_count
    }

    pub fn increment_rreq_count(&mut self) {
        self.rreq_count += 1;
    }

    pub fn reset_rreq_count(&mut self) {
        self.rreq_count = 0;
    }

    /// Mark the route broken. Precursors are kept so they can be notified.
    pub fn invalidate(&mut self, delete_period_ms: u64, now_ms: u64) {
        if self.state == RouteState::Invalid {
            return;
        }
        self.state = RouteState::Invalid;
        self.rreq_count = 0;
        self.expires_at_ms = now_ms.saturating_add(delete_period_ms);
    }

    /// Record a neighbor that forwards over this route. Returns true if new.
    pub fn insert_precursor(&mut self, addr: Ipv4Addr) -> bool {
        self.precursors.insert(addr)
    }

    pub fn remove_precursor(&mut self, addr: &Ipv4Addr) -> bool {
        self.precursors.remove(addr)
    }

    pub fn clear_precursors(&mut self) {
        self.precursors.clear();
    }

    pub fn has_precursors(&self) -> bool {
        !self.precursors.is_empty()
    }

    pub fn precursors(&self) -> &BTreeSet<Ipv4Addr> {
        &self.precursors
    }

    /// Freshness rule: should information carrying `seqno` at `hop_count`
    /// replace this entry?
    pub fn should_accept(&self, seqno: u32, hop_count: u8) -> bool {
        if self.state == RouteState::Invalid || !self.valid_seqno {
            return true;
        }
        if seqno_newer(seqno, self.seqno) {
            return true;
        }
        seqno == self.seqno
            && (hop_count < self.hop_count || self.state == RouteState::InSearch)
    }

    /// Replace the forwarding fields from a fresher advertisement.
    pub(crate) fn refresh_from(
        &mut self,
        seqno: u32,
        next_hop: Ipv4Addr,
        interface: InterfaceId,
        hop_count: u8,
        lifetime_ms: u64,
        now_ms: u64,
    ) {
        self.seqno = seqno;
        self.valid_seqno = true;
        self.state = RouteState::Valid;
        self.next_hop = next_hop;
        self.interface = interface;
        self.hop_count = hop_count;
        self.set_lifetime(lifetime_ms, now_ms);
    }
}
