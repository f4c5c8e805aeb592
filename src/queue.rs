//! Per-destination buffer for packets awaiting route discovery.

use crate::packet::{DataPacket, ErrorFn, ForwardFn};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;

/// One buffered packet together with how to complete it.
pub struct QueueEntry {
    packet: DataPacket,
    on_route: ForwardFn,
    on_error: Option<ErrorFn>,
    enqueued_at_ms: u64,
}

impl QueueEntry {
    pub fn new(
        packet: DataPacket,
        on_route: ForwardFn,
        on_error: Option<ErrorFn>,
        enqueued_at_ms: u64,
    ) -> Self {
        Self {
            packet,
            on_route,
            on_error,
            enqueued_at_ms,
        }
    }

    pub fn packet(&self) -> &DataPacket {
        &self.packet
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.packet.destination
    }

    pub fn enqueued_at_ms(&self) -> u64 {
        self.enqueued_at_ms
    }

    /// Split into the packet and its continuations.
    pub fn into_parts(self) -> (DataPacket, ForwardFn, Option<ErrorFn>) {
        (self.packet, self.on_route, self.on_error)
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("packet", &self.packet)
            .field("has_error_handler", &self.on_error.is_some())
            .field("enqueued_at_ms", &self.enqueued_at_ms)
            .finish()
    }
}

/// Result of [`RequestQueue::enqueue`].
#[derive(Debug)]
pub enum Enqueued {
    /// Buffered without displacing anything.
    Queued,
    /// Buffered; the oldest packet for the destination was pushed out.
    DroppedOldest(QueueEntry),
    /// Rejected: the same packet is already waiting.
    Duplicate(QueueEntry),
}

/// Bounded, drop-front buffer keyed by destination.
#[derive(Debug)]
pub struct RequestQueue {
    queues: BTreeMap<Ipv4Addr, VecDeque<QueueEntry>>,
    /// Per-destination capacity.
    max_len: usize,
    max_time_ms: u64,
}

impl RequestQueue {
    pub fn new(max_len: usize, max_time_ms: u64) -> Self {
        Self {
            queues: BTreeMap::new(),
            max_len,
            max_time_ms,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn max_time_ms(&self) -> u64 {
        self.max_time_ms
    }

    /// Buffer a packet, evicting the destination's oldest packet if full.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Enqueued {
        let queue = self.queues.entry(entry.destination()).or_default();

        let duplicate = queue.iter().any(|e| {
            e.packet.id == entry.packet.id && e.packet.source == entry.packet.source
        });
        if duplicate {
            return Enqueued::Duplicate(entry);
        }

        let evicted = if queue.len() >= self.max_len {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(entry);

        match evicted {
            Some(old) => Enqueued::DroppedOldest(old),
            None => Enqueued::Queued,
        }
    }

    /// Remove every packet for `dst`, oldest first.
    pub fn dequeue_all(&mut self, dst: &Ipv4Addr) -> Vec<QueueEntry> {
        self.queues
            .remove(dst)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Remove every packet for `dst` without delivering it.
    pub fn drop_for_destination(&mut self, dst: &Ipv4Addr) -> Vec<QueueEntry> {
        self.dequeue_all(dst)
    }

    /// Remove packets that waited longer than the queue timeout.
    pub fn drop_expired(&mut self, now_ms: u64) -> Vec<QueueEntry> {
        let max_time_ms = self.max_time_ms;
        let mut expired = Vec::new();
        for queue in self.queues.values_mut() {
            // Entries are in arrival order
            while queue
                .front()
                .is_some_and(|e| now_ms.saturating_sub(e.enqueued_at_ms) >= max_time_ms)
            {
                if let Some(entry) = queue.pop_front() {
                    expired.push(entry);
                }
            }
        }
        self.queues.retain(|_, q| !q.is_empty());
        expired
    }

    /// Whether any packet is waiting for `dst`.
    pub fn has(&self, dst: &Ipv4Addr) -> bool {
        self.queues.contains_key(dst)
    }

    pub fn len_for(&self, dst: &Ipv4Addr) -> usize {
        self.queues.get(dst).map_or(0, VecDeque::len)
    }

    /// Total buffered packets.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Destinations with buffered packets.
    pub fn destinations(&self) -> impl Iterator<Item = &Ipv4Addr> {
        self.queues.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn make_entry(dst: u8, id: u64, now_ms: u64) -> QueueEntry {
        let packet = DataPacket::new(addr(1), addr(dst), id, vec![id as u8]);
        QueueEntry::new(packet, Box::new(|_, _| {}), None, now_ms)
    }

    fn ids(entries: &[QueueEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.packet().id).collect()
    }

    #[test]
    fn test_drop_front_at_capacity() {
        let mut queue = RequestQueue::new(2, 30_000);
        assert!(matches!(queue.enqueue(make_entry(9, 1, 0)), Enqueued::Queued));
        assert!(matches!(queue.enqueue(make_entry(9, 2, 0)), Enqueued::Queued));
        match queue.enqueue(make_entry(9, 3, 0)) {
            Enqueued::DroppedOldest(old) => assert_eq!(old.packet().id, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ids(&queue.dequeue_all(&addr(9))), vec![2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_is_per_destination() {
        let mut queue = RequestQueue::new(2, 30_000);
        queue.enqueue(make_entry(9, 1, 0));
        queue.enqueue(make_entry(9, 2, 0));
        queue.enqueue(make_entry(8, 3, 0));
        queue.enqueue(make_entry(8, 4, 0));
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.len_for(&addr(9)), 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut queue = RequestQueue::new(4, 30_000);
        queue.enqueue(make_entry(9, 1, 0));
        assert!(matches!(
            queue.enqueue(make_entry(9, 1, 10)),
            Enqueued::Duplicate(_)
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drop_expired() {
        let mut queue = RequestQueue::new(4, 1000);
        queue.enqueue(make_entry(9, 1, 0));
        queue.enqueue(make_entry(9, 2, 600));
        queue.enqueue(make_entry(8, 3, 100));

        assert!(queue.drop_expired(999).is_empty());
        let expired = queue.drop_expired(1100);
        assert_eq!(ids(&expired), vec![3, 1]);
        assert!(!queue.has(&addr(8)));
        assert!(queue.has(&addr(9)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_into_parts_runs_continuation() {
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = delivered.clone();
        let packet = DataPacket::new(addr(1), addr(9), 7, vec![]);
        let entry = QueueEntry::new(
            packet,
            Box::new(move |route, p| sink.borrow_mut().push((route.gateway, p.id))),
            None,
            0,
        );

        let (packet, on_route, on_error) = entry.into_parts();
        assert!(on_error.is_none());
        on_route(
            crate::packet::Route {
                destination: addr(9),
                source: addr(1),
                gateway: addr(2),
                interface: crate::transport::InterfaceId(0),
            },
            packet,
        );
        assert_eq!(*delivered.borrow(), vec![(addr(2), 7)]);
    }
}
