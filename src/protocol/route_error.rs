//! Route error (RERR).

use super::codec::{Reader, put_addr, put_u32, set_bit};
use super::{MessageType, ProtocolError, WireMessage};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

const FLAG_NO_DELETE: u8 = 0;

/// Notification that a set of destinations became unreachable.
///
/// Format (3 + 8N bytes):
/// `[flags:1][reserved:1][count:1]` followed by N × `[addr:4][seqno:4]`
///
/// Entries are kept ordered by address so the encoding is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteError {
    /// Flag bits: no delete (0).
    pub flags: u8,
    pub reserved: u8,
    unreachable: BTreeMap<Ipv4Addr, u32>,
}

impl RouteError {
    /// Fixed header size before the unreachable list.
    pub const HEADER_SIZE: usize = 3;
    /// Size of one (address, seqno) pair.
    pub const ENTRY_SIZE: usize = 8;
    /// The count field is one byte.
    pub const MAX_UNREACHABLE: usize = 255;

    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unreachable destination. Adding an already listed address is a no-op.
    pub fn add_unreachable(&mut self, dst: Ipv4Addr, seqno: u32) -> Result<(), ProtocolError> {
        if self.unreachable.contains_key(&dst) {
            return Ok(());
        }
        if self.unreachable.len() >= Self::MAX_UNREACHABLE {
            return Err(ProtocolError::TooManyUnreachable {
                max: Self::MAX_UNREACHABLE,
            });
        }
        self.unreachable.insert(dst, seqno);
        Ok(())
    }

    /// Remove and return one listed destination.
    pub fn remove_unreachable(&mut self) -> Option<(Ipv4Addr, u32)> {
        self.unreachable.pop_first()
    }

    pub fn clear(&mut self) {
        self.unreachable.clear();
        self.flags = 0;
        self.reserved = 0;
    }

    pub fn unreachable_count(&self) -> usize {
        self.unreachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unreachable.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.unreachable.len() >= Self::MAX_UNREACHABLE
    }

    /// Listed destinations with their last known sequence numbers.
    pub fn unreachable(&self) -> impl Iterator<Item = (Ipv4Addr, u32)> + '_ {
        self.unreachable.iter().map(|(&addr, &seqno)| (addr, seqno))
    }

    pub fn no_delete(&self) -> bool {
        self.flags & (1 << FLAG_NO_DELETE) != 0
    }

    pub fn set_no_delete(&mut self, on: bool) {
        set_bit(&mut self.flags, FLAG_NO_DELETE, on);
    }
}

impl WireMessage for RouteError {
    const MESSAGE_TYPE: MessageType = MessageType::RouteError;

    fn serialized_size(&self) -> usize {
        Self::HEADER_SIZE + Self::ENTRY_SIZE * self.unreachable.len()
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.push(self.flags);
        buf.push(self.reserved);
        buf.push(self.unreachable.len() as u8);
        for (&addr, &seqno) in &self.unreachable {
            put_addr(buf, addr);
            put_u32(buf, seqno);
        }
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(payload, Self::HEADER_SIZE)?;
        let flags = r.u8()?;
        let reserved = r.u8()?;
        let count = r.u8()? as usize;
        let declared = Self::HEADER_SIZE + Self::ENTRY_SIZE * count;

        let mut unreachable = BTreeMap::new();
        for _ in 0..count {
            let addr = r.addr()?;
            let seqno = r.u32()?;
            unreachable.insert(addr, seqno);
        }
        r.finish(declared)?;

        // A repeated address would shrink the message below its wire size
        if unreachable.len() != count {
            return Err(ProtocolError::MalformedHeader {
                expected: Self::HEADER_SIZE + Self::ENTRY_SIZE * unreachable.len(),
                consumed: declared,
            });
        }

        Ok(Self {
            flags,
            reserved,
            unreachable,
        })
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unreachable [")?;
        for (i, (addr, seqno)) in self.unreachable().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} seqno {}", addr, seqno)?;
        }
        write!(f, "] no-delete {}", self.no_delete() as u8)
    }
}
