//! Route reply (RREP), hello and RREP-ACK.

use super::codec::{Reader, put_addr, put_u32, set_bit};
use super::{MessageType, ProtocolError, WireMessage};
use std::fmt;
use std::net::Ipv4Addr;

const FLAG_ACK_REQUIRED: u8 = 6;

/// Reply carrying a route to `dst`, unicast toward `origin`.
///
/// Format (19 bytes):
/// `[flags:1][prefix_size:1][hop_count:1][dst:4][dst_seqno:4][origin:4][lifetime_ms:4]`
///
/// The same layout is reused by the CPDA messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteReply {
    /// Flag bits: ack required (6).
    pub flags: u8,
    pub prefix_size: u8,
    pub hop_count: u8,
    pub dst: Ipv4Addr,
    pub dst_seqno: u32,
    pub origin: Ipv4Addr,
    /// Time the receiving nodes may consider the route valid.
    pub lifetime_ms: u32,
}

impl RouteReply {
    /// Serialized body size.
    pub const SIZE: usize = 19;

    pub fn new(
        prefix_size: u8,
        hop_count: u8,
        dst: Ipv4Addr,
        dst_seqno: u32,
        origin: Ipv4Addr,
        lifetime_ms: u32,
    ) -> Self {
        Self {
            flags: 0,
            prefix_size,
            hop_count,
            dst,
            dst_seqno,
            origin,
            lifetime_ms,
        }
    }

    /// A hello message: a reply about ourselves with zero hops.
    pub fn hello(addr: Ipv4Addr, seqno: u32, lifetime_ms: u32) -> Self {
        Self::new(0, 0, addr, seqno, addr, lifetime_ms)
    }

    /// Hellos are the only replies whose destination is also the origin.
    pub fn is_hello(&self) -> bool {
        self.dst == self.origin
    }

    pub fn ack_required(&self) -> bool {
        self.flags & (1 << FLAG_ACK_REQUIRED) != 0
    }

    pub fn set_ack_required(&mut self, on: bool) {
        set_bit(&mut self.flags, FLAG_ACK_REQUIRED, on);
    }

    pub(crate) fn encode_fields(&self, buf: &mut Vec<u8>) {
        buf.push(self.flags);
        buf.push(self.prefix_size);
        buf.push(self.hop_count);
        put_addr(buf, self.dst);
        put_u32(buf, self.dst_seqno);
        put_addr(buf, self.origin);
        put_u32(buf, self.lifetime_ms);
    }

    pub(crate) fn read_fields(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            flags: r.u8()?,
            prefix_size: r.u8()?,
            hop_count: r.u8()?,
            dst: r.addr()?,
            dst_seqno: r.u32()?,
            origin: r.addr()?,
            lifetime_ms: r.u32()?,
        })
    }
}

impl WireMessage for RouteReply {
    const MESSAGE_TYPE: MessageType = MessageType::RouteReply;

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        self.encode_fields(buf);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(payload, Self::SIZE)?;
        let msg = Self::read_fields(&mut r)?;
        r.finish(Self::SIZE)?;
        Ok(msg)
    }
}

impl fmt::Display for RouteReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dst {} seqno {} origin {} lifetime {}ms hops {} ack {}",
            self.dst,
            self.dst_seqno,
            self.origin,
            self.lifetime_ms,
            self.hop_count,
            self.ack_required() as u8,
        )
    }
}

/// Acknowledgment for an RREP sent with the ack-required flag.
///
/// Format (1 byte): `[reserved:1]`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteReplyAck {
    pub reserved: u8,
}

impl RouteReplyAck {
    /// Serialized body size.
    pub const SIZE: usize = 1;

    pub fn new() -> Self {
        Self::default()
    }
}

impl WireMessage for RouteReplyAck {
    const MESSAGE_TYPE: MessageType = MessageType::RouteReplyAck;

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.push(self.reserved);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(payload, Self::SIZE)?;
        let reserved = r.u8()?;
        r.finish(Self::SIZE)?;
        Ok(Self { reserved })
    }
}

impl fmt::Display for RouteReplyAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reserved {}", self.reserved)
    }
}
