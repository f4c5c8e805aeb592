//! Route request (RREQ).

use super::codec::{Reader, put_addr, put_u32, set_bit};
use super::{MessageType, ProtocolError, WireMessage};
use std::fmt;
use std::net::Ipv4Addr;

const FLAG_GRATUITOUS_RREP: u8 = 5;
const FLAG_DESTINATION_ONLY: u8 = 4;
const FLAG_UNKNOWN_SEQNO: u8 = 3;

/// Request for a route to `dst`, flooded with a limited TTL.
///
/// Format (23 bytes):
/// `[flags:1][reserved:1][hop_count:1][request_id:4][dst:4][dst_seqno:4][origin:4][origin_seqno:4]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRequest {
    /// Flag bits: gratuitous RREP (5), destination only (4), unknown seqno (3).
    pub flags: u8,
    pub reserved: u8,
    /// Hops from the originator to the node handling the request.
    pub hop_count: u8,
    /// Per-originator broadcast id.
    pub request_id: u32,
    pub dst: Ipv4Addr,
    /// Latest sequence number the originator knows for `dst`.
    pub dst_seqno: u32,
    pub origin: Ipv4Addr,
    pub origin_seqno: u32,
}

impl RouteRequest {
    /// Serialized body size.
    pub const SIZE: usize = 23;

    /// Create a request with all flags cleared.
    pub fn new(
        hop_count: u8,
        request_id: u32,
        dst: Ipv4Addr,
        dst_seqno: u32,
        origin: Ipv4Addr,
        origin_seqno: u32,
    ) -> Self {
        Self {
            flags: 0,
            reserved: 0,
            hop_count,
            request_id,
            dst,
            dst_seqno,
            origin,
            origin_seqno,
        }
    }

    pub fn gratuitous_rrep(&self) -> bool {
        self.flags & (1 << FLAG_GRATUITOUS_RREP) != 0
    }

    pub fn set_gratuitous_rrep(&mut self, on: bool) {
        set_bit(&mut self.flags, FLAG_GRATUITOUS_RREP, on);
    }

    pub fn destination_only(&self) -> bool {
        self.flags & (1 << FLAG_DESTINATION_ONLY) != 0
    }

    pub fn set_destination_only(&mut self, on: bool) {
        set_bit(&mut self.flags, FLAG_DESTINATION_ONLY, on);
    }

    pub fn unknown_seqno(&self) -> bool {
        self.flags & (1 << FLAG_UNKNOWN_SEQNO) != 0
    }

    pub fn set_unknown_seqno(&mut self, on: bool) {
        set_bit(&mut self.flags, FLAG_UNKNOWN_SEQNO, on);
    }
}

impl WireMessage for RouteRequest {
    const MESSAGE_TYPE: MessageType = MessageType::RouteRequest;

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        buf.push(self.flags);
        buf.push(self.reserved);
        buf.push(self.hop_count);
        put_u32(buf, self.request_id);
        put_addr(buf, self.dst);
        put_u32(buf, self.dst_seqno);
        put_addr(buf, self.origin);
        put_u32(buf, self.origin_seqno);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(payload, Self::SIZE)?;
        let msg = Self {
            flags: r.u8()?,
            reserved: r.u8()?,
            hop_count: r.u8()?,
            request_id: r.u32()?,
            dst: r.addr()?,
            dst_seqno: r.u32()?,
            origin: r.addr()?,
            origin_seqno: r.u32()?,
        };
        r.finish(Self::SIZE)?;
        Ok(msg)
    }
}

impl fmt::Display for RouteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {} dst {} seqno {} origin {} seqno {} hops {} flags: G={} D={} U={}",
            self.request_id,
            self.dst,
            self.dst_seqno,
            self.origin,
            self.origin_seqno,
            self.hop_count,
            self.gratuitous_rrep() as u8,
            self.destination_only() as u8,
            self.unknown_seqno() as u8,
        )
    }
}
