//! CPDA key advertisement, cluster query and join messages.
//!
//! All three reuse the RREP field layout as a header. The key advertisement
//! appends a fixed block of key slots.

use super::codec::{Reader, put_u16};
use super::{MessageType, ProtocolError, RouteReply, WireMessage};
use std::fmt;
use std::net::Ipv4Addr;

/// Key advertisement broadcast to one-hop neighbors.
///
/// Format (419 bytes): RREP header (19) followed by 200 × `[key:2]`.
/// Meaningful keys occupy a prefix of the slots; the rest are zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpdaKey {
    /// `dst` and `origin` both carry the advertising node.
    pub header: RouteReply,
    keys: Vec<u16>,
}

impl CpdaKey {
    /// Number of key slots on the wire.
    pub const KEY_SLOTS: usize = 200;
    /// Serialized body size.
    pub const SIZE: usize = RouteReply::SIZE + 2 * Self::KEY_SLOTS;

    /// Build an advertisement. Keys must be non-zero and fit the slot block.
    pub fn new(
        origin: Ipv4Addr,
        seqno: u32,
        lifetime_ms: u32,
        keys: Vec<u16>,
    ) -> Result<Self, ProtocolError> {
        if keys.len() > Self::KEY_SLOTS {
            return Err(ProtocolError::TooManyKeys {
                max: Self::KEY_SLOTS,
                got: keys.len(),
            });
        }
        if keys.contains(&0) {
            return Err(ProtocolError::InvalidKey);
        }
        Ok(Self {
            header: RouteReply::new(0, 0, origin, seqno, origin, lifetime_ms),
            keys,
        })
    }

    pub fn origin(&self) -> Ipv4Addr {
        self.header.origin
    }

    pub fn keys(&self) -> &[u16] {
        &self.keys
    }
}

impl WireMessage for CpdaKey {
    const MESSAGE_TYPE: MessageType = MessageType::CpdaKey;

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        self.header.encode_fields(buf);
        for slot in 0..Self::KEY_SLOTS {
            put_u16(buf, self.keys.get(slot).copied().unwrap_or(0));
        }
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(payload, Self::SIZE)?;
        let header = RouteReply::read_fields(&mut r)?;
        let mut keys = Vec::new();
        for _ in 0..Self::KEY_SLOTS {
            let key = r.u16()?;
            if key != 0 {
                keys.push(key);
            }
        }
        r.finish(Self::SIZE)?;
        Ok(Self { header, keys })
    }
}

impl fmt::Display for CpdaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "origin {} seqno {} keys {:?}",
            self.header.origin, self.header.dst_seqno, self.keys
        )
    }
}

/// Cluster query flooded from the root node.
///
/// Format (19 bytes): RREP layout. `origin` is the root and `dst_seqno`
/// carries the query id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpdaQuery {
    pub header: RouteReply,
}

impl CpdaQuery {
    /// Serialized body size.
    pub const SIZE: usize = RouteReply::SIZE;

    pub fn new(root: Ipv4Addr, query_id: u32, hop_count: u8, lifetime_ms: u32) -> Self {
        Self {
            header: RouteReply::new(0, hop_count, root, query_id, root, lifetime_ms),
        }
    }

    pub fn root(&self) -> Ipv4Addr {
        self.header.origin
    }

    pub fn query_id(&self) -> u32 {
        self.header.dst_seqno
    }

    pub fn hop_count(&self) -> u8 {
        self.header.hop_count
    }
}

impl WireMessage for CpdaQuery {
    const MESSAGE_TYPE: MessageType = MessageType::CpdaQuery;

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        self.header.encode_fields(buf);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            header: RouteReply::decode(payload)?,
        })
    }
}

impl fmt::Display for CpdaQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "root {} id {} hops {}",
            self.root(),
            self.query_id(),
            self.hop_count()
        )
    }
}

/// Join request (ack flag set) or confirmation (ack flag clear).
///
/// Format (19 bytes): RREP layout. `dst` is the leader, `origin` the
/// joining node and `dst_seqno` the shared key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpdaJoin {
    pub header: RouteReply,
}

impl CpdaJoin {
    /// Serialized body size.
    pub const SIZE: usize = RouteReply::SIZE;

    /// Ask `leader` to accept `joiner` using the matched `key`.
    pub fn request(leader: Ipv4Addr, joiner: Ipv4Addr, key: u16, lifetime_ms: u32) -> Self {
        let mut header = RouteReply::new(0, 0, leader, key as u32, joiner, lifetime_ms);
        header.set_ack_required(true);
        Self { header }
    }

    /// Confirm that `joiner` is now a member of `leader`'s cluster.
    pub fn confirm(leader: Ipv4Addr, joiner: Ipv4Addr, key: u16, lifetime_ms: u32) -> Self {
        Self {
            header: RouteReply::new(0, 0, leader, key as u32, joiner, lifetime_ms),
        }
    }

    pub fn is_request(&self) -> bool {
        self.header.ack_required()
    }

    pub fn leader(&self) -> Ipv4Addr {
        self.header.dst
    }

    pub fn joiner(&self) -> Ipv4Addr {
        self.header.origin
    }

    /// The shared key, or `None` if the field does not hold a valid key.
    pub fn key(&self) -> Option<u16> {
        u16::try_from(self.header.dst_seqno)
            .ok()
            .filter(|&k| k != 0)
    }
}

impl WireMessage for CpdaJoin {
    const MESSAGE_TYPE: MessageType = MessageType::CpdaJoin;

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        self.header.encode_fields(buf);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            header: RouteReply::decode(payload)?,
        })
    }
}

impl fmt::Display for CpdaJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_request() { "request" } else { "confirm" };
        write!(
            f,
            "{} leader {} joiner {} key {}",
            kind,
            self.leader(),
            self.joiner(),
            self.header.dst_seqno
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn test_key_layout() {
        let msg = CpdaKey::new(node(1), 4, 2000, vec![3, 7, 9]).unwrap();
        let encoded = msg.encode();
        assert_eq!(encoded.len(), 1 + 419);
        assert_eq!(encoded[0], 5);
        // First key slot follows the 19-byte header
        assert_eq!(&encoded[20..22], &3u16.to_be_bytes());
        assert_eq!(&encoded[22..24], &7u16.to_be_bytes());
        assert_eq!(&encoded[24..26], &9u16.to_be_bytes());
        assert!(encoded[26..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_key_decode_drops_empty_slots() {
        let msg = CpdaKey::new(node(1), 4, 2000, vec![12, 5]).unwrap();
        let decoded = CpdaKey::decode(&msg.encode()[1..]).unwrap();
        assert_eq!(decoded.keys(), &[12, 5]);
        assert_eq!(decoded.origin(), node(1));
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_key_validation() {
        assert_eq!(
            CpdaKey::new(node(1), 0, 0, vec![1; 201]),
            Err(ProtocolError::TooManyKeys { max: 200, got: 201 })
        );
        assert_eq!(
            CpdaKey::new(node(1), 0, 0, vec![4, 0]),
            Err(ProtocolError::InvalidKey)
        );
        assert!(CpdaKey::new(node(1), 0, 0, (1..=200).collect()).is_ok());
    }

    #[test]
    fn test_key_decode_short() {
        assert!(matches!(
            CpdaKey::decode(&[0u8; 100]),
            Err(ProtocolError::MessageTooShort { expected: 419, got: 100 })
        ));
    }

    #[test]
    fn test_query_fields() {
        let query = CpdaQuery::new(node(1), 42, 3, 1000);
        assert_eq!(query.root(), node(1));
        assert_eq!(query.query_id(), 42);
        assert_eq!(query.hop_count(), 3);

        let encoded = query.encode();
        assert_eq!(encoded.len(), 20);
        assert_eq!(encoded[0], 6);
        assert_eq!(CpdaQuery::decode(&encoded[1..]).unwrap(), query);
    }

    #[test]
    fn test_join_request_and_confirm() {
        let req = CpdaJoin::request(node(2), node(3), 7, 1000);
        assert!(req.is_request());
        assert_eq!(req.leader(), node(2));
        assert_eq!(req.joiner(), node(3));
        assert_eq!(req.key(), Some(7));

        let confirm = CpdaJoin::confirm(node(2), node(3), 7, 1000);
        assert!(!confirm.is_request());
        let decoded = CpdaJoin::decode(&confirm.encode()[1..]).unwrap();
        assert_eq!(decoded, confirm);
        assert!(decoded.to_string().starts_with("confirm"));
    }

    #[test]
    fn test_join_key_out_of_range() {
        let mut join = CpdaJoin::request(node(2), node(3), 7, 1000);
        join.header.dst_seqno = 70_000;
        assert_eq!(join.key(), None);
        join.header.dst_seqno = 0;
        assert_eq!(join.key(), None);
    }
}
