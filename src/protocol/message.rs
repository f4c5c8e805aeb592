//! Message type tag and the tagged union over all control messages.

use super::{
    CpdaJoin, CpdaKey, CpdaQuery, ProtocolError, RouteError, RouteReply, RouteReplyAck,
    RouteRequest,
};
use std::fmt;

/// Control message type identifiers.
///
/// A single tag byte precedes every control message on the wire. The
/// AODV values follow RFC 3561; the CPDA extension takes the next free
/// values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Route request, flooded with expanding ring TTL.
    RouteRequest = 1,
    /// Route reply, unicast back along the reverse path. Also used as hello.
    RouteReply = 2,
    /// Route error listing unreachable destinations.
    RouteError = 3,
    /// Acknowledgment of an RREP carrying the ack-required flag.
    RouteReplyAck = 4,
    /// CPDA key advertisement to one-hop neighbors.
    CpdaKey = 5,
    /// CPDA cluster query flooded from the root.
    CpdaQuery = 6,
    /// CPDA join request / confirmation.
    CpdaJoin = 7,
}

impl MessageType {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(MessageType::RouteRequest),
            2 => Some(MessageType::RouteReply),
            3 => Some(MessageType::RouteError),
            4 => Some(MessageType::RouteReplyAck),
            5 => Some(MessageType::CpdaKey),
            6 => Some(MessageType::CpdaQuery),
            7 => Some(MessageType::CpdaJoin),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::RouteRequest => "RREQ",
            MessageType::RouteReply => "RREP",
            MessageType::RouteError => "RERR",
            MessageType::RouteReplyAck => "RREP_ACK",
            MessageType::CpdaKey => "CPDA_KEY",
            MessageType::CpdaQuery => "CPDA_QUERY",
            MessageType::CpdaJoin => "CPDA_JOIN",
        };
        write!(f, "{}", name)
    }
}

/// Capability shared by every control message body.
pub trait WireMessage: Sized + fmt::Display {
    /// The tag byte written ahead of the body.
    const MESSAGE_TYPE: MessageType;

    /// Serialized size of the body in bytes (excluding the tag).
    fn serialized_size(&self) -> usize;

    /// Append the body in network byte order.
    fn encode_body(&self, buf: &mut Vec<u8>);

    /// Decode a body (after the tag byte has been consumed).
    fn decode(payload: &[u8]) -> Result<Self, ProtocolError>;

    /// Encode as wire format (includes the tag byte).
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.serialized_size());
        buf.push(Self::MESSAGE_TYPE.to_byte());
        self.encode_body(&mut buf);
        buf
    }
}

/// Any decoded control message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    RouteRequest(RouteRequest),
    RouteReply(RouteReply),
    RouteError(RouteError),
    RouteReplyAck(RouteReplyAck),
    CpdaKey(CpdaKey),
    CpdaQuery(CpdaQuery),
    CpdaJoin(CpdaJoin),
}

impl Message {
    /// Decode a full datagram: tag byte followed by the message body.
    pub fn decode(datagram: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, payload) = datagram.split_first().ok_or(ProtocolError::Empty)?;
        let msg_type = MessageType::from_byte(tag).ok_or(ProtocolError::InvalidMessageType(tag))?;

        let msg = match msg_type {
            MessageType::RouteRequest => Message::RouteRequest(RouteRequest::decode(payload)?),
            MessageType::RouteReply => Message::RouteReply(RouteReply::decode(payload)?),
            MessageType::RouteError => Message::RouteError(RouteError::decode(payload)?),
            MessageType::RouteReplyAck => Message::RouteReplyAck(RouteReplyAck::decode(payload)?),
            MessageType::CpdaKey => Message::CpdaKey(CpdaKey::decode(payload)?),
            MessageType::CpdaQuery => Message::CpdaQuery(CpdaQuery::decode(payload)?),
            MessageType::CpdaJoin => Message::CpdaJoin(CpdaJoin::decode(payload)?),
        };
        Ok(msg)
    }

    /// Encode as wire format (includes the tag byte).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::RouteRequest(m) => m.encode(),
            Message::RouteReply(m) => m.encode(),
            Message::RouteError(m) => m.encode(),
            Message::RouteReplyAck(m) => m.encode(),
            Message::CpdaKey(m) => m.encode(),
            Message::CpdaQuery(m) => m.encode(),
            Message::CpdaJoin(m) => m.encode(),
        }
    }

    /// The tag of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::RouteRequest(_) => MessageType::RouteRequest,
            Message::RouteReply(_) => MessageType::RouteReply,
            Message::RouteError(_) => MessageType::RouteError,
            Message::RouteReplyAck(_) => MessageType::RouteReplyAck,
            Message::CpdaKey(_) => MessageType::CpdaKey,
            Message::CpdaQuery(_) => MessageType::CpdaQuery,
            Message::CpdaJoin(_) => MessageType::CpdaJoin,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.message_type())?;
        match self {
            Message::RouteRequest(m) => write!(f, "{}", m),
            Message::RouteReply(m) => write!(f, "{}", m),
            Message::RouteError(m) => write!(f, "{}", m),
            Message::RouteReplyAck(m) => write!(f, "{}", m),
            Message::CpdaKey(m) => write!(f, "{}", m),
            Message::CpdaQuery(m) => write!(f, "{}", m),
            Message::CpdaJoin(m) => write!(f, "{}", m),
        }
    }
}
