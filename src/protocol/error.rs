//! Protocol error types.

use thiserror::Error;

/// Errors related to control message encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid message type: 0x{0:02x}")]
    InvalidMessageType(u8),

    #[error("empty datagram")]
    Empty,

    #[error("message too short: expected at least {expected}, got {got}")]
    MessageTooShort { expected: usize, got: usize },

    #[error("malformed header: declared size {expected}, consumed {consumed}")]
    MalformedHeader { expected: usize, consumed: usize },

    #[error("too many unreachable destinations: max {max}")]
    TooManyUnreachable { max: usize },

    #[error("too many keys: max {max}, got {got}")]
    TooManyKeys { max: usize, got: usize },

    #[error("key value 0 is reserved")]
    InvalidKey,
}
