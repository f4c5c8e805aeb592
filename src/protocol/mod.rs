//! AODV and CPDA control messages.
//!
//! Every control datagram is a one-byte [`MessageType`] tag followed by a
//! fixed-layout body in network byte order. Each message struct implements
//! [`WireMessage`]; [`Message`] is the tagged union the engine dispatches on.
//!
//! | Message    | Tag | Body size |
//! |------------|-----|-----------|
//! | RREQ       | 1   | 23        |
//! | RREP       | 2   | 19        |
//! | RERR       | 3   | 3 + 8N    |
//! | RREP-ACK   | 4   | 1         |
//! | CPDA-KEY   | 5   | 419       |
//! | CPDA-QUERY | 6   | 19        |
//! | CPDA-JOIN  | 7   | 19        |

mod codec;
mod cpda;
mod error;
mod message;
mod reply;
mod request;
mod route_error;

pub use cpda::{CpdaJoin, CpdaKey, CpdaQuery};
pub use error::ProtocolError;
pub use message::{Message, MessageType, WireMessage};
pub use reply::{RouteReply, RouteReplyAck};
pub use request::RouteRequest;
pub use route_error::RouteError;

/// Reserved UDP port for AODV control traffic.
pub const AODV_PORT: u16 = 654;
