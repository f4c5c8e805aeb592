//! Transport Layer Abstractions
//!
//! The routing engine sends control and data datagrams through a
//! [`Transport`] and is fed [`InboundDatagram`]s by its driver. One
//! transport may serve several [`Interface`]s; each interface has a local
//! address and a subnet broadcast address.

pub mod udp;

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

// ============================================================================
// Interfaces
// ============================================================================

/// Identifier for a network interface the engine runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub u32);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// A local interface address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interface {
    pub id: InterfaceId,
    /// Our address on this interface.
    pub local: Ipv4Addr,
    /// Subnet broadcast address used for flooding.
    pub broadcast: Ipv4Addr,
}

impl Interface {
    pub fn new(id: InterfaceId, local: Ipv4Addr, broadcast: Ipv4Addr) -> Self {
        Self {
            id,
            local,
            broadcast,
        }
    }
}

// ============================================================================
// Datagrams
// ============================================================================

/// A datagram handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundDatagram {
    /// Interface to send on.
    pub interface: InterfaceId,
    /// Unicast neighbor or the interface broadcast address.
    pub destination: Ipv4Addr,
    /// IP TTL to send with.
    pub ttl: u8,
    pub payload: Vec<u8>,
}

/// A datagram received by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundDatagram {
    /// Interface it arrived on.
    pub interface: InterfaceId,
    /// Neighbor that transmitted it.
    pub sender: Ipv4Addr,
    /// Remaining IP TTL, if the transport can observe it.
    pub ttl: Option<u8>,
    pub payload: Vec<u8>,
}

/// Channel sender for received datagrams.
pub type InboundTx = tokio::sync::mpsc::Sender<InboundDatagram>;

/// Channel receiver for received datagrams.
pub type InboundRx = tokio::sync::mpsc::Receiver<InboundDatagram>;

/// Create an inbound datagram channel with the given buffer size.
pub fn inbound_channel(buffer: usize) -> (InboundTx, InboundRx) {
    tokio::sync::mpsc::channel(buffer)
}

// ============================================================================
// Errors
// ============================================================================

/// Errors related to transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not started")]
    NotStarted,

    #[error("transport already started")]
    AlreadyStarted,

    #[error("transport failed to start: {0}")]
    StartFailed(String),

    #[error("send to {destination} failed: {reason}")]
    SendFailed {
        destination: Ipv4Addr,
        reason: String,
    },

    #[error("send queue full, dropped datagram to {destination}")]
    QueueFull { destination: Ipv4Addr },

    #[error("unknown interface {0}")]
    UnknownInterface(InterfaceId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the failure says the destination cannot be reached, as
    /// opposed to local congestion or a stopped transport.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, TransportError::SendFailed { .. })
    }
}

/// Channel sender for neighbors a send failed to after `send` returned.
pub type LinkFailureTx = tokio::sync::mpsc::UnboundedSender<Ipv4Addr>;

/// Channel receiver for asynchronously detected link failures.
pub type LinkFailureRx = tokio::sync::mpsc::UnboundedReceiver<Ipv4Addr>;

/// Create a link failure channel.
pub fn link_failure_channel() -> (LinkFailureTx, LinkFailureRx) {
    tokio::sync::mpsc::unbounded_channel()
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Datagram delivery used by the routing engine.
///
/// `send` must not block. A unicast that fails with a link failure (see
/// [`TransportError::is_link_failure`]) is handled by the engine as a
/// broken link toward the destination; other errors only drop the
/// datagram.
pub trait Transport {
    fn send(&mut self, datagram: OutboundDatagram) -> Result<(), TransportError>;
}

// ============================================================================
// Test Implementations
// ============================================================================


#[cfg(test)]
mod tests {
    use super::test_impls::MockTransport;
    use super::*;

    #[test]
    fn test_interface_id_display() {
        assert_eq!(InterfaceId(2).to_string(), "if2");
    }

    #[test]
    fn test_mock_transport_records() {
        let mut transport = MockTransport::new();
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        transport
            .send(OutboundDatagram {
                interface: InterfaceId(0),
                destination: dst,
                ttl: 1,
                payload: vec![4, 0],
            })
            .unwrap();
        assert_eq!(transport.sent().len(), 1);

        transport.set_unreachable(dst);
        let result = transport.send(OutboundDatagram {
            interface: InterfaceId(0),
            destination: dst,
            ttl: 1,
            payload: vec![4, 0],
        });
        assert!(matches!(result, Err(TransportError::SendFailed { .. })));
        assert_eq!(transport.take_sent().len(), 1);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::SendFailed {
            destination: Ipv4Addr::new(10, 0, 0, 2),
            reason: "no buffer".into(),
        };
        assert_eq!(err.to_string(), "send to 10.0.0.2 failed: no buffer");
    }

    #[test]
    fn test_only_send_failures_are_link_failures() {
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        assert!(TransportError::SendFailed {
            destination: dst,
            reason: "host unreachable".into(),
        }
        .is_link_failure());
        assert!(!TransportError::QueueFull { destination: dst }.is_link_failure());
        assert!(!TransportError::NotStarted.is_link_failure());
    }
}
