//! Data-plane packets and the continuations used to hand them back.

use crate::transport::InterfaceId;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// A data packet routed by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPacket {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// Identifier unique per source, used for duplicate detection.
    pub id: u64,
    /// IP time-to-live, decremented on every forward.
    pub ttl: u8,
    pub payload: Vec<u8>,
}

impl DataPacket {
    /// TTL given to locally originated packets.
    pub const DEFAULT_TTL: u8 = 64;

    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, id: u64, payload: Vec<u8>) -> Self {
        Self {
            source,
            destination,
            id,
            ttl: Self::DEFAULT_TTL,
            payload,
        }
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination.is_broadcast()
    }
}

/// A resolved forwarding decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub destination: Ipv4Addr,
    /// Our address on the output interface.
    pub source: Ipv4Addr,
    /// Next hop.
    pub gateway: Ipv4Addr,
    pub interface: InterfaceId,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} src {} dev {}",
            self.destination, self.gateway, self.source, self.interface
        )
    }
}

/// Why a packet could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("no route to {destination}")]
    RouteUnavailable { destination: Ipv4Addr },

    #[error("request queue full for {destination}")]
    QueueOverflow { destination: Ipv4Addr },

    #[error("no interface is up")]
    NoInterface,
}

/// Invoked once a route for the packet is known.
pub type ForwardFn = Box<dyn FnOnce(Route, DataPacket)>;

/// Invoked when the packet is dropped.
pub type ErrorFn = Box<dyn FnOnce(DataPacket, ForwardError)>;

/// Invoked for packets addressed to this node.
pub type DeliverFn = Box<dyn FnOnce(DataPacket, InterfaceId)>;
