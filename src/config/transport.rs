//! Transport configuration (`transport.*`).

use crate::protocol::AODV_PORT;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Default bind address (all interfaces).
const DEFAULT_BIND_ADDR: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Default broadcast address (limited broadcast).
const DEFAULT_BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Default receive buffer size.
const DEFAULT_RECV_BUF: usize = 2048;

/// UDP control transport configuration (`transport.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Address to bind the control socket to (`transport.bind_addr`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<Ipv4Addr>,

    /// Control port (`transport.port`). Defaults to 654.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Broadcast address for flooding (`transport.broadcast_addr`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_addr: Option<Ipv4Addr>,

    /// This node's routing address (`transport.local_addr`). Falls back
    /// to `bind_addr` when that is a concrete address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_addr: Option<Ipv4Addr>,

    /// Receive buffer size in bytes (`transport.recv_buf_size`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_buf_size: Option<usize>,
}

impl TransportConfig {
    /// Get the bind address, using default if not configured.
    pub fn bind_addr(&self) -> Ipv4Addr {
        self.bind_addr.unwrap_or(DEFAULT_BIND_ADDR)
    }

    /// Get the control port, using default if not configured.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(AODV_PORT)
    }

    /// Get the broadcast address, using default if not configured.
    pub fn broadcast_addr(&self) -> Ipv4Addr {
        self.broadcast_addr.unwrap_or(DEFAULT_BROADCAST_ADDR)
    }

    /// The routing address, if one can be determined.
    pub fn local_addr(&self) -> Option<Ipv4Addr> {
        self.local_addr.or_else(|| {
            let bind = self.bind_addr();
            (!bind.is_unspecified()).then_some(bind)
        })
    }

    /// Get the receive buffer size, using default if not configured.
    pub fn recv_buf_size(&self) -> usize {
        self.recv_buf_size.unwrap_or(DEFAULT_RECV_BUF)
    }

    /// Merge another transport config into this one.
    pub fn merge(&mut self, other: TransportConfig) {
        if other.bind_addr.is_some() {
            self.bind_addr = other.bind_addr;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.broadcast_addr.is_some() {
            self.broadcast_addr = other.broadcast_addr;
        }
        if other.local_addr.is_some() {
            self.local_addr = other.local_addr;
        }
        if other.recv_buf_size.is_some() {
            self.recv_buf_size = other.recv_buf_size;
        }
    }
}
