//! Control message handlers, data path and timer dispatch.

mod cpda;
mod discovery;
mod dispatch;
mod forwarding;
mod hello;
mod reply;
mod request;
mod route_error;
mod timeout;

use crate::transport::InterfaceId;
use std::net::Ipv4Addr;

/// Where an inbound control message came from.
#[derive(Clone, Copy, Debug)]
pub(in crate::node) struct Received {
    pub interface: InterfaceId,
    pub sender: Ipv4Addr,
    /// IP TTL of the datagram, if the transport could observe it.
    pub ttl: Option<u8>,
}

/// TTL for relaying a flooded or forwarded control message, or `None`
/// when it must not travel further.
///
/// With an observed TTL the message is relayed only when at least two
/// hops remain. Without one the hop count is bounded by the network
/// diameter.
pub(in crate::node) fn relay_ttl(received: Option<u8>, hop_count: u8, net_diameter: u8) -> Option<u8> {
    match received {
        Some(ttl) if ttl < 2 => None,
        Some(ttl) => Some(ttl - 1),
        None if hop_count >= net_diameter => None,
        None => Some(net_diameter - hop_count),
    }
}
