//! AODV-CPDA: on-demand mesh routing with cluster formation
//!
//! An AODV (RFC 3561) routing engine extended with CPDA key agreement:
//! nodes advertise randomly selected keys to their neighbors, a query node
//! floods a cluster query, and nodes sharing a key with the neighbor they
//! heard it from join that neighbor's cluster.

pub mod cache;
pub mod config;
pub mod cpda;
pub mod neighbor;
pub mod node;
pub mod packet;
pub mod protocol;
pub mod queue;
pub mod routing;
pub mod timer;
pub mod transport;

// Re-export config types
pub use config::{AodvConfig, Config, ConfigError, CpdaConfig, TransportConfig};

// Re-export protocol types
pub use protocol::{
    AODV_PORT, CpdaJoin, CpdaKey, CpdaQuery, Message, MessageType, ProtocolError, RouteError,
    RouteReply, RouteReplyAck, RouteRequest, WireMessage,
};

// Re-export routing types
pub use routing::{RouteEntry, RouteState, RoutingTable};

// Re-export CPDA types
pub use cpda::{ClusterRole, ClusterState, KeyMap};

// Re-export data path types
pub use packet::{DataPacket, DeliverFn, ErrorFn, ForwardError, ForwardFn, Route};

// Re-export timer types
pub use timer::{Scheduler, TimerEvent, TimerId, TimerQueue};

// Re-export transport types
pub use transport::udp::UdpTransport;
pub use transport::{
    InboundDatagram, InboundRx, InboundTx, Interface, InterfaceId, LinkFailureRx, LinkFailureTx,
    OutboundDatagram, Transport, TransportError, inbound_channel, link_failure_channel,
};

// Re-export node types
pub use node::{Node, NodeError, NodeState};
