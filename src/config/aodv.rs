//! AODV protocol parameters (`aodv.*`).
//!
//! Every field is optional so that a higher priority config file can set
//! any value, including one equal to the default. Base parameters fall
//! back to RFC 3561 defaults; the derived timings are computed from them
//! unless overridden explicitly.

use serde::{Deserialize, Serialize};

const DEFAULT_RREQ_RETRIES: u32 = 2;
const DEFAULT_TTL_START: u8 = 1;
const DEFAULT_TTL_INCREMENT: u8 = 2;
const DEFAULT_TTL_THRESHOLD: u8 = 7;
const DEFAULT_TIMEOUT_BUFFER: u8 = 2;
const DEFAULT_RREQ_RATE_LIMIT: u16 = 10;
const DEFAULT_RERR_RATE_LIMIT: u16 = 10;
const DEFAULT_NODE_TRAVERSAL_TIME_MS: u64 = 40;
const DEFAULT_NET_DIAMETER: u8 = 35;
const DEFAULT_ACTIVE_ROUTE_TIMEOUT_MS: u64 = 3000;
const DEFAULT_HELLO_INTERVAL_MS: u64 = 1000;
const DEFAULT_ALLOWED_HELLO_LOSS: u32 = 2;
const DEFAULT_MAX_QUEUE_LEN: usize = 64;
const DEFAULT_MAX_QUEUE_TIME_MS: u64 = 30_000;
const DEFAULT_DESTINATION_ONLY: bool = false;
const DEFAULT_GRATUITOUS_REPLY: bool = true;
const DEFAULT_ENABLE_HELLO: bool = true;
const DEFAULT_ENABLE_BROADCAST: bool = true;
const DEFAULT_MAINTENANCE_INTERVAL_MS: u64 = 500;

/// Routing protocol configuration (`aodv.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AodvConfig {
    /// RREQ attempts at network-diameter TTL before giving up (`aodv.rreq_retries`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rreq_retries: Option<u32>,

    /// Initial expanding ring TTL (`aodv.ttl_start`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_start: Option<u8>,

    /// Expanding ring TTL step (`aodv.ttl_increment`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_increment: Option<u8>,

    /// Above this TTL, use the network diameter (`aodv.ttl_threshold`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_threshold: Option<u8>,

    /// Extra hops of slack in the ring timeout (`aodv.timeout_buffer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_buffer: Option<u8>,

    /// Max RREQs originated per second (`aodv.rreq_rate_limit`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rreq_rate_limit: Option<u16>,

    /// Max RERRs originated per second (`aodv.rerr_rate_limit`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerr_rate_limit: Option<u16>,

    /// Conservative one-hop traversal estimate in ms (`aodv.node_traversal_time_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_traversal_time_ms: Option<u64>,

    /// Max hops between any two nodes (`aodv.net_diameter`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_diameter: Option<u8>,

    /// Lifetime granted to routes in use, in ms (`aodv.active_route_timeout_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_route_timeout_ms: Option<u64>,

    /// Hello period in ms (`aodv.hello_interval_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hello_interval_ms: Option<u64>,

    /// Hellos that may be missed before a link is considered lost (`aodv.allowed_hello_loss`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_hello_loss: Option<u32>,

    /// Buffered packets per destination (`aodv.max_queue_len`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_len: Option<usize>,

    /// Longest a packet may wait for a route, in ms (`aodv.max_queue_time_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_time_ms: Option<u64>,

    /// Only the destination may answer our RREQs (`aodv.destination_only`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_only: Option<bool>,

    /// Ask intermediate repliers to notify the destination (`aodv.gratuitous_reply`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gratuitous_reply: Option<bool>,

    /// Send periodic hellos (`aodv.enable_hello`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_hello: Option<bool>,

    /// Forward broadcast data packets (`aodv.enable_broadcast`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_broadcast: Option<bool>,

    /// Route, neighbor and cache expiry period in ms (`aodv.maintenance_interval_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_interval_ms: Option<u64>,

    /// Override for `2 × node_traversal × net_diameter` (`aodv.net_traversal_time_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_traversal_time_ms: Option<u64>,

    /// Override for `2 × net_traversal` (`aodv.path_discovery_time_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_discovery_time_ms: Option<u64>,

    /// Override for `2 × max(path_discovery, active_route_timeout)` (`aodv.my_route_timeout_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_route_timeout_ms: Option<u64>,

    /// Override for `rreq_retries × net_traversal` (`aodv.blacklist_timeout_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist_timeout_ms: Option<u64>,

    /// Override for `node_traversal + 10` (`aodv.next_hop_wait_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_wait_ms: Option<u64>,

    /// Override for `5 × max(active_route_timeout, hello_interval)` (`aodv.delete_period_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_period_ms: Option<u64>,
}

impl AodvConfig {
    /// RREQ attempts at network-diameter TTL.
    pub fn rreq_retries(&self) -> u32 {
        self.rreq_retries.unwrap_or(DEFAULT_RREQ_RETRIES)
    }

    pub fn ttl_start(&self) -> u8 {
        self.ttl_start.unwrap_or(DEFAULT_TTL_START)
    }

    pub fn ttl_increment(&self) -> u8 {
        self.ttl_increment.unwrap_or(DEFAULT_TTL_INCREMENT)
    }

    pub fn ttl_threshold(&self) -> u8 {
        self.ttl_threshold.unwrap_or(DEFAULT_TTL_THRESHOLD)
    }

    pub fn timeout_buffer(&self) -> u8 {
        self.timeout_buffer.unwrap_or(DEFAULT_TIMEOUT_BUFFER)
    }

    /// Max RREQs originated per second.
    pub fn rreq_rate_limit(&self) -> u16 {
        self.rreq_rate_limit.unwrap_or(DEFAULT_RREQ_RATE_LIMIT)
    }

    /// Max RERRs originated per second.
    pub fn rerr_rate_limit(&self) -> u16 {
        self.rerr_rate_limit.unwrap_or(DEFAULT_RERR_RATE_LIMIT)
    }

    pub fn node_traversal_time_ms(&self) -> u64 {
        self.node_traversal_time_ms.unwrap_or(DEFAULT_NODE_TRAVERSAL_TIME_MS)
    }

    /// Max hops between any two nodes.
    pub fn net_diameter(&self) -> u8 {
        self.net_diameter.unwrap_or(DEFAULT_NET_DIAMETER)
    }

    /// Lifetime granted to routes in use.
    pub fn active_route_timeout_ms(&self) -> u64 {
        self.active_route_timeout_ms.unwrap_or(DEFAULT_ACTIVE_ROUTE_TIMEOUT_MS)
    }

    pub fn hello_interval_ms(&self) -> u64 {
        self.hello_interval_ms.unwrap_or(DEFAULT_HELLO_INTERVAL_MS)
    }

    pub fn allowed_hello_loss(&self) -> u32 {
        self.allowed_hello_loss.unwrap_or(DEFAULT_ALLOWED_HELLO_LOSS)
    }

    pub fn max_queue_len(&self) -> usize {
        self.max_queue_len.unwrap_or(DEFAULT_MAX_QUEUE_LEN)
    }

    pub fn max_queue_time_ms(&self) -> u64 {
        self.max_queue_time_ms.unwrap_or(DEFAULT_MAX_QUEUE_TIME_MS)
    }

    pub fn destination_only(&self) -> bool {
        self.destination_only.unwrap_or(DEFAULT_DESTINATION_ONLY)
    }

    pub fn gratuitous_reply(&self) -> bool {
        self.gratuitous_reply.unwrap_or(DEFAULT_GRATUITOUS_REPLY)
    }

    /// Whether periodic hellos are sent.
    pub fn enable_hello(&self) -> bool {
        self.enable_hello.unwrap_or(DEFAULT_ENABLE_HELLO)
    }

    pub fn enable_broadcast(&self) -> bool {
        self.enable_broadcast.unwrap_or(DEFAULT_ENABLE_BROADCAST)
    }

    pub fn maintenance_interval_ms(&self) -> u64 {
        self.maintenance_interval_ms.unwrap_or(DEFAULT_MAINTENANCE_INTERVAL_MS)
    }

    /// Worst-case time for a packet to cross the network.
    pub fn net_traversal_time_ms(&self) -> u64 {
        self.net_traversal_time_ms
            .unwrap_or(2 * self.node_traversal_time_ms() * self.net_diameter() as u64)
    }

    /// Lifetime of RREQ id cache entries.
    pub fn path_discovery_time_ms(&self) -> u64 {
        self.path_discovery_time_ms
            .unwrap_or(2 * self.net_traversal_time_ms())
    }

    /// Lifetime advertised in RREPs generated by the destination.
    pub fn my_route_timeout_ms(&self) -> u64 {
        self.my_route_timeout_ms.unwrap_or(
            2 * self
                .path_discovery_time_ms()
                .max(self.active_route_timeout_ms()),
        )
    }

    /// How long a neighbor stays blacklisted after a missing RREP-ACK.
    pub fn blacklist_timeout_ms(&self) -> u64 {
        self.blacklist_timeout_ms
            .unwrap_or(self.rreq_retries() as u64 * self.net_traversal_time_ms())
    }

    /// How long to wait for an RREP-ACK.
    pub fn next_hop_wait_ms(&self) -> u64 {
        self.next_hop_wait_ms
            .unwrap_or(self.node_traversal_time_ms() + 10)
    }

    /// How long an invalidated route is kept before deletion.
    pub fn delete_period_ms(&self) -> u64 {
        self.delete_period_ms.unwrap_or(
            5 * self
                .active_route_timeout_ms()
                .max(self.hello_interval_ms()),
        )
    }

    /// Lifetime advertised in hellos and granted to neighbors.
    pub fn hello_lifetime_ms(&self) -> u64 {
        self.allowed_hello_loss() as u64 * self.hello_interval_ms()
    }

    /// Merge another AODV config into this one. Fields set in `other` win.
    pub fn merge(&mut self, other: AodvConfig) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field;
                    }
                )*
            };
        }
        take!(
            rreq_retries,
            ttl_start,
            ttl_increment,
            ttl_threshold,
            timeout_buffer,
            rreq_rate_limit,
            rerr_rate_limit,
            node_traversal_time_ms,
            net_diameter,
            active_route_timeout_ms,
            hello_interval_ms,
            allowed_hello_loss,
            max_queue_len,
            max_queue_time_ms,
            destination_only,
            gratuitous_reply,
            enable_hello,
            enable_broadcast,
            maintenance_interval_ms,
            net_traversal_time_ms,
            path_discovery_time_ms,
            my_route_timeout_ms,
            blacklist_timeout_ms,
            next_hop_wait_ms,
            delete_period_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_defaults() {
        let c = AodvConfig::default();
        assert_eq!(c.net_traversal_time_ms(), 2800);
        assert_eq!(c.path_discovery_time_ms(), 5600);
        assert_eq!(c.my_route_timeout_ms(), 11_200);
        assert_eq!(c.blacklist_timeout_ms(), 5600);
        assert_eq!(c.next_hop_wait_ms(), 50);
        assert_eq!(c.delete_period_ms(), 15_000);
        assert_eq!(c.hello_lifetime_ms(), 2000);
    }

    #[test]
    fn test_derived_overrides() {
        let c = AodvConfig {
            net_traversal_time_ms: Some(1000),
            delete_period_ms: Some(42),
            ..AodvConfig::default()
        };
        assert_eq!(c.net_traversal_time_ms(), 1000);
        assert_eq!(c.path_discovery_time_ms(), 2000);
        assert_eq!(c.blacklist_timeout_ms(), 2000);
        assert_eq!(c.delete_period_ms(), 42);
    }

    #[test]
    fn test_merge_takes_set_fields() {
        let mut base = AodvConfig {
            ttl_start: Some(3),
            enable_hello: Some(false),
            ..AodvConfig::default()
        };
        let other = AodvConfig {
            net_diameter: Some(10),
            ..AodvConfig::default()
        };
        base.merge(other);
        assert_eq!(base.ttl_start(), 3);
        assert!(!base.enable_hello());
        assert_eq!(base.net_diameter(), 10);
    }

    #[test]
    fn test_merge_restores_default_value() {
        let mut base = AodvConfig {
            enable_hello: Some(false),
            ttl_start: Some(5),
            ..AodvConfig::default()
        };
        base.merge(AodvConfig {
            enable_hello: Some(true),
            ttl_start: Some(1),
            ..AodvConfig::default()
        });
        assert!(base.enable_hello());
        assert_eq!(base.ttl_start(), 1);
    }
}
