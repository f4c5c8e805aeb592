//! Inbound control datagram dispatch.

use super::Received;
use crate::node::Node;
use crate::protocol::Message;
use crate::timer::Scheduler;
use crate::transport::{InboundDatagram, Transport};
use tracing::{debug, trace};

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Process one inbound control datagram.
    ///
    /// Processing steps:
    /// 1. Drop datagrams we sent ourselves or that arrived on an unknown
    ///    interface
    /// 2. Decode the type tag and message body
    /// 3. Install or refresh the one-hop route to the sender
    /// 4. Hand the message to its handler
    /// 5. Handle any link failures the handler ran into
    pub fn receive(&mut self, datagram: InboundDatagram) {
        if !self.is_running() {
            trace!(from = %datagram.sender, "Node not running, dropping datagram");
            return;
        }

        let InboundDatagram {
            interface,
            sender,
            ttl,
            payload,
        } = datagram;

        if self.is_local_address(&sender) {
            trace!(from = %sender, "Ignoring our own datagram");
            return;
        }
        if !self.interfaces.contains_key(&interface) {
            debug!(from = %sender, iface = %interface, "Datagram on unknown interface");
            return;
        }

        let msg = match Message::decode(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(from = %sender, len = payload.len(), error = %e, "Malformed control message");
                trace!(from = %sender, payload = %hex::encode(&payload), "Undecodable payload");
                return;
            }
        };

        trace!(from = %sender, iface = %interface, msg_type = %msg.message_type(), "Received control message");

        self.update_route_to_neighbor(sender, interface);

        let rx = Received {
            interface,
            sender,
            ttl,
        };
        match msg {
            Message::RouteRequest(rreq) => self.handle_route_request(rx, rreq),
            Message::RouteReply(rrep) => self.handle_route_reply(rx, rrep),
            Message::RouteError(rerr) => self.handle_route_error(rx, rerr),
            Message::RouteReplyAck(_) => self.handle_route_reply_ack(rx),
            Message::CpdaKey(key) => self.handle_cpda_key(rx, key),
            Message::CpdaQuery(query) => self.handle_cpda_query(rx, query),
            Message::CpdaJoin(join) => self.handle_cpda_join(rx, join),
        }

        self.drain_link_failures();
    }
}
