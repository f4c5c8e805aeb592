//! UDP Transport Implementation
//!
//! Carries AODV and CPDA control messages over a single UDP socket bound
//! to the control port. Broadcasts go to the configured broadcast address;
//! unicasts go to the neighbor's address on the same port.
//!
//! [`Transport::send`] is synchronous, so it only queues the datagram. A
//! spawned send task drains the queue with `send_to(..).await` and reports
//! unicast send errors on the optional link failure channel.

use super::{
    InboundDatagram, InboundTx, Interface, InterfaceId, LinkFailureTx, OutboundDatagram,
    Transport, TransportError,
};
use crate::config::TransportConfig;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Datagrams queued between `send` and the send task.
const SEND_QUEUE_LEN: usize = 1024;

/// A datagram waiting for the send task.
#[derive(Debug)]
struct QueuedSend {
    target: SocketAddrV4,
    ttl: u8,
    payload: Vec<u8>,
}

/// UDP control transport.
///
/// The socket is shared with a spawned receive loop that feeds
/// [`InboundDatagram`]s into the node's inbound channel, and with a send
/// loop fed by [`Transport::send`]. Sends never block: a full send queue
/// is reported as [`TransportError::QueueFull`].
pub struct UdpTransport {
    /// Configuration.
    config: TransportConfig,
    /// The single interface this socket serves.
    interface_id: InterfaceId,
    /// Port neighbors listen on.
    peer_port: u16,
    /// Bound socket (None until started).
    socket: Option<Arc<UdpSocket>>,
    /// Channel for delivering received datagrams to the node.
    inbound_tx: InboundTx,
    /// Where unicast send errors are reported, if anyone listens.
    link_failure_tx: Option<LinkFailureTx>,
    /// Queue drained by the send task (None until started).
    outbound_tx: Option<mpsc::Sender<QueuedSend>>,
    /// Receive loop task handle.
    recv_task: Option<JoinHandle<()>>,
    /// Send loop task handle.
    send_task: Option<JoinHandle<()>>,
    /// Local bound address (after start).
    local_addr: Option<SocketAddr>,
}

impl UdpTransport {
    /// Create a new UDP transport.
    pub fn new(config: TransportConfig, inbound_tx: InboundTx) -> Self {
        let peer_port = config.port();
        Self {
            config,
            interface_id: InterfaceId(0),
            peer_port,
            socket: None,
            inbound_tx,
            link_failure_tx: None,
            outbound_tx: None,
            recv_task: None,
            send_task: None,
            local_addr: None,
        }
    }

    /// Send to `port` instead of the configured control port.
    ///
    /// Lets several nodes share one host, each bound to its own port.
    pub fn with_peer_port(mut self, port: u16) -> Self {
        self.peer_port = port;
        self
    }

    /// Report neighbors whose unicast send failed on `tx`.
    ///
    /// Send errors surface after [`Transport::send`] has returned, so the
    /// driver forwards them to [`Node::notify_link_failure`].
    ///
    /// [`Node::notify_link_failure`]: crate::Node::notify_link_failure
    pub fn with_link_failures(mut self, tx: LinkFailureTx) -> Self {
        self.link_failure_tx = Some(tx);
        self
    }

    /// Get the local bound address (only valid after start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_started(&self) -> bool {
        self.socket.is_some()
    }

    /// The routing interface served by this socket, if the configuration
    /// names a local address.
    pub fn interface(&self) -> Option<Interface> {
        let local = self.config.local_addr()?;
        Some(Interface::new(
            self.interface_id,
            local,
            self.config.broadcast_addr(),
        ))
    }

    /// Start the transport asynchronously.
    ///
    /// Binds the UDP socket, enables broadcast and spawns the receive and
    /// send loops.
    pub async fn start_async(&mut self) -> Result<(), TransportError> {
        if self.is_started() {
            return Err(TransportError::AlreadyStarted);
        }

        let bind_addr = SocketAddrV4::new(self.config.bind_addr(), self.config.port());
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::StartFailed(format!("bind {} failed: {}", bind_addr, e)))?;
        socket
            .set_broadcast(true)
            .map_err(|e| TransportError::StartFailed(format!("enable broadcast: {}", e)))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| TransportError::StartFailed(format!("get local addr: {}", e)))?;
        self.local_addr = Some(local_addr);

        let socket = Arc::new(socket);
        self.socket = Some(socket.clone());

        let interface_id = self.interface_id;
        let inbound_tx = self.inbound_tx.clone();
        let buf_size = self.config.recv_buf_size();
        let recv_socket = socket.clone();
        self.recv_task = Some(tokio::spawn(async move {
            udp_receive_loop(recv_socket, interface_id, local_addr, inbound_tx, buf_size).await;
        }));

        let (outbound_tx, outbound_rx) = mpsc::channel(SEND_QUEUE_LEN);
        self.outbound_tx = Some(outbound_tx);
        let broadcast = self.config.broadcast_addr();
        let link_failure_tx = self.link_failure_tx.clone();
        self.send_task = Some(tokio::spawn(async move {
            udp_send_loop(socket, outbound_rx, broadcast, link_failure_tx).await;
        }));

        info!(local_addr = %local_addr, peer_port = self.peer_port, "UDP transport started");
        Ok(())
    }

    /// Stop the transport asynchronously.
    ///
    /// Datagrams still queued for the send task are dropped.
    pub async fn stop_async(&mut self) -> Result<(), TransportError> {
        if !self.is_started() {
            return Err(TransportError::NotStarted);
        }

        self.outbound_tx.take();
        for task in [self.recv_task.take(), self.send_task.take()].into_iter().flatten() {
            task.abort();
            let _ = task.await; // Ignore JoinError from abort
        }

        self.socket.take();
        self.local_addr = None;

        debug!("UDP transport stopped");
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: OutboundDatagram) -> Result<(), TransportError> {
        if datagram.interface != self.interface_id {
            return Err(TransportError::UnknownInterface(datagram.interface));
        }
        let outbound_tx = self.outbound_tx.as_ref().ok_or(TransportError::NotStarted)?;

        let destination = datagram.destination;
        let queued = QueuedSend {
            target: SocketAddrV4::new(destination, self.peer_port),
            ttl: datagram.ttl,
            payload: datagram.payload,
        };

        outbound_tx.try_send(queued).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull { destination },
            mpsc::error::TrySendError::Closed(_) => TransportError::NotStarted,
        })
    }
}

/// UDP send loop - runs as a spawned task.
///
/// The TTL is a socket option, so datagrams go out one at a time.
async fn udp_send_loop(
    socket: Arc<UdpSocket>,
    mut outbound_rx: mpsc::Receiver<QueuedSend>,
    broadcast: Ipv4Addr,
    link_failure_tx: Option<LinkFailureTx>,
) {
    debug!("UDP send loop starting");

    while let Some(queued) = outbound_rx.recv().await {
        if let Err(e) = socket.set_ttl(u32::from(queued.ttl)) {
            warn!(remote_addr = %queued.target, ttl = queued.ttl, error = %e, "Failed to set TTL");
            continue;
        }

        match socket.send_to(&queued.payload, queued.target).await {
            Ok(bytes) => {
                trace!(remote_addr = %queued.target, ttl = queued.ttl, bytes, "UDP datagram sent");
            }
            Err(e) => {
                warn!(remote_addr = %queued.target, error = %e, "UDP send failed");
                let neighbor = *queued.target.ip();
                if neighbor.is_broadcast() || neighbor == broadcast {
                    continue;
                }
                if let Some(tx) = &link_failure_tx {
                    // The driver may already be gone during shutdown
                    let _ = tx.send(neighbor);
                }
            }
        }
    }

    debug!("UDP send loop stopped");
}

/// UDP receive loop - runs as a spawned task.
///
/// Our own broadcasts come back to us; they are dropped here.
async fn udp_receive_loop(
    socket: Arc<UdpSocket>,
    interface_id: InterfaceId,
    local_addr: SocketAddr,
    inbound_tx: InboundTx,
    buf_size: usize,
) {
    let mut buf = vec![0u8; buf_size];

    debug!(iface = %interface_id, "UDP receive loop starting");

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, remote_addr)) => {
                if remote_addr == local_addr {
                    continue;
                }
                let SocketAddr::V4(remote) = remote_addr else {
                    debug!(remote_addr = %remote_addr, "Ignoring non-IPv4 datagram");
                    continue;
                };

                trace!(remote_addr = %remote_addr, bytes = len, "UDP datagram received");

                let datagram = InboundDatagram {
                    interface: interface_id,
                    sender: *remote.ip(),
                    ttl: None,
                    payload: buf[..len].to_vec(),
                };
                if inbound_tx.send(datagram).await.is_err() {
                    info!("Inbound channel closed, stopping receive loop");
                    break;
                }
            }
            Err(e) => {
                // Transient errors (e.g. ICMP port unreachable) are expected
                warn!(error = %e, "UDP receive error");
            }
        }
    }

    debug!(iface = %interface_id, "UDP receive loop stopped");
}

// ============================================================================
// Tests
// ============================================================================
