//! AODV-CPDA daemon binary
//!
//! Loads configuration, binds the UDP control transport and runs the
//! routing engine until interrupted.

use aodv_cpda::{Config, Node, TimerQueue, UdpTransport, inbound_channel, link_failure_channel};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, Interval};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Inbound datagrams buffered between the socket and the engine.
const INBOUND_BUFFER: usize = 1024;

/// How long to sleep when no timer is pending.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// AODV mesh routing daemon with CPDA clustering
#[derive(Parser, Debug)]
#[command(name = "aodvd", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Flood the CPDA cluster query from this node
    #[arg(long)]
    query_node: bool,

    /// Log the routing table every N seconds
    #[arg(long, value_name = "SECS")]
    print_routes_every: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("aodvd starting");

    // Load configuration
    let (mut config, loaded_paths) = if let Some(config_path) = &args.config {
        // Explicit config file specified - load only that file
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    if args.query_node {
        config.cpda.enable_query_node = Some(true);
    }

    // Bind the control socket
    let (inbound_tx, mut inbound_rx) = inbound_channel(INBOUND_BUFFER);
    let (link_failure_tx, mut link_failure_rx) = link_failure_channel();
    let mut transport =
        UdpTransport::new(config.transport.clone(), inbound_tx).with_link_failures(link_failure_tx);

    let Some(interface) = transport.interface() else {
        error!("No routing address: set transport.local_addr or a concrete transport.bind_addr");
        std::process::exit(1);
    };

    if let Err(e) = transport.start_async().await {
        error!("Failed to start transport: {}", e);
        std::process::exit(1);
    }

    // Create and start the node
    let mut node = match Node::new(config, transport, TimerQueue::new()) {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to create node: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = node.add_interface(interface) {
        error!("Failed to add interface: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = node.start() {
        error!("Failed to start node: {}", e);
        std::process::exit(1);
    }

    info!(
        address = %interface.local,
        broadcast = %interface.broadcast,
        query_node = node.config().cpda.enable_query_node(),
        "aodvd running, press Ctrl+C to exit"
    );

    let started = Instant::now();
    let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut route_printer = args
        .print_routes_every
        .filter(|&secs| secs > 0)
        .map(|secs| tokio::time::interval(Duration::from_secs(secs)));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        node.scheduler_mut().set_now(elapsed_ms());
        node.process_timers();

        let wake_at = node
            .next_deadline()
            .map(|deadline_ms| started + Duration::from_millis(deadline_ms))
            .unwrap_or_else(|| Instant::now() + IDLE_WAIT);

        tokio::select! {
            datagram = inbound_rx.recv() => {
                let Some(datagram) = datagram else {
                    warn!("Inbound channel closed");
                    break;
                };
                node.scheduler_mut().set_now(elapsed_ms());
                node.receive(datagram);
            }
            Some(neighbor) = link_failure_rx.recv() => {
                node.scheduler_mut().set_now(elapsed_ms());
                node.notify_link_failure(neighbor);
            }
            _ = tokio::time::sleep_until(wake_at) => {}
            _ = tick(&mut route_printer) => {
                info!("Routing table:\n{}", node.routing_table_dump());
            }
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
                break;
            }
        }
    }

    info!("aodvd shutting down");

    if let Err(e) = node.stop() {
        warn!("Error stopping node: {}", e);
    }
    if let Err(e) = node.transport_mut().stop_async().await {
        warn!("Error stopping transport: {}", e);
    }

    info!("aodvd shutdown complete");
}

/// Wait for the next route print, or forever when printing is off.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
