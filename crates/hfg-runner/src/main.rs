//! # hfg-runner
//!
//! Orchestrator for the HFT gateway. Wires together the packet-forwarding
//! dataplane, the venue market-data connections, the order-book engine, and
//! the UDP feed publisher, then supervises them until SIGINT/SIGTERM.
//!
//! Startup order: configuration (fatal on missing credentials), logging,
//! packet pool + HFT ring, ports, forwarding worker, UDP publisher, venue
//! connections, subscriptions, non-blocking connects, poll loop.
//!
//! # Usage
//!
//! ```bash
//! hfg-runner --log-level info --worker-core 2
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use hfg_core::{config::AppConfig, log_system, logging, types::Venue, udp::UdpPublisher};
use hfg_dataplane::{
    ChannelPort, ForwardingEngine, HFT_RING_CAPACITY, PacketHandle, PacketPool, ring,
};
use hfg_md::{books::OrderBookManager, bybit::BybitAdapter, connection::VenueConnection, okx::OkxAdapter};
use tracing::{error, info, warn};

/// Packet buffers in the pool.
const NUM_PKT_BUFS: usize = 16_384;

/// Per-buffer size in bytes.
const PKT_BUF_SIZE: usize = 2048;

/// Caller-driven client-ping cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// HFT Gateway — packet forwarding + market data runner.
#[derive(Parser)]
#[command(name = "hfg-runner", about = "HFT gateway: packet forwarding and market data runner")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for rotating diagnostic output.
    #[arg(long)]
    log_dir: Option<String>,

    /// CPU core for the forwarding worker.
    #[arg(long)]
    worker_core: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Configuration — fatal before anything else is touched.
    let config = Arc::new(AppConfig::from_env().context("configuration failed")?);

    // 2. Logging.
    logging::init_tracing(&cli.log_level, cli.log_dir.as_deref());
    logging::init_sinks(&config.log);
    info!("hfg-runner starting");
    log_system!("gateway launching");

    // 3. Packet pool and fast-path ring.
    let pool = PacketPool::new(NUM_PKT_BUFS, PKT_BUF_SIZE).context("packet pool creation failed")?;
    let (ring_tx, ring_rx) = ring::<PacketHandle, HFT_RING_CAPACITY>();
    info!("packet pool ({NUM_PKT_BUFS} bufs) and HFT ring ({HFT_RING_CAPACITY}) created");

    // 4. Ports. The deployment layer owns the NIC binding; the peer handles
    //    are its wire side and stay alive for the process lifetime.
    let (phy_port, _phy_wire) = ChannelPort::new("phy");
    let (virt_port, _virt_wire) = ChannelPort::new("virt");

    // 5. Forwarding worker on its own pinned thread.
    let stop = Arc::new(AtomicBool::new(false));
    let engine = ForwardingEngine::new(
        Arc::new(phy_port),
        Arc::new(virt_port),
        ring_tx,
        pool.clone(),
        stop.clone(),
        cli.worker_core,
    );
    let counters = engine.counters();
    let forward_worker = std::thread::Builder::new()
        .name("forward".into())
        .spawn(move || engine.run())
        .context("failed to spawn forwarding worker")?;

    // Downstream fast-path consumer: releases each duplicate after
    // processing. Strategy consumption is out of scope; this drains the
    // ring and accounts for it.
    let fast_path_packets = Arc::new(AtomicU64::new(0));
    let consumer_count = fast_path_packets.clone();
    let consumer_stop = stop.clone();
    let ring_consumer = std::thread::Builder::new()
        .name("hft-consumer".into())
        .spawn(move || {
            while !consumer_stop.load(Ordering::Relaxed) {
                match ring_rx.try_pop() {
                    Some(pkt) => {
                        consumer_count.fetch_add(1, Ordering::Relaxed);
                        drop(pkt);
                    }
                    None => std::hint::spin_loop(),
                }
            }
        })
        .context("failed to spawn ring consumer")?;

    // 6. UDP feed publisher — shared read-only across connections.
    let udp = if config.udp_feed.enabled {
        match UdpPublisher::open(&config.udp_feed.address, config.udp_feed.port) {
            Ok(publisher) => {
                log_system!(
                    "udp feed on {}:{}",
                    config.udp_feed.address,
                    config.udp_feed.port
                );
                Some(Arc::new(publisher))
            }
            Err(e) => {
                warn!("UDP feed disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    // 7. Venue connections.
    let books = Arc::new(OrderBookManager::new());

    let mut okx = VenueConnection::new(Arc::new(OkxAdapter), config.retry.clone(), udp.clone());
    okx.set_debug_log(config.debug_log_enabled);
    okx.subscribe(&config.okx_symbols, "books5");

    let mut bybit = VenueConnection::new(Arc::new(BybitAdapter), config.retry.clone(), udp.clone());
    bybit.set_debug_log(config.debug_log_enabled);
    bybit.subscribe(&config.bybit_symbols, "orderbook.50");

    okx.connect()?;
    bybit.connect()?;

    // 8. Supervise until a signal arrives.
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    let mut poll_tick = tokio::time::interval(Duration::from_millis(10));
    let mut heartbeat_tick = tokio::time::interval(HEARTBEAT_INTERVAL);

    info!("gateway running, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("SIGINT received, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = heartbeat_tick.tick() => {
                okx.send_heartbeat();
                bybit.send_heartbeat();
            }
            _ = poll_tick.tick() => {
                okx.poll(|book| { books.apply(Venue::Okx, book); });
                bybit.poll(|book| { books.apply(Venue::Bybit, book); });
            }
        }
    }

    // 9. Graceful drain: stop the dataplane, close the sessions, flush.
    log_system!("gateway stopping");
    stop.store(true, Ordering::Relaxed);

    okx.close().await;
    bybit.close().await;

    if forward_worker.join().is_err() {
        error!("forwarding worker panicked");
    }
    if ring_consumer.join().is_err() {
        error!("ring consumer panicked");
    }

    let stats = counters.snapshot();
    info!(
        "final stats rx_phy={} tx_virt={} rx_virt={} tx_phy={} pool_exhausted={} fast_path={} books={} pool_free={}",
        stats.rx_phy,
        stats.tx_virt,
        stats.rx_virt,
        stats.tx_phy,
        stats.pool_exhausted,
        fast_path_packets.load(Ordering::Relaxed),
        books.instrument_count(),
        pool.available(),
    );
    log_system!("gateway stopped");
    logging::shutdown_sinks();

    Ok(())
}
