use std::error::Error;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

use batman::packet::{Codec, HnaAnnouncement, BATMAN_PORT};
use batman::{Address, Config, NoMetrics, Router, Substrate, Timer, Timestamp};
use clap::Parser;
use futures::StreamExt;
use log::{error, info, warn, LevelFilter};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::udp::UdpFramed;

/// The default interval between routing table dumps to the log.
const DEFAULT_DUMP_INTERVAL_SECS: u64 = 60;

/// Ceiling for the purge timer period. For small purge timeouts the timer
/// simply follows the timeout.
const MAX_PURGE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Main address of this node on the mesh.
    #[arg(short = 'a', long = "address")]
    address: Ipv4Addr,

    /// UDP port to exchange originator messages on.
    #[arg(long = "port", default_value_t = BATMAN_PORT)]
    port: u16,

    /// Base period between emitted originator messages, in milliseconds.
    #[arg(long = "interval-ms", default_value_t = 1_000)]
    interval_ms: u64,

    /// Total width of the emission jitter window, in milliseconds.
    #[arg(long = "jitter-ms", default_value_t = 200)]
    jitter_ms: u64,

    /// TTL on emitted originator messages.
    #[arg(long = "ttl", default_value_t = 64)]
    ttl: u8,

    /// Forget originators and neighbours silent for this long, in seconds.
    #[arg(long = "purge-timeout-secs", default_value_t = 1_280)]
    purge_timeout_secs: u64,

    /// Gateway class to advertise, 0 disables gateway mode.
    #[arg(long = "gw-flags", default_value_t = 0)]
    gw_flags: u8,

    /// Gateway tunnel port to advertise alongside the gateway class.
    #[arg(long = "gw-port", default_value_t = 0)]
    gw_port: u16,

    /// Attached network to announce in every originator message, as
    /// `network/prefixlen`. Can be repeated.
    #[arg(long = "announce")]
    announce: Vec<String>,

    /// Seconds between routing table dumps to the log.
    #[arg(long = "dump-interval-secs", default_value_t = DEFAULT_DUMP_INTERVAL_SECS)]
    dump_interval_secs: u64,

    /// Enable debug logging. Does nothing if `--silent` is set.
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,

    /// Disable all logs except error logs.
    #[arg(long = "silent", default_value_t = false)]
    silent: bool,
}

/// Substrate binding the agent to the tokio runtime. Broadcasts are queued on
/// a channel drained by the main loop, scheduled timers are sleeps feeding a
/// second channel into the same loop, so all agent state stays on one task.
struct DaemonSubstrate {
    epoch: Instant,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    timers: mpsc::UnboundedSender<Timer>,
    rng: SmallRng,
}

impl Substrate for DaemonSubstrate {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.epoch.elapsed().as_millis() as u64)
    }

    fn broadcast(&mut self, payload: Vec<u8>) {
        // The receiving half lives as long as the main loop, a send error
        // only happens during shutdown.
        let _ = self.outbound.send(payload);
    }

    fn schedule_after(&mut self, delay: Duration, timer: Timer) {
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timers.send(timer);
        });
    }

    fn random_uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            low
        } else {
            self.rng.gen_range(low..high)
        }
    }
}

fn parse_announcement(raw: &str) -> Result<HnaAnnouncement, String> {
    let (network, prefix_len) = raw
        .split_once('/')
        .ok_or_else(|| format!("`{raw}` is not of the form network/prefixlen"))?;
    let network: Ipv4Addr = network
        .parse()
        .map_err(|e| format!("invalid network in `{raw}`: {e}"))?;
    let prefix_len: u8 = prefix_len
        .parse()
        .map_err(|e| format!("invalid prefix length in `{raw}`: {e}"))?;
    HnaAnnouncement::new(network.into(), prefix_len).map_err(|e| format!("`{raw}`: {e}"))
}

fn dump_routes(router: &Router<DaemonSubstrate, NoMetrics>) {
    if router.table().is_empty() {
        info!("Routing table: no known originators");
        return;
    }

    let mut rows: Vec<_> = router.table().iter().collect();
    rows.sort_by_key(|(originator, _)| **originator);

    info!("Routing table ({} originators):", rows.len());
    for (originator, entry) in rows {
        let next_hop = entry.best_next_hop();
        if next_hop.is_unspecified() {
            info!("  {originator}: no route");
            continue;
        }
        let tq = entry
            .neighbour(&next_hop)
            .map(|info| info.transmit_quality())
            .unwrap_or_default();
        info!(
            "  {originator} via {next_hop} count {} tq {tq}{}",
            entry.best_route_count(),
            if entry.is_gateway() { " gateway" } else { "" },
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.silent {
        LevelFilter::Error
    } else if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    pretty_env_logger::formatted_timed_builder()
        .filter_module("batman", level)
        .filter_module("batmand", level)
        .init();

    let mut config = Config::new(cli.address.into());
    config.ogm_interval = Duration::from_millis(cli.interval_ms);
    config.ogm_interval_jitter = Duration::from_millis(cli.jitter_ms);
    config.ttl = cli.ttl;
    config.purge_timeout = Duration::from_secs(cli.purge_timeout_secs);
    config.purge_interval = config.purge_timeout.min(MAX_PURGE_INTERVAL);
    config.gw_flags = cli.gw_flags;
    config.gw_port = cli.gw_port;
    for raw in &cli.announce {
        config.announced_networks.push(parse_announcement(raw)?);
    }

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cli.port)).await?;
    socket.set_broadcast(true)?;
    let socket = Arc::new(socket);
    let broadcast_target = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, cli.port));

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();
    let substrate = DaemonSubstrate {
        epoch: Instant::now(),
        outbound: outbound_tx,
        timers: timer_tx,
        rng: SmallRng::from_entropy(),
    };

    let mut router = Router::new(config, substrate, NoMetrics)?;
    router.start();
    info!(
        "Node {} exchanging originator messages on port {}",
        cli.address, cli.port
    );

    let mut frames = UdpFramed::new(socket.clone(), Codec::new());
    let mut dump_timer =
        tokio::time::interval(Duration::from_secs(cli.dump_interval_secs.max(1)));
    // The first interval tick completes immediately.
    dump_timer.tick().await;

    loop {
        tokio::select! {
            frame = frames.next() => {
                match frame {
                    Some(Ok((packet, peer))) => {
                        let SocketAddr::V4(peer) = peer else {
                            continue;
                        };
                        router.handle_packet(Address::from(*peer.ip()), packet);
                    }
                    Some(Err(e)) => warn!("Dropping undecodable datagram: {e}"),
                    None => break,
                }
            }
            Some(payload) = outbound_rx.recv() => {
                if let Err(e) = socket.send_to(&payload, broadcast_target).await {
                    error!("Failed to broadcast originator message: {e}");
                }
            }
            Some(timer) = timer_rx.recv() => {
                router.handle_timer(timer);
            }
            _ = dump_timer.tick() => {
                dump_routes(&router);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                router.stop();
                break;
            }
        }
    }

    Ok(())
}
