//! The OGM engine. The [`Router`] periodically broadcasts our own originator
//! messages, screens and ranks received ones, maintains the bidirectional
//! link state of direct neighbours and decides which messages get
//! rebroadcast. It also answers next hop queries from the data plane.
//!
//! All handlers run to completion on a single thread and never block: sends
//! go to the substrate's outbound queue, and everything timer driven
//! (emission, purge, staggered rebroadcasts) is scheduled as a [`Timer`]
//! event which the host delivers back.

use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, trace};

use crate::{
    address::Address,
    broadcast_log::BroadcastLog,
    metrics::Metrics,
    packet::{OriginatorMessage, Packet},
    routing_table::{LinkState, RoutingTable},
    sequence_number::SeqNo,
    substrate::{Substrate, Timer},
    time::Timestamp,
    Config, ConfigError,
};

/// How many emission intervals an echo may lag behind our latest emitted
/// message before the link is no longer considered bidirectional.
const BI_LINK_TIMEOUT_FACTOR: u32 = 3;

/// Upper bound on the random delay applied to rebroadcasts, staggering
/// neighbours which relay the same message.
const BROADCAST_DELAY_MAX: Duration = Duration::from_millis(100);

/// A B.A.T.M.A.N. routing agent instance.
pub struct Router<S, M> {
    config: Config,
    substrate: S,
    metrics: M,
    table: RoutingTable,
    broadcast_log: BroadcastLog,
    /// Sequence number used for the next emission.
    seqno: SeqNo,
    /// Sequence number of the most recent emission, the reference point for
    /// echo freshness. Unset until the first emission.
    latest_emitted: Option<SeqNo>,
    running: bool,
}

impl<S, M> Router<S, M>
where
    S: Substrate,
    M: Metrics,
{
    /// Create a new `Router` from the given config and host bindings. Fails
    /// if the config doesn't validate.
    pub fn new(config: Config, substrate: S, metrics: M) -> Result<Self, ConfigError> {
        config.validate()?;

        let bi_link_timeout = config.ogm_interval * BI_LINK_TIMEOUT_FACTOR;
        let table = RoutingTable::new(
            config.address,
            config.purge_timeout,
            bi_link_timeout,
            config.ogm_interval,
        );
        let broadcast_log = BroadcastLog::new(config.purge_timeout);

        Ok(Router {
            config,
            substrate,
            metrics,
            table,
            broadcast_log,
            seqno: SeqNo::new(),
            latest_emitted: None,
            running: false,
        })
    }

    /// Start the agent: arms the emission and purge timers. Does nothing if
    /// the agent is already running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!(address = %self.config.address, "Starting routing agent");

        let delay = self.jittered_interval();
        self.substrate.schedule_after(delay, Timer::Originator);
        self.substrate
            .schedule_after(self.config.purge_interval, Timer::Purge);
    }

    /// Stop the agent. Pending timers and datagrams delivered afterwards are
    /// ignored.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        info!(address = %self.config.address, "Stopping routing agent");
    }

    /// Checks if the agent is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The main address of this node.
    pub fn address(&self) -> Address {
        self.config.address
    }

    /// Read access to the routing table.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Sink for inbound datagrams on the control port. `src` is the IP source
    /// address of the datagram, i.e. the one hop relayer.
    pub fn handle_datagram(&mut self, src: Address, payload: &[u8]) {
        if !self.running {
            return;
        }
        let mut buf = BytesMut::from(payload);
        match Packet::from_bytes(&mut buf) {
            Ok(packet) => self.handle_packet(src, packet),
            Err(e) => {
                self.metrics.ogm_invalid();
                trace!(error = %e, "Dropping undecodable datagram");
            }
        }
    }

    /// Process a decoded control packet received from `relayer`.
    pub fn handle_packet(&mut self, relayer: Address, mut packet: Packet) {
        if !self.running {
            return;
        }
        self.metrics.ogm_received();
        let now = self.substrate.now();

        // Preliminary checks. Our own transmissions loop back on some
        // interfaces, and misconfigured nodes have been observed sourcing
        // datagrams from the broadcast address.
        if relayer == self.config.address {
            self.metrics.ogm_self_loop();
            return;
        }
        if relayer.is_broadcast() {
            self.metrics.ogm_broadcast_source();
            trace!("Dropping datagram sourced from the broadcast address");
            return;
        }

        let ogm = packet.ogm;
        if ogm.originator() == self.config.address {
            // One of our own messages came back. If the neighbour rebroadcast
            // it as a direct link message it proves the link carries traffic
            // both ways, even when the neighbour marked it unidirectional.
            if ogm.is_directlink() {
                self.metrics.ogm_own_echo();
                trace!(neighbour = %relayer, seqno = %ogm.seqno(), "Observed own message echoed back");
                self.table.record_bidir_seqno(relayer, ogm.seqno(), now);
            }
            return;
        }

        if ogm.is_unidirectional() {
            // A previous hop flagged this message as having crossed a link
            // that is not bidirectional. It only carries meaning for its
            // originator.
            self.metrics.ogm_unidirectional_flag();
            return;
        }

        let originator = ogm.originator();
        let seqno = ogm.seqno();

        if self.broadcast_log.is_duplicate(originator, seqno, now) {
            // Already processed, but a copy arriving through the best link
            // may still need to be pushed on.
            if self.should_forward(relayer, &ogm, true) {
                self.metrics.ogm_duplicate(true);
                self.forward(relayer, packet);
            } else {
                self.metrics.ogm_duplicate(false);
                trace!(originator = %originator, seqno = %seqno, "Dropping duplicate message");
            }
            return;
        }
        self.broadcast_log.record(originator, seqno, now);

        if !self.link_bidirectional(relayer, now) {
            self.metrics.link_unidirectional();
            debug!(
                neighbour = %relayer,
                originator = %originator,
                "Link not known to be bidirectional, not ranking"
            );
            if relayer == originator {
                // Echo the message back marked as unidirectional. Nobody will
                // rank it, but it is the only way the originator can learn
                // that we hear it.
                packet.ogm.set_unidirectional();
                self.forward(relayer, packet);
            }
            return;
        }

        let best_changed =
            self.table
                .update_neighbour_ranking(originator, relayer, seqno, ogm.ttl(), now);
        self.metrics.ogm_ranked();
        if best_changed {
            self.metrics.best_next_hop_changed();
        }

        if ogm.gw_flags() != 0 {
            self.table
                .update_gateway(originator, ogm.gw_flags(), ogm.gw_port());
        }
        if !packet.hna.is_empty() {
            self.table.clear_hna(originator);
            for hna in &packet.hna {
                self.table.add_hna(originator, *hna);
            }
        }

        if self.should_forward(relayer, &ogm, false) {
            self.forward(relayer, packet);
        }
    }

    /// Deliver a due timer event.
    pub fn handle_timer(&mut self, timer: Timer) {
        if !self.running {
            return;
        }
        match timer {
            Timer::Originator => {
                self.emit_ogm();
                let delay = self.jittered_interval();
                self.substrate.schedule_after(delay, Timer::Originator);
            }
            Timer::Purge => {
                self.purge();
                self.substrate
                    .schedule_after(self.config.purge_interval, Timer::Purge);
            }
            Timer::DelayedBroadcast(payload) => self.substrate.broadcast(payload),
        }
    }

    /// Resolve the next hop towards `dest`. Consulted by the IP forwarding
    /// layer for every data packet, never mutates ranking state.
    pub fn next_hop(&self, dest: Address) -> Option<Address> {
        let next_hop = self.table.lookup(dest);
        self.metrics.route_lookup(next_hop.is_some());
        if next_hop.is_none() {
            trace!(dest = %dest, "No route towards destination");
        }
        next_hop
    }

    /// The most attractive reachable gateway, if any.
    pub fn best_gateway(&self) -> Option<Address> {
        self.table.best_gateway()
    }

    /// Current reachability classification of a direct neighbour.
    pub fn neighbour_link_state(&self, neighbour: Address) -> LinkState {
        match self.latest_emitted {
            None => LinkState::Unknown,
            Some(latest) => self
                .table
                .link_state(neighbour, latest, self.substrate.now()),
        }
    }

    /// Broadcast our own originator message and advance the local sequence
    /// number.
    fn emit_ogm(&mut self) {
        let seqno = self.seqno;
        let mut ogm = OriginatorMessage::new(self.config.address, seqno, self.config.ttl);
        if self.config.gw_flags != 0 {
            ogm = ogm.with_gateway(self.config.gw_flags, self.config.gw_port);
        }
        let packet = Packet::with_hna(ogm, self.config.announced_networks.clone());

        self.substrate.broadcast(packet.to_vec());
        self.latest_emitted = Some(seqno);
        self.seqno += 1;
        self.metrics.ogm_emitted();
        trace!(seqno = %seqno, "Broadcast own originator message");
    }

    /// Decide whether a message received from `relayer` gets rebroadcast: a
    /// direct link message from its originator always does, everything else
    /// only when it came in through the currently selected next hop and is
    /// either new or repeats the TTL we last recorded from that relayer.
    fn should_forward(&self, relayer: Address, ogm: &OriginatorMessage, duplicate: bool) -> bool {
        if relayer == ogm.originator() && ogm.is_directlink() {
            return true;
        }

        let Some(entry) = self.table.get(&ogm.originator()) else {
            return false;
        };
        if entry.best_next_hop() != relayer {
            return false;
        }
        if !duplicate {
            return true;
        }
        entry
            .neighbour(&relayer)
            .map(|info| info.last_ttl() == ogm.ttl())
            .unwrap_or(false)
    }

    /// Queue `packet` for rebroadcast after a random stagger delay. The
    /// payload is serialized now, later table changes don't affect it.
    fn forward(&mut self, relayer: Address, mut packet: Packet) {
        let ttl = packet.ogm.ttl();
        if ttl <= 1 {
            self.metrics.ogm_ttl_exhausted();
            trace!(
                originator = %packet.ogm.originator(),
                "Dropping message with exhausted TTL"
            );
            return;
        }
        packet.ogm.set_ttl(ttl - 1);

        // We are the first hop exactly if the originator itself handed us the
        // message.
        if relayer == packet.ogm.originator() {
            packet.ogm.set_directlink();
        } else {
            packet.ogm.clear_directlink();
        }

        let delay = self
            .substrate
            .random_uniform(0.0, BROADCAST_DELAY_MAX.as_secs_f64());
        let payload = packet.to_vec();
        self.metrics.ogm_forwarded();
        trace!(
            originator = %packet.ogm.originator(),
            seqno = %packet.ogm.seqno(),
            "Scheduling rebroadcast"
        );
        self.substrate
            .schedule_after(Duration::from_secs_f64(delay), Timer::DelayedBroadcast(payload));
    }

    fn purge(&mut self) {
        let now = self.substrate.now();
        let (originators, neighbours) = self.table.purge(now);
        self.broadcast_log.purge(now);

        if originators > 0 {
            self.metrics.originators_purged(originators);
        }
        if neighbours > 0 {
            self.metrics.neighbours_purged(neighbours);
        }
        debug!(
            originators_dropped = originators,
            neighbours_dropped = neighbours,
            "Ran periodic purge"
        );
    }

    /// Checks if the link to `neighbour` recently carried traffic both ways.
    fn link_bidirectional(&self, neighbour: Address, now: Timestamp) -> bool {
        let Some(latest) = self.latest_emitted else {
            // We never transmitted, so nothing can have echoed us.
            return false;
        };
        self.table.check_bidirectional(neighbour, latest, now)
    }

    /// The emission period with jitter applied, drawn fresh for every
    /// emission.
    fn jittered_interval(&mut self) -> Duration {
        let base = self.config.ogm_interval.as_secs_f64();
        let half_jitter = self.config.ogm_interval_jitter.as_secs_f64() / 2.0;
        let jitter = self.substrate.random_uniform(-half_jitter, half_jitter);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}
