//! The routing table holds an [`OriginatorEntry`] for every known remote
//! originator, and ranks the neighbours relaying each originator's messages
//! by how many distinct sequence numbers they delivered within the sliding
//! window. Next hop selection is implicit in that ranking: the neighbour with
//! the highest packet count is the path.
//!
//! The table is a plain owning map-of-map. All mutation happens from the
//! single-threaded event handlers in the [`Router`](crate::router::Router),
//! data plane lookups go through [`RoutingTable::lookup`].

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace};

use crate::{
    address::Address, packet::HnaAnnouncement, sequence_number::SeqNo, time::Timestamp,
};

pub use neighbour::NeighbourInfo;
pub use originator::{GatewayInfo, OriginatorEntry};
pub use window::WINDOW_SIZE;

mod neighbour;
mod originator;
mod window;

/// Reachability of a direct neighbour, as determined by the echo test: a
/// neighbour is only considered bidirectional while we keep observing our own
/// messages echoed back by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// We never heard from this neighbour.
    Unknown,
    /// We hear the neighbour, but it shows no recent evidence of hearing us.
    Unidirectional,
    /// Both directions of the link recently carried traffic.
    Bidirectional,
}

/// The routing table of a node. Also owns the per-neighbour echo state used
/// by the bidirectional link test, since that state lives on the echoing
/// neighbour's own [`OriginatorEntry`].
pub struct RoutingTable {
    originators: HashMap<Address, OriginatorEntry>,
    /// Our own main address. No entry is ever created for it.
    local: Address,
    /// Entries and neighbours silent for longer than this are dropped on
    /// purge.
    purge_timeout: Duration,
    /// Maximum age of an echo for the bidirectional test.
    bi_link_timeout: Duration,
    /// Maximum distance between our latest emitted seqno and an echoed seqno
    /// for the echo to count as evidence.
    bi_link_seqno_range: u16,
}

impl RoutingTable {
    /// Create a new empty `RoutingTable` for a node with the given main
    /// address.
    pub fn new(
        local: Address,
        purge_timeout: Duration,
        bi_link_timeout: Duration,
        ogm_interval: Duration,
    ) -> Self {
        let bi_link_seqno_range =
            (bi_link_timeout.as_millis() / ogm_interval.as_millis().max(1)).max(1) as u16;
        Self {
            originators: HashMap::new(),
            local,
            purge_timeout,
            bi_link_timeout,
            bi_link_seqno_range,
        }
    }

    /// The entry for the given originator, if one exists.
    pub fn get(&self, originator: &Address) -> Option<&OriginatorEntry> {
        self.originators.get(originator)
    }

    /// Iterator over all known originators.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &OriginatorEntry)> {
        self.originators.iter()
    }

    /// Amount of known originators.
    pub fn len(&self) -> usize {
        self.originators.len()
    }

    /// Checks if no originator is known.
    pub fn is_empty(&self) -> bool {
        self.originators.is_empty()
    }

    /// Fold a ranked message into the table: refresh the originator and
    /// neighbour liveness, advance or fill the sliding windows, and re-run
    /// next hop selection. Returns whether the selected next hop for the
    /// originator changed.
    ///
    /// Messages whose sequence number falls behind the window are ignored.
    pub fn update_neighbour_ranking(
        &mut self,
        originator: Address,
        relayer: Address,
        seqno: SeqNo,
        ttl: u8,
        now: Timestamp,
    ) -> bool {
        if originator == self.local {
            // Our own messages are handled by the echo path and never enter
            // the table.
            return false;
        }

        let entry = self.originators.entry(originator).or_insert_with(|| {
            debug!(originator = %originator, "Tracking new originator");
            OriginatorEntry::new(now)
        });
        entry.set_last_aware(now);
        entry.neighbour_entry(relayer, now).refresh(ttl, now);

        match entry.curr_seqno() {
            Some(curr) if seqno.gt(&curr) => {
                // The originator moved on, slide every neighbour's window up
                // to the new head before recording the message.
                let steps = seqno.diff(&curr);
                for (_, info) in entry.neighbours_mut() {
                    info.window_mut().slide(steps);
                }
                entry.set_curr_seqno(seqno);
                entry.neighbour_entry(relayer, now).window_mut().insert(0);
            }
            Some(curr) => {
                let offset = curr.diff(&seqno);
                if offset >= WINDOW_SIZE {
                    trace!(
                        originator = %originator,
                        relayer = %relayer,
                        seqno = %seqno,
                        "Ignoring message behind the sliding window"
                    );
                    return false;
                }
                entry
                    .neighbour_entry(relayer, now)
                    .window_mut()
                    .insert(offset);
            }
            None => {
                // First ranked message from this originator.
                entry.set_curr_seqno(seqno);
                entry.neighbour_entry(relayer, now).window_mut().insert(0);
            }
        }

        let changed = entry.update_best_next_hop();
        if changed {
            debug!(
                originator = %originator,
                next_hop = %entry.best_next_hop(),
                packet_count = entry.best_route_count(),
                "Selected new best next hop"
            );
        }
        changed
    }

    /// Record that `neighbour` echoed one of our own messages back to us.
    /// This is the only evidence that the neighbour actually hears us, so it
    /// creates the entry if the neighbour isn't tracked yet.
    pub fn record_bidir_seqno(&mut self, neighbour: Address, seqno: SeqNo, now: Timestamp) {
        if neighbour == self.local {
            return;
        }
        let entry = self
            .originators
            .entry(neighbour)
            .or_insert_with(|| OriginatorEntry::new(now));
        entry.set_last_aware(now);
        entry.set_bidir_echo(seqno, now);
    }

    /// Checks if the link to `neighbour` is currently considered
    /// bidirectional: it must have echoed one of our recent messages, where
    /// recent means no further behind `latest_emitted` than the link timeout
    /// allows.
    pub fn check_bidirectional(
        &self,
        neighbour: Address,
        latest_emitted: SeqNo,
        now: Timestamp,
    ) -> bool {
        let Some(entry) = self.originators.get(&neighbour) else {
            return false;
        };
        let Some((echo_seqno, echo_time)) = entry.bidir_echo() else {
            return false;
        };
        if now.duration_since(echo_time) > self.bi_link_timeout {
            return false;
        }
        latest_emitted.diff(&echo_seqno) <= self.bi_link_seqno_range
    }

    /// Current reachability classification of a direct neighbour.
    pub fn link_state(
        &self,
        neighbour: Address,
        latest_emitted: SeqNo,
        now: Timestamp,
    ) -> LinkState {
        if !self.originators.contains_key(&neighbour) {
            LinkState::Unknown
        } else if self.check_bidirectional(neighbour, latest_emitted, now) {
            LinkState::Bidirectional
        } else {
            LinkState::Unidirectional
        }
    }

    /// Record a gateway advertisement for the given originator. Only tracked
    /// originators can advertise gateway service, the advertisement always
    /// arrives on a ranked message.
    pub fn update_gateway(&mut self, originator: Address, gw_flags: u8, gw_port: u16) {
        if let Some(entry) = self.originators.get_mut(&originator) {
            entry.set_gateway(GatewayInfo::new(gw_flags, gw_port));
        }
    }

    /// Add an announced network for the given originator, replacing an
    /// existing announcement for the same network address.
    pub fn add_hna(&mut self, originator: Address, hna: HnaAnnouncement) {
        if let Some(entry) = self.originators.get_mut(&originator) {
            entry.add_hna(hna);
        }
    }

    /// Drop all announced networks of the given originator.
    pub fn clear_hna(&mut self, originator: Address) {
        if let Some(entry) = self.originators.get_mut(&originator) {
            entry.clear_hna();
        }
    }

    /// Remove expired originators and neighbours, refreshing next hop
    /// selection of entries which lost neighbours. Returns the amount of
    /// originators and neighbours dropped.
    pub fn purge(&mut self, now: Timestamp) -> (usize, usize) {
        let mut originators_dropped = 0;
        let mut neighbours_dropped = 0;

        self.originators.retain(|originator, entry| {
            if now.duration_since(entry.last_aware()) > self.purge_timeout {
                debug!(originator = %originator, "Purging expired originator");
                originators_dropped += 1;
                return false;
            }

            let removed = entry.purge_neighbours(now, self.purge_timeout);
            if removed > 0 {
                neighbours_dropped += removed;
                entry.update_best_next_hop();
            }
            true
        });

        (originators_dropped, neighbours_dropped)
    }

    /// Resolve the next hop towards `dest`: a direct originator entry wins,
    /// otherwise the longest matching announced network of any reachable
    /// originator is used. Ties between equally long prefixes go to the lower
    /// originator address.
    pub fn lookup(&self, dest: Address) -> Option<Address> {
        if let Some(entry) = self.originators.get(&dest) {
            if !entry.best_next_hop().is_unspecified() {
                return Some(entry.best_next_hop());
            }
        }

        let mut candidate: Option<(u8, Address, Address)> = None;
        for (originator, entry) in &self.originators {
            if entry.best_next_hop().is_unspecified() {
                continue;
            }
            for hna in entry.hna() {
                if !hna.contains(dest) {
                    continue;
                }
                let better = match candidate {
                    None => true,
                    Some((prefix_len, candidate_orig, _)) => {
                        hna.prefix_len() > prefix_len
                            || (hna.prefix_len() == prefix_len && *originator < candidate_orig)
                    }
                };
                if better {
                    candidate = Some((hna.prefix_len(), *originator, entry.best_next_hop()));
                }
            }
        }

        candidate.map(|(_, _, next_hop)| next_hop)
    }

    /// Select the most attractive reachable gateway: the originator
    /// maximizing packet count times gateway class. Ties go to the lower
    /// originator address.
    pub fn best_gateway(&self) -> Option<Address> {
        let mut best: Option<(u32, Address)> = None;
        for (originator, entry) in &self.originators {
            if !entry.is_gateway() || entry.best_next_hop().is_unspecified() {
                continue;
            }
            let gw_flags = entry.gateway().map(|gw| gw.flags()).unwrap_or_default();
            let score = entry.best_route_count() * u32::from(gw_flags);
            let better = match best {
                None => true,
                Some((best_score, best_orig)) => {
                    score > best_score || (score == best_score && *originator < best_orig)
                }
            };
            if better {
                best = Some((score, *originator));
            }
        }
        best.map(|(_, originator)| originator)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{address::Address, packet::HnaAnnouncement, sequence_number::SeqNo, time::Timestamp};

    use super::{LinkState, RoutingTable, WINDOW_SIZE};

    const PURGE_TIMEOUT: Duration = Duration::from_secs(1280);
    const BI_LINK_TIMEOUT: Duration = Duration::from_secs(3);
    const OGM_INTERVAL: Duration = Duration::from_secs(1);

    const LOCAL: Address = Address::new(0x0a000063);
    const ORIG: Address = Address::new(0x0a000001);
    const R1: Address = Address::new(0x0a000010);
    const R2: Address = Address::new(0x0a000020);

    fn table() -> RoutingTable {
        RoutingTable::new(LOCAL, PURGE_TIMEOUT, BI_LINK_TIMEOUT, OGM_INTERVAL)
    }

    #[test]
    fn ranking_counts_distinct_seqnos() {
        let mut table = table();

        for s in 0..10u16 {
            let now = Timestamp::from_secs(u64::from(s));
            table.update_neighbour_ranking(ORIG, R1, s.into(), 50, now);
        }

        let entry = table.get(&ORIG).expect("originator is tracked");
        assert_eq!(entry.curr_seqno(), Some(9.into()));
        assert_eq!(entry.neighbour(&R1).unwrap().packet_count(), 10);
        assert_eq!(entry.best_next_hop(), R1);
        assert_eq!(entry.best_route_count(), 10);
    }

    #[test]
    fn ranking_is_idempotent_per_seqno() {
        let mut table = table();
        let now = Timestamp::ZERO;

        table.update_neighbour_ranking(ORIG, R1, 7.into(), 50, now);
        table.update_neighbour_ranking(ORIG, R1, 7.into(), 50, now);

        let entry = table.get(&ORIG).unwrap();
        assert_eq!(entry.neighbour(&R1).unwrap().packet_count(), 1);
    }

    #[test]
    fn ranking_never_tracks_the_local_address() {
        let mut table = table();
        table.update_neighbour_ranking(LOCAL, R1, 1.into(), 50, Timestamp::ZERO);
        assert!(table.is_empty());
    }

    #[test]
    fn in_window_seqno_is_ranked_out_of_order() {
        let mut table = table();
        let now = Timestamp::ZERO;

        table.update_neighbour_ranking(ORIG, R1, 10.into(), 50, now);
        // Seqno 8 arrives late through another relayer and still counts.
        table.update_neighbour_ranking(ORIG, R2, 8.into(), 50, now);

        let entry = table.get(&ORIG).unwrap();
        assert_eq!(entry.curr_seqno(), Some(10.into()));
        assert_eq!(entry.neighbour(&R2).unwrap().packet_count(), 1);
        assert_eq!(entry.best_next_hop(), R1);
    }

    #[test]
    fn seqno_behind_window_is_ignored() {
        let mut table = table();
        let now = Timestamp::ZERO;

        table.update_neighbour_ranking(ORIG, R1, 500.into(), 50, now);
        table.update_neighbour_ranking(ORIG, R2, (500 - WINDOW_SIZE).into(), 50, now);

        let entry = table.get(&ORIG).unwrap();
        assert_eq!(entry.curr_seqno(), Some(500.into()));
        assert_eq!(entry.neighbour(&R2).unwrap().packet_count(), 0);
    }

    #[test]
    fn window_slides_for_all_neighbours_on_progress() {
        let mut table = table();
        let now = Timestamp::ZERO;

        table.update_neighbour_ranking(ORIG, R1, 1.into(), 50, now);
        table.update_neighbour_ranking(ORIG, R2, 2.into(), 50, now);
        // Jump far enough that R1's single entry falls out of the window.
        table.update_neighbour_ranking(ORIG, R2, (1 + WINDOW_SIZE).into(), 50, now);

        let entry = table.get(&ORIG).unwrap();
        assert_eq!(entry.neighbour(&R1).unwrap().packet_count(), 0);
        assert_eq!(entry.neighbour(&R2).unwrap().packet_count(), 2);
        assert_eq!(entry.best_next_hop(), R2);
    }

    #[test]
    fn seqno_wraparound_progresses_monotonically() {
        let mut table = table();

        // 65530, 65531, ..., 65535, 0, 1, 2 injected in order.
        let seqnos = (65530..=65535).chain(0..=2).map(SeqNo::from);
        for (i, seqno) in seqnos.enumerate() {
            let now = Timestamp::from_secs(i as u64);
            table.update_neighbour_ranking(ORIG, R1, seqno, 50, now);
            assert_eq!(table.get(&ORIG).unwrap().curr_seqno(), Some(seqno));
        }

        let entry = table.get(&ORIG).unwrap();
        assert_eq!(entry.neighbour(&R1).unwrap().packet_count(), 9);

        // A pre-wrap seqno showing up again does not regress the head.
        table.update_neighbour_ranking(ORIG, R2, 65534.into(), 50, Timestamp::from_secs(10));
        let entry = table.get(&ORIG).unwrap();
        assert_eq!(entry.curr_seqno(), Some(2.into()));
        assert_eq!(entry.neighbour(&R2).unwrap().packet_count(), 1);
    }

    #[test]
    fn best_next_hop_flips_after_delivery_shift() {
        let mut table = table();
        let now = Timestamp::ZERO;

        // R1 delivers seqnos 11..=100 first (90 of the last 100), R2 trails
        // with 31..=100 (70).
        for s in 11..=100u16 {
            table.update_neighbour_ranking(ORIG, R1, s.into(), 50, now);
        }
        for s in 31..=100u16 {
            table.update_neighbour_ranking(ORIG, R2, s.into(), 50, now);
        }

        let entry = table.get(&ORIG).unwrap();
        assert_eq!(entry.neighbour(&R1).unwrap().packet_count(), 90);
        assert_eq!(entry.neighbour(&R2).unwrap().packet_count(), 70);
        assert_eq!(entry.best_next_hop(), R1);

        // A burst where R2 delivers the next 30 and R1 goes silent.
        for s in 101..=130u16 {
            table.update_neighbour_ranking(ORIG, R2, s.into(), 50, now);
        }

        let entry = table.get(&ORIG).unwrap();
        assert!(
            entry.neighbour(&R2).unwrap().packet_count()
                > entry.neighbour(&R1).unwrap().packet_count()
        );
        assert_eq!(entry.best_next_hop(), R2);
    }

    #[test]
    fn bidirectional_requires_fresh_echo() {
        let mut table = table();
        let now = Timestamp::from_secs(10);

        assert!(!table.check_bidirectional(R1, 5.into(), now));
        assert_eq!(table.link_state(R1, 5.into(), now), LinkState::Unknown);

        table.record_bidir_seqno(R1, 5.into(), now);
        assert!(table.check_bidirectional(R1, 5.into(), now));
        assert_eq!(
            table.link_state(R1, 5.into(), now),
            LinkState::Bidirectional
        );

        // Echo of an old seqno is no evidence for the current emission.
        assert!(!table.check_bidirectional(R1, 9.into(), now));

        // The echo also ages out in wall clock terms.
        let late = now + BI_LINK_TIMEOUT + Duration::from_secs(1);
        assert!(!table.check_bidirectional(R1, 5.into(), late));
        assert_eq!(
            table.link_state(R1, 5.into(), late),
            LinkState::Unidirectional
        );
    }

    #[test]
    fn purge_drops_silent_originators() {
        let mut table = table();

        table.update_neighbour_ranking(ORIG, R1, 1.into(), 50, Timestamp::ZERO);
        assert!(table.lookup(ORIG).is_some());

        // At exactly the timeout the entry survives, expiry is strict.
        let (origs, _) = table.purge(Timestamp::ZERO + PURGE_TIMEOUT);
        assert_eq!(origs, 0);

        let (origs, _) = table.purge(Timestamp::ZERO + PURGE_TIMEOUT + Duration::from_secs(1));
        assert_eq!(origs, 1);
        assert!(table.is_empty());
        assert_eq!(table.lookup(ORIG), None);
    }

    #[test]
    fn purge_drops_silent_neighbours_and_reselects() {
        let mut table = table();

        table.update_neighbour_ranking(ORIG, R1, 1.into(), 50, Timestamp::ZERO);
        table.update_neighbour_ranking(ORIG, R1, 2.into(), 50, Timestamp::ZERO);
        let later = Timestamp::ZERO + PURGE_TIMEOUT;
        table.update_neighbour_ranking(ORIG, R2, 3.into(), 50, later);

        let (origs, neighbours) = table.purge(later + Duration::from_secs(1));
        assert_eq!(origs, 0);
        assert_eq!(neighbours, 1);

        let entry = table.get(&ORIG).unwrap();
        assert!(entry.neighbour(&R1).is_none());
        assert_eq!(entry.best_next_hop(), R2);
    }

    #[test]
    fn lookup_prefers_direct_entry_over_hna() {
        let mut table = table();
        let now = Timestamp::ZERO;

        table.update_neighbour_ranking(ORIG, R1, 1.into(), 50, now);
        table.add_hna(
            ORIG,
            HnaAnnouncement::new(Address::new(0x0a000000), 8).unwrap(),
        );

        // ORIG itself resolves through its entry, a host behind it through
        // the announcement.
        assert_eq!(table.lookup(ORIG), Some(R1));
        assert_eq!(table.lookup(Address::new(0x0a00aabb)), Some(R1));
        assert_eq!(table.lookup(Address::new(0x0b000001)), None);
    }

    #[test]
    fn lookup_uses_longest_prefix() {
        let mut table = table();
        let now = Timestamp::ZERO;
        let other = Address::new(0x0a000002);

        table.update_neighbour_ranking(ORIG, R1, 1.into(), 50, now);
        table.update_neighbour_ranking(other, R2, 1.into(), 50, now);

        table.add_hna(
            ORIG,
            HnaAnnouncement::new(Address::new(0xc0a80000), 16).unwrap(),
        );
        table.add_hna(
            other,
            HnaAnnouncement::new(Address::new(0xc0a80a00), 24).unwrap(),
        );

        // The /24 wins for addresses inside it, the /16 catches the rest.
        assert_eq!(table.lookup(Address::new(0xc0a80a07)), Some(R2));
        assert_eq!(table.lookup(Address::new(0xc0a81407)), Some(R1));
    }

    #[test]
    fn lookup_breaks_prefix_ties_to_lower_originator() {
        let mut table = table();
        let now = Timestamp::ZERO;
        let other = Address::new(0x0a000002);
        let net = HnaAnnouncement::new(Address::new(0xc0a80000), 16).unwrap();

        table.update_neighbour_ranking(other, R2, 1.into(), 50, now);
        table.update_neighbour_ranking(ORIG, R1, 1.into(), 50, now);
        table.add_hna(other, net);
        table.add_hna(ORIG, net);

        // ORIG < other, so its next hop wins.
        assert_eq!(table.lookup(Address::new(0xc0a80107)), Some(R1));
    }

    #[test]
    fn hna_is_unreachable_without_next_hop() {
        let mut table = table();

        // Entry created through an echo only, no ranked messages.
        table.record_bidir_seqno(ORIG, 1.into(), Timestamp::ZERO);
        table.add_hna(
            ORIG,
            HnaAnnouncement::new(Address::new(0xc0a80000), 16).unwrap(),
        );

        assert_eq!(table.lookup(Address::new(0xc0a80107)), None);
    }

    #[test]
    fn best_gateway_weighs_count_and_class() {
        let mut table = table();
        let now = Timestamp::ZERO;
        let gw1 = Address::new(0x0a000005);
        let gw2 = Address::new(0x0a000006);

        for s in 1..=10u16 {
            table.update_neighbour_ranking(gw1, R1, s.into(), 50, now);
        }
        for s in 1..=4u16 {
            table.update_neighbour_ranking(gw2, R2, s.into(), 50, now);
        }
        table.update_gateway(gw1, 1, 4306);
        table.update_gateway(gw2, 11, 4306);

        // 10 * 1 < 4 * 11.
        assert_eq!(table.best_gateway(), Some(gw2));

        // A gateway advertising class 0 is no gateway at all.
        table.update_gateway(gw2, 0, 0);
        assert_eq!(table.best_gateway(), Some(gw1));
    }

    // Drive the table with a deterministic pseudo random trace and check the
    // structural invariants after every step: packet counts match window
    // population, and the selected next hop is a tracked neighbour with the
    // maximum count.
    #[test]
    fn invariants_hold_over_random_trace() {
        let mut table = table();
        let mut state = 0x2545f4914f6cdd1du64;
        let mut rand = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 33) as u32
        };

        let relayers = [R1, R2, Address::new(0x0a000030)];
        let mut seqno = SeqNo::new();

        for step in 0..2000u64 {
            let now = Timestamp::from_millis(step * 100);
            seqno += (rand() % 4) as u16;
            let relayer = relayers[rand() as usize % relayers.len()];
            table.update_neighbour_ranking(ORIG, relayer, seqno, 50, now);

            let entry = table.get(&ORIG).unwrap();
            let max_count = entry
                .neighbours()
                .map(|(_, info)| info.packet_count())
                .max()
                .unwrap_or(0);

            for (_, info) in entry.neighbours() {
                assert_eq!(info.packet_count(), info.window().packet_count());
                assert!(info.packet_count() <= u32::from(WINDOW_SIZE));
            }

            let best = entry.best_next_hop();
            if max_count == 0 {
                assert!(best.is_unspecified());
            } else {
                assert_eq!(entry.neighbour(&best).unwrap().packet_count(), max_count);
                assert_eq!(entry.best_route_count(), max_count);
            }
        }
    }
}
