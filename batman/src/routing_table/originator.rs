//! Originator entries, the unit of ownership in the routing table. An entry
//! owns the per-neighbour ranking state for one remote originator, together
//! with its gateway advertisement and announced networks.

use std::collections::HashMap;
use std::time::Duration;

use tracing::trace;

use crate::{
    address::Address, packet::HnaAnnouncement, sequence_number::SeqNo, time::Timestamp,
};

use super::neighbour::NeighbourInfo;

/// Gateway service advertised by an originator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GatewayInfo {
    gw_flags: u8,
    gw_port: u16,
}

impl GatewayInfo {
    pub(crate) fn new(gw_flags: u8, gw_port: u16) -> Self {
        Self { gw_flags, gw_port }
    }

    /// The advertised gateway class. Higher classes advertise better uplinks.
    pub fn flags(&self) -> u8 {
        self.gw_flags
    }

    /// The advertised tunnel port.
    pub fn port(&self) -> u16 {
        self.gw_port
    }
}

/// Everything known about a single remote originator.
#[derive(Debug, Clone)]
pub struct OriginatorEntry {
    /// Highest sequence number accepted from this originator, if any message
    /// was ranked yet. The sliding windows of all neighbours are aligned to
    /// this value.
    curr_seqno: Option<SeqNo>,
    /// Last time we were made aware of this originator.
    last_aware: Timestamp,
    /// Ranking state per neighbour which relayed messages of this originator.
    neighbours: HashMap<Address, NeighbourInfo>,
    /// The neighbour currently relaying the most distinct messages, or the
    /// unspecified address while no neighbour has a nonzero count.
    best_next_hop: Address,
    /// Packet count of the best neighbour.
    best_route_count: u32,
    /// Our own sequence number last observed echoed back by this originator,
    /// and when we saw the echo.
    bidir_echo: Option<(SeqNo, Timestamp)>,
    /// Gateway service advertised by this originator, if any.
    gateway: Option<GatewayInfo>,
    /// Networks this originator announced it can deliver traffic to.
    hna: Vec<HnaAnnouncement>,
}

impl OriginatorEntry {
    pub(crate) fn new(now: Timestamp) -> Self {
        Self {
            curr_seqno: None,
            last_aware: now,
            neighbours: HashMap::new(),
            best_next_hop: Address::UNSPECIFIED,
            best_route_count: 0,
            bidir_echo: None,
            gateway: None,
            hna: Vec::new(),
        }
    }

    /// Highest sequence number accepted from this originator, if any.
    pub fn curr_seqno(&self) -> Option<SeqNo> {
        self.curr_seqno
    }

    /// Last time we were made aware of this originator.
    pub fn last_aware(&self) -> Timestamp {
        self.last_aware
    }

    /// The neighbour currently selected as next hop towards this originator,
    /// or the unspecified address if there is no usable path.
    pub fn best_next_hop(&self) -> Address {
        self.best_next_hop
    }

    /// Packet count of the selected next hop.
    pub fn best_route_count(&self) -> u32 {
        self.best_route_count
    }

    /// Ranking state for a specific neighbour.
    pub fn neighbour(&self, neighbour: &Address) -> Option<&NeighbourInfo> {
        self.neighbours.get(neighbour)
    }

    /// Iterator over all neighbours which relayed messages of this
    /// originator.
    pub fn neighbours(&self) -> impl Iterator<Item = (&Address, &NeighbourInfo)> {
        self.neighbours.iter()
    }

    /// Gateway service advertised by this originator, if any.
    pub fn gateway(&self) -> Option<GatewayInfo> {
        self.gateway
    }

    /// Checks if this originator advertises gateway service.
    pub fn is_gateway(&self) -> bool {
        self.gateway.map(|gw| gw.flags() != 0).unwrap_or(false)
    }

    /// Networks announced by this originator.
    pub fn hna(&self) -> &[HnaAnnouncement] {
        &self.hna
    }

    pub(crate) fn set_last_aware(&mut self, now: Timestamp) {
        self.last_aware = now;
    }

    pub(crate) fn set_curr_seqno(&mut self, seqno: SeqNo) {
        self.curr_seqno = Some(seqno);
    }

    pub(crate) fn bidir_echo(&self) -> Option<(SeqNo, Timestamp)> {
        self.bidir_echo
    }

    pub(crate) fn set_bidir_echo(&mut self, seqno: SeqNo, now: Timestamp) {
        self.bidir_echo = Some((seqno, now));
    }

    pub(crate) fn set_gateway(&mut self, gateway: GatewayInfo) {
        self.gateway = Some(gateway);
    }

    pub(crate) fn neighbour_entry(&mut self, neighbour: Address, now: Timestamp) -> &mut NeighbourInfo {
        self.neighbours
            .entry(neighbour)
            .or_insert_with(|| NeighbourInfo::new(now))
    }

    pub(crate) fn neighbours_mut(
        &mut self,
    ) -> impl Iterator<Item = (&Address, &mut NeighbourInfo)> {
        self.neighbours.iter_mut()
    }

    /// Replace the list of announced networks.
    pub(crate) fn replace_hna(&mut self, hna: Vec<HnaAnnouncement>) {
        self.hna = hna;
    }

    /// Add a single announced network, replacing an existing announcement for
    /// the same network address.
    pub(crate) fn add_hna(&mut self, hna: HnaAnnouncement) {
        if let Some(existing) = self
            .hna
            .iter_mut()
            .find(|existing| existing.network() == hna.network())
        {
            *existing = hna;
        } else {
            self.hna.push(hna);
        }
    }

    pub(crate) fn clear_hna(&mut self) {
        self.hna.clear();
    }

    /// Re-select the neighbour with the greatest packet count as next hop.
    /// Ties are broken towards the lower neighbour address so selection is
    /// deterministic. With all counts zero the next hop becomes unspecified.
    /// Returns whether the selected next hop changed.
    pub(crate) fn update_best_next_hop(&mut self) -> bool {
        let mut best = Address::UNSPECIFIED;
        let mut best_count = 0;

        for (neighbour, info) in &self.neighbours {
            let count = info.packet_count();
            if count > best_count || (count == best_count && count > 0 && *neighbour < best) {
                best = *neighbour;
                best_count = count;
            }
        }

        let changed = best != self.best_next_hop;
        self.best_next_hop = best;
        self.best_route_count = best_count;
        changed
    }

    /// Drop neighbours which haven't relayed anything for longer than
    /// `timeout`, returning the amount removed. The caller is expected to
    /// re-run [`Self::update_best_next_hop`] afterwards.
    pub(crate) fn purge_neighbours(&mut self, now: Timestamp, timeout: Duration) -> usize {
        let prev = self.neighbours.len();
        self.neighbours.retain(|neighbour, info| {
            let keep = now.duration_since(info.last_valid()) <= timeout;
            if !keep {
                trace!(neighbour = %neighbour, "Purging expired neighbour");
            }
            keep
        });
        prev - self.neighbours.len()
    }
}
