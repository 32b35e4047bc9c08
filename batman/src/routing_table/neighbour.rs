//! Per-neighbour bookkeeping inside an originator entry.

use crate::{metric::TransmitQuality, time::Timestamp};

use super::window::{SlidingWindow, WINDOW_SIZE};

/// State tracked for a single neighbour relaying messages of a given
/// originator. Owned exclusively by the [`OriginatorEntry`](super::OriginatorEntry)
/// it ranks a path for.
#[derive(Debug, Clone)]
pub struct NeighbourInfo {
    /// Window of recently relayed sequence numbers, aligned to the owning
    /// originator's current sequence number.
    window: SlidingWindow,
    /// Last time a ranked message came in through this neighbour.
    last_valid: Timestamp,
    /// TTL observed on the most recently ranked message from this neighbour.
    last_ttl: u8,
}

impl NeighbourInfo {
    /// Create a new `NeighbourInfo` which hasn't relayed anything yet.
    pub(crate) fn new(now: Timestamp) -> Self {
        Self {
            window: SlidingWindow::new(),
            last_valid: now,
            last_ttl: 0,
        }
    }

    /// Amount of distinct sequence numbers relayed by this neighbour within
    /// the window.
    pub fn packet_count(&self) -> u32 {
        self.window.packet_count()
    }

    /// The transmit quality of the path through this neighbour.
    pub fn transmit_quality(&self) -> TransmitQuality {
        TransmitQuality::new(self.packet_count(), u32::from(WINDOW_SIZE))
    }

    /// Last time a ranked message came in through this neighbour.
    pub fn last_valid(&self) -> Timestamp {
        self.last_valid
    }

    /// TTL observed on the most recently ranked message from this neighbour.
    pub fn last_ttl(&self) -> u8 {
        self.last_ttl
    }

    pub(crate) fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub(crate) fn window_mut(&mut self) -> &mut SlidingWindow {
        &mut self.window
    }

    pub(crate) fn refresh(&mut self, ttl: u8, now: Timestamp) {
        self.last_valid = now;
        self.last_ttl = ttl;
    }
}
