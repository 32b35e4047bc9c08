//! Core of a B.A.T.M.A.N. IV (Better Approach To Mobile Ad-hoc Networking)
//! routing agent: a proactive distance-vector protocol in which every node
//! periodically broadcasts originator messages (OGMs), and candidate next
//! hops are ranked by counting how many distinct OGMs of each originator they
//! relayed within a sliding sequence-number window.
//!
//! The crate is transport agnostic. A host environment supplies the
//! [`Substrate`] capabilities (broadcast sink, scheduler, clock, randomness)
//! and feeds received datagrams and due timers into the [`Router`], which
//! runs the whole protocol as a single-threaded event machine.

use core::fmt;
use std::time::Duration;

use crate::packet::HnaAnnouncement;

pub use crate::{
    address::Address,
    metrics::{Metrics, NoMetrics},
    router::Router,
    routing_table::{LinkState, RoutingTable, WINDOW_SIZE},
    sequence_number::SeqNo,
    substrate::{Substrate, Timer},
    time::Timestamp,
};

pub mod address;
pub mod broadcast_log;
pub mod metric;
pub mod metrics;
pub mod packet;
pub mod router;
pub mod routing_table;
pub mod sequence_number;
pub mod substrate;
pub mod time;

/// Default base period of OGM emission.
pub const DEFAULT_OGM_INTERVAL: Duration = Duration::from_secs(1);
/// Default total width of the emission jitter window.
pub const DEFAULT_OGM_INTERVAL_JITTER: Duration = Duration::from_millis(200);
/// Default initial TTL on emitted OGMs.
pub const DEFAULT_TTL: u8 = 64;
/// Smallest allowed TTL. A message with TTL 1 would die on the first hop
/// without ever being relayed.
pub const TTL_MIN: u8 = 2;
/// Default staleness threshold: 10 full windows at the default emission
/// interval.
pub const DEFAULT_PURGE_TIMEOUT: Duration = Duration::from_secs(1280);
/// Default period of the purge timer.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(10);

/// Config for a [`Router`].
pub struct Config {
    /// The main address of this node. Fixed for the lifetime of the agent.
    pub address: Address,
    /// Base period of OGM emission.
    pub ogm_interval: Duration,
    /// Total width of the emission jitter window. Each emission is delayed or
    /// advanced by up to half of this.
    pub ogm_interval_jitter: Duration,
    /// Initial TTL on emitted OGMs.
    pub ttl: u8,
    /// Originators and neighbours silent for longer than this are dropped.
    pub purge_timeout: Duration,
    /// Period of the purge timer. Must not exceed `purge_timeout`.
    pub purge_interval: Duration,
    /// Gateway class advertised in emitted OGMs, 0 to not advertise gateway
    /// service.
    pub gw_flags: u8,
    /// Gateway tunnel port advertised alongside `gw_flags`.
    pub gw_port: u16,
    /// Attached networks announced in every emitted OGM.
    pub announced_networks: Vec<HnaAnnouncement>,
}

impl Config {
    /// Create a new `Config` for a node with the given main address, with
    /// protocol defaults for everything else.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ogm_interval: DEFAULT_OGM_INTERVAL,
            ogm_interval_jitter: DEFAULT_OGM_INTERVAL_JITTER,
            ttl: DEFAULT_TTL,
            purge_timeout: DEFAULT_PURGE_TIMEOUT,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            gw_flags: 0,
            gw_port: 0,
            announced_networks: Vec::new(),
        }
    }

    /// Validate the configuration. A [`Router`] refuses to be built from an
    /// invalid config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_unspecified() || self.address.is_broadcast() {
            return Err(ConfigError::InvalidAddress);
        }
        if self.ttl < TTL_MIN {
            return Err(ConfigError::TtlOutOfRange(self.ttl));
        }
        if self.ogm_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.purge_interval.is_zero() || self.purge_interval > self.purge_timeout {
            return Err(ConfigError::InvalidPurgeInterval);
        }
        Ok(())
    }
}

/// An error in the agent configuration. The agent will not start with an
/// invalid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The main address is a reserved sentinel value.
    InvalidAddress,
    /// The configured TTL is below the minimum of [`TTL_MIN`]. The upper
    /// bound is enforced by the field type.
    TtlOutOfRange(u8),
    /// The emission interval is zero.
    ZeroInterval,
    /// The purge timer period is zero or exceeds the purge timeout.
    InvalidPurgeInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidAddress => {
                f.write_str("node address can't be unspecified or broadcast")
            }
            ConfigError::TtlOutOfRange(ttl) => {
                write!(f, "TTL {ttl} is outside the valid range [{TTL_MIN}, 255]")
            }
            ConfigError::ZeroInterval => f.write_str("OGM emission interval can't be zero"),
            ConfigError::InvalidPurgeInterval => {
                f.write_str("purge interval must be nonzero and within the purge timeout")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
