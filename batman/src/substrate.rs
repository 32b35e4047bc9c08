//! Host capabilities consumed by the agent core.
//!
//! The core is sans-IO: it never opens sockets, reads clocks, sleeps or
//! draws randomness on its own. Instead a [`Substrate`] implementation is
//! handed to the [`Router`](crate::router::Router) at construction, and all
//! timer driven behavior is expressed as [`Timer`] values the host delivers
//! back at the requested time. This keeps event handling deterministic: a
//! simulator with a virtual clock and a seeded random source reproduces the
//! exact same traces.

use std::time::Duration;

use crate::time::Timestamp;

/// A timer event scheduled by the router on its host, to be fed back through
/// [`Router::handle_timer`](crate::router::Router::handle_timer) once the
/// requested delay elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    /// Emit our own originator message and re-arm the emission timer.
    Originator,
    /// Run the periodic purge and re-arm the purge timer.
    Purge,
    /// Transmit a staggered rebroadcast. The payload was captured when the
    /// forwarding decision was made, later table changes don't affect it.
    DelayedBroadcast(Vec<u8>),
}

/// Capabilities the router needs from its host environment.
///
/// None of these calls may block: sends go to the host's outbound queue, and
/// `schedule_after` registers a single-shot event instead of sleeping.
pub trait Substrate {
    /// Current time on the host clock.
    fn now(&self) -> Timestamp;

    /// Queue a datagram for broadcast on all active interfaces.
    fn broadcast(&mut self, payload: Vec<u8>);

    /// Deliver `timer` back to the router after `delay`.
    fn schedule_after(&mut self, delay: Duration, timer: Timer);

    /// Sample a uniformly distributed value in `[low, high)`. An empty range
    /// returns `low`.
    fn random_uniform(&mut self, low: f64, high: f64) -> f64;
}
