//! This module is used for collection of runtime metrics of the routing
//! agent. The main item of interest is the [`Metrics`] trait. Users can
//! provide their own implementation of this, or use [`NoMetrics`] to disable
//! gathering metrics.

/// The collection of all metrics exported by a [`Router`](crate::router::Router).
/// It is up to the user to provide an implementation which implements the
/// methods for metrics they are interested in. All methods have a default
/// implementation, so a user who is not interested in any metrics can use the
/// provided [`NoMetrics`] implementation.
///
/// Failures in the agent are only observable through these counters and the
/// trace records, the protocol itself never retries; the next emission or
/// periodic tick provides natural recovery.
pub trait Metrics {
    /// The [`Router`](crate::router::Router) received a datagram on the
    /// control port.
    #[inline]
    fn ogm_received(&self) {}

    /// A received datagram was dropped because it could not be decoded: it
    /// was truncated or carried an unsupported version.
    #[inline]
    fn ogm_invalid(&self) {}

    /// A received datagram was dropped because its source address was our own
    /// main address.
    #[inline]
    fn ogm_self_loop(&self) {}

    /// A received datagram was dropped because its source address was the
    /// broadcast address.
    #[inline]
    fn ogm_broadcast_source(&self) {}

    /// A received message was dropped because a previous hop already marked
    /// it as having crossed a unidirectional link.
    #[inline]
    fn ogm_unidirectional_flag(&self) {}

    /// One of our own messages was observed echoed back by a direct
    /// neighbour.
    #[inline]
    fn ogm_own_echo(&self) {}

    /// A received message was recognized as a duplicate of an already
    /// processed broadcast. `forwarded` indicates whether it was still
    /// rebroadcast under the best link rule.
    #[inline]
    fn ogm_duplicate(&self, _forwarded: bool) {}

    /// A fresh message failed the bidirectional link test and was not ranked.
    #[inline]
    fn link_unidirectional(&self) {}

    /// A fresh message passed all checks and was folded into the neighbour
    /// ranking.
    #[inline]
    fn ogm_ranked(&self) {}

    /// Next hop selection for some originator switched to a different
    /// neighbour.
    #[inline]
    fn best_next_hop_changed(&self) {}

    /// A message was queued for rebroadcast.
    #[inline]
    fn ogm_forwarded(&self) {}

    /// A message was dropped instead of rebroadcast because its TTL expired.
    #[inline]
    fn ogm_ttl_exhausted(&self) {}

    /// The emission timer fired and we broadcast our own message.
    #[inline]
    fn ogm_emitted(&self) {}

    /// The periodic purge dropped this many expired originators.
    #[inline]
    fn originators_purged(&self, _amount: usize) {}

    /// The periodic purge dropped this many expired neighbours from
    /// originators which are themselves still alive.
    #[inline]
    fn neighbours_purged(&self, _amount: usize) {}

    /// The data plane asked for a next hop. `found` indicates whether a route
    /// was available; the upstream IP layer decides what happens to packets
    /// without one.
    #[inline]
    fn route_lookup(&self, _found: bool) {}
}

/// A [`Metrics`] implementation which doesn't record anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetrics;

impl Metrics for NoMetrics {}
