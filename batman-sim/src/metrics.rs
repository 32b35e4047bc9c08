//! Counters collected over a simulation run.

/// Aggregate traffic counters of a simulation.
#[derive(Debug, Default, Clone)]
pub struct SimMetrics {
    /// Broadcasts put on the air by any node.
    pub datagrams_sent: u64,
    /// Datagram deliveries that reached a receiver.
    pub datagrams_delivered: u64,
    /// Datagram deliveries suppressed by link loss.
    pub datagrams_dropped: u64,
}
