//! The broadcast log keeps track of recently processed `(originator, seqno)`
//! pairs. This allows us to recognize rebroadcasts of a message we already
//! handled, which must not be ranked again, though they may still have to be
//! forwarded.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::{address::Address, sequence_number::SeqNo, time::Timestamp};

/// Log of recently seen broadcasts. Entries expire after the retention
/// period, relying on [`BroadcastLog::purge`] being called periodically to
/// bound memory use.
#[derive(Debug)]
pub struct BroadcastLog {
    entries: HashMap<(Address, SeqNo), Timestamp>,
    retention: Duration,
}

impl BroadcastLog {
    /// Create a new empty `BroadcastLog` which remembers entries for the
    /// given retention period.
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
        }
    }

    /// Checks if `(originator, seqno)` was recorded within the retention
    /// period.
    pub fn is_duplicate(&self, originator: Address, seqno: SeqNo, now: Timestamp) -> bool {
        self.entries
            .get(&(originator, seqno))
            .map(|logged| now.duration_since(*logged) <= self.retention)
            .unwrap_or(false)
    }

    /// Record a broadcast in the log.
    pub fn record(&mut self, originator: Address, seqno: SeqNo, now: Timestamp) {
        self.entries.insert((originator, seqno), now);
    }

    /// Drop all entries past the retention period.
    pub fn purge(&mut self, now: Timestamp) {
        let prev_entries = self.entries.len();
        self.entries
            .retain(|_, logged| now.duration_since(*logged) <= self.retention);

        let cleaned_entries = prev_entries - self.entries.len();
        if cleaned_entries > 0 {
            debug!(cleaned_entries, "Cleaned up stale broadcast log entries");
        }
    }

    /// Amount of remembered broadcasts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{address::Address, time::Timestamp};

    use super::BroadcastLog;

    const RETENTION: Duration = Duration::from_secs(1280);

    #[test]
    fn detects_duplicates() {
        let mut log = BroadcastLog::new(RETENTION);
        let orig = Address::new(0x0a000001);
        let now = Timestamp::ZERO;

        assert!(!log.is_duplicate(orig, 5.into(), now));
        log.record(orig, 5.into(), now);
        assert!(log.is_duplicate(orig, 5.into(), now));
        // A different seqno or originator is not a duplicate.
        assert!(!log.is_duplicate(orig, 6.into(), now));
        assert!(!log.is_duplicate(Address::new(0x0a000002), 5.into(), now));
    }

    #[test]
    fn entries_age_out() {
        let mut log = BroadcastLog::new(RETENTION);
        let orig = Address::new(0x0a000001);

        log.record(orig, 5.into(), Timestamp::ZERO);
        let late = Timestamp::ZERO + RETENTION + Duration::from_secs(1);
        // Stale entries don't count as duplicates even before a purge ran.
        assert!(!log.is_duplicate(orig, 5.into(), late));

        log.purge(late);
        assert!(log.is_empty());
    }

    #[test]
    fn purge_keeps_fresh_entries() {
        let mut log = BroadcastLog::new(RETENTION);
        let orig = Address::new(0x0a000001);

        log.record(orig, 5.into(), Timestamp::ZERO);
        log.record(orig, 6.into(), Timestamp::from_secs(1000));

        log.purge(Timestamp::from_secs(1500));
        assert_eq!(log.len(), 1);
        assert!(log.is_duplicate(orig, 6.into(), Timestamp::from_secs(1500)));
    }
}
