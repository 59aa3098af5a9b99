//! Registry lifecycle counters.
//!
//! [`RegistryMetrics`] accumulates over the registry's lifetime and is
//! read with [`EventRegistry::metrics`](crate::EventRegistry::metrics).

use ripple_stream::PoolStats;

/// Cumulative counters describing registry activity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryMetrics {
    /// Streams allocated by `create_writer`.
    pub streams_created: u64,
    /// Streams disposed synchronously.
    pub streams_disposed: u64,
    /// Streams whose disposal was scheduled behind a pending handle.
    pub deferred_disposals: u64,
    /// Produce-then-drain cycles started across all event types.
    pub cycles_started: u64,
    /// Calls to `get_readers`.
    pub reader_requests: u64,
    /// Protocol violations reported to callers.
    pub protocol_violations: u64,
    /// Snapshot of the shared block pool.
    pub pool: PoolStats,
}

impl RegistryMetrics {
    /// Streams not yet disposed or scheduled for disposal.
    pub fn live_streams(&self) -> u64 {
        self.streams_created
            .saturating_sub(self.streams_disposed + self.deferred_disposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = RegistryMetrics::default();
        assert_eq!(m.streams_created, 0);
        assert_eq!(m.live_streams(), 0);
        assert_eq!(m.pool, PoolStats::default());
    }

    #[test]
    fn live_streams_subtracts_both_disposal_kinds() {
        let m = RegistryMetrics {
            streams_created: 5,
            streams_disposed: 1,
            deferred_disposals: 2,
            ..RegistryMetrics::default()
        };
        assert_eq!(m.live_streams(), 2);
    }
}
