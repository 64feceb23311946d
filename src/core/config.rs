//! # Runtime configuration.
//!
//! [`RuntimeConfig`] holds the knobs of the client runtime itself, as opposed to
//! [`ClientConfig`](crate::ClientConfig), which describes the broker and its topology.
//!
//! ## Sentinel values
//! - `reconnect.max_attempts = 0` → retry forever
//! - `probe_interval = 0s` → clamped to [`MIN_PROBE_INTERVAL`]

use std::time::Duration;

use crate::policies::ReconnectPolicy;

/// Lower bound for the supervisor's liveness probe.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Runtime settings for [`StreamClient`](crate::StreamClient) and
/// [`ClientSupervisor`](crate::ClientSupervisor).
///
/// ## Field semantics
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `reconnect`: backoff and attempt limit of the reconnect loop
/// - `probe_interval`: how often the supervisor checks liveness
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Capacity of the event bus broadcast channel.
    ///
    /// Receivers lagging more than this many events skip the older ones.
    pub bus_capacity: usize,

    /// Policy of [`StreamClient::reconnect`](crate::StreamClient::reconnect).
    pub reconnect: ReconnectPolicy,

    /// Interval between liveness probes of [`ClientSupervisor`](crate::ClientSupervisor).
    pub probe_interval: Duration,
}

impl RuntimeConfig {
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    #[inline]
    pub fn probe_interval_clamped(&self) -> Duration {
        self.probe_interval.max(MIN_PROBE_INTERVAL)
    }
}

impl Default for RuntimeConfig {
    /// - `bus_capacity = 1024`
    /// - `reconnect = ReconnectPolicy::default()` (fixed 2s, unlimited)
    /// - `probe_interval = 1s`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            reconnect: ReconnectPolicy::default(),
            probe_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps() {
        let cfg = RuntimeConfig {
            bus_capacity: 0,
            probe_interval: Duration::ZERO,
            ..RuntimeConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.probe_interval_clamped(), MIN_PROBE_INTERVAL);
    }
}
