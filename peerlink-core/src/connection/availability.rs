//! Availability-time accounting for a peer connection.

use std::time::{Duration, Instant};

/// Tracks cumulative time a peer was unavailable due to request timeouts.
///
/// `connected_since` marks the moment connectivity was last established;
/// it is cleared when the link drops and when a request times out. Only
/// timeout events accrue downtime; transport closures do not.
#[derive(Debug, Default)]
pub(crate) struct AvailabilityMeter {
    connected_since: Option<Instant>,
    downtime: Duration,
}

impl AvailabilityMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks connectivity (re)established.
    pub fn mark_connected(&mut self, now: Instant) {
        self.connected_since = Some(now);
    }

    /// Stops the availability clock without accruing downtime.
    pub fn mark_disconnected(&mut self) {
        self.connected_since = None;
    }

    /// Records a request timeout: stops the availability clock and adds
    /// the elapsed wait, rounded to whole seconds, to the accumulator.
    pub fn record_timeout(&mut self, waited: Duration) {
        self.connected_since = None;
        self.downtime += round_to_seconds(waited);
    }

    /// Seconds of accrued downtime; `reset` zeroes the accumulator.
    ///
    /// Only meaningful while the connection is not `Connected`; a
    /// connected peer reports zero without consulting the meter.
    pub fn report(&mut self, reset: bool) -> u64 {
        let seconds = self.downtime.as_secs();
        if reset {
            self.downtime = Duration::ZERO;
        }
        seconds
    }

    pub fn connected_since(&self) -> Option<Instant> {
        self.connected_since
    }
}

/// Rounds to the nearest whole second, half-up.
fn round_to_seconds(duration: Duration) -> Duration {
    Duration::from_secs((duration.as_millis() as u64 + 500) / 1000)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn timeouts_accrue_rounded_seconds() {
        let mut meter = AvailabilityMeter::new();
        meter.mark_connected(Instant::now());

        meter.record_timeout(Duration::from_millis(1_400));
        meter.record_timeout(Duration::from_millis(1_600));

        assert_eq!(meter.connected_since(), None);
        assert_eq!(meter.report(false), 3);
    }

    #[test]
    fn reset_zeroes_the_accumulator_exactly_once() {
        let mut meter = AvailabilityMeter::new();
        meter.record_timeout(Duration::from_secs(5));

        assert_eq!(meter.report(true), 5);
        assert_eq!(meter.report(false), 0);
    }

    #[test]
    fn disconnect_does_not_accrue_downtime() {
        let mut meter = AvailabilityMeter::new();
        meter.mark_connected(Instant::now());
        meter.mark_disconnected();

        assert_eq!(meter.connected_since(), None);
        assert_eq!(meter.report(false), 0);
    }

    proptest! {
        /// The accumulator never decreases and each recorded timeout is
        /// off by at most half a second from the true wait.
        #[test]
        fn accumulator_is_monotone_and_rounding_is_bounded(
            waits in prop::collection::vec(0u64..120_000, 0..32)
        ) {
            let mut meter = AvailabilityMeter::new();
            let mut previous = 0u64;
            let mut true_millis = 0u64;

            for wait in waits {
                meter.record_timeout(Duration::from_millis(wait));
                true_millis += wait;

                let reported = meter.report(false);
                prop_assert!(reported >= previous);
                let diff_millis =
                    (reported as i128 * 1000 - true_millis as i128).unsigned_abs();
                prop_assert!(diff_millis <= 500 * 32);
                previous = reported;
            }
        }
    }
}
