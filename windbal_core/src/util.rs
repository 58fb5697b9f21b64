//! Interval helpers shared by the controller and the CLI.

use std::time::Duration;

/// Upper bound accepted for the inter-sample interval.
pub const MAX_INTERVAL_MS: u64 = 60_000;

/// Inter-sample wait for a configured millisecond interval, clamped to
/// `MAX_INTERVAL_MS`. Zero means "scan back to back".
#[inline]
pub fn interval(ms: u64) -> Duration {
    Duration::from_millis(ms.min(MAX_INTERVAL_MS))
}

/// Effective sample rate in Hz for a measured count over `elapsed`.
#[inline]
pub fn rate_hz(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 { 0.0 } else { count as f64 / secs }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_clamped() {
        assert_eq!(interval(1), Duration::from_millis(1));
        assert_eq!(interval(u64::MAX), Duration::from_millis(MAX_INTERVAL_MS));
    }

    #[test]
    fn rate_handles_zero_elapsed() {
        assert_eq!(rate_hz(10, Duration::ZERO), 0.0);
        assert!((rate_hz(50, Duration::from_millis(500)) - 100.0).abs() < 1e-9);
    }
}
