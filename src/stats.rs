//! Running latency statistics for key-value store round trips.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A lock-free accumulator of batch round-trip counts and total latency.
#[derive(Default)]
pub struct ResponseTimeStats {
    count: AtomicU64,
    total_micros: AtomicU64,
}

impl ResponseTimeStats {
    /// A fresh, zeroed accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one round trip that took `elapsed`.
    pub fn record(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Total number of round trips recorded.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean round-trip latency in microseconds, or `0.0` if nothing has
    /// been recorded yet.
    pub fn mean_micros(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.total_micros.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// A one-line summary suitable for a `tracing::debug!` call.
    pub fn display(&self) -> String {
        format!(
            "ResponseTimeStats{{count={}, mean_micros={:.1}}}",
            self.count(),
            self.mean_micros()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mean_is_zero_until_recorded() {
        let stats = ResponseTimeStats::new();
        assert_eq!(stats.mean_micros(), 0.0);
    }

    #[test]
    fn mean_tracks_recorded_samples() {
        let stats = ResponseTimeStats::new();
        stats.record(Duration::from_micros(100));
        stats.record(Duration::from_micros(300));
        assert_eq!(stats.count(), 2);
        assert_eq!(stats.mean_micros(), 200.0);
    }
}
