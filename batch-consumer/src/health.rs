use std::sync::atomic::{AtomicI64, Ordering};

use time::{Duration, OffsetDateTime};

/// Liveness deadline for the fetch loop.
///
/// Every `mark_healthy` pushes the deadline `timeout` into the future. Once the
/// deadline passes without a new mark the timer reports unhealthy, mirroring the
/// `HealthyUntil` / `Stalled` transition of a health registry component.
pub struct HealthCheckTimer {
    timeout: Duration,
    // unix timestamp in milliseconds
    healthy_until: AtomicI64,
}

impl HealthCheckTimer {
    /// A new timer starts out healthy for one full timeout.
    pub fn new(timeout: std::time::Duration) -> Self {
        let timer = Self {
            timeout: Duration::try_from(timeout).unwrap_or(Duration::MAX),
            healthy_until: AtomicI64::new(0),
        };
        timer.mark_healthy();
        timer
    }

    pub fn mark_healthy(&self) {
        let until = OffsetDateTime::now_utc().saturating_add(self.timeout);
        self.healthy_until
            .store(unix_millis(until), Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        unix_millis(OffsetDateTime::now_utc()) < self.healthy_until.load(Ordering::SeqCst)
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_after_creation() {
        let timer = HealthCheckTimer::new(std::time::Duration::from_secs(60));
        assert!(timer.is_healthy());
    }

    #[test]
    fn stalls_without_marks() {
        let timer = HealthCheckTimer::new(std::time::Duration::ZERO);
        assert!(!timer.is_healthy());

        timer.mark_healthy();
        assert!(!timer.is_healthy());
    }

    #[test]
    fn huge_timeouts_saturate() {
        let timer = HealthCheckTimer::new(std::time::Duration::MAX);
        assert!(timer.is_healthy());
    }
}
