//! Request pacing for single-item uploads.
//!
//! Every worker spaces its uploads so that all `concurrent_batches` workers
//! together stay under the CRM's `requests_per_minute` budget, with one extra
//! slot reserved for uploads triggered outside the queue:
//!
//! ```text
//! interval = 60s / requests_per_minute * (concurrent_batches + 1)
//! sleep    = interval - time spent on the request
//! ```
//!
//! The sleep only suspends the job that made the request; other workers keep
//! running.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::traits::RateConfig;

const MICROS_PER_MINUTE: u64 = 60_000_000;

/// Time left of the per-request interval after `elapsed` was already spent.
///
/// Zero when the request alone used up the interval.
pub fn throttle_delay(requests_per_minute: u32, concurrent_batches: u32, elapsed: Duration) -> Duration {
    let rpm = u64::from(requests_per_minute.max(1));
    let slots = u64::from(concurrent_batches) + 1;
    let interval_us = MICROS_PER_MINUTE * slots / rpm;
    let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(interval_us.saturating_sub(elapsed_us))
}

/// Paces uploads against a shared [`RateConfig`].
#[derive(Clone)]
pub struct Throttle {
    rate: Arc<dyn RateConfig>,
}

impl Throttle {
    pub fn new(rate: Arc<dyn RateConfig>) -> Self {
        Self { rate }
    }

    pub fn concurrent_batches(&self) -> u32 {
        self.rate.concurrent_batches()
    }

    /// Delay owed for a request that took `elapsed`.
    pub fn delay_after(&self, elapsed: Duration) -> Duration {
        throttle_delay(
            self.rate.requests_per_minute(),
            self.rate.concurrent_batches(),
            elapsed,
        )
    }

    /// Sleep out the rest of the interval that began at `started`.
    ///
    /// Returns how long the caller was suspended.
    pub async fn pace(&self, started: Instant) -> Duration {
        let delay = self.delay_after(started.elapsed());
        if !delay.is_zero() {
            tracing::debug!(sleep_ms = delay.as_millis() as u64, "Throttling upload");
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    fn micros(d: Duration) -> i64 {
        d.as_micros() as i64
    }

    #[test]
    fn test_default_budget_interval() {
        let delay = throttle_delay(180, 1, Duration::ZERO);
        assert!((micros(delay) - 666_667).abs() <= 1, "got {delay:?}");
    }

    #[test]
    fn test_elapsed_time_is_subtracted() {
        let delay = throttle_delay(180, 1, Duration::from_millis(100));
        assert!((micros(delay) - 566_667).abs() <= 1, "got {delay:?}");
    }

    #[test]
    fn test_more_workers_widen_interval() {
        assert_eq!(throttle_delay(60, 0, Duration::ZERO), Duration::from_secs(1));
        assert_eq!(throttle_delay(60, 3, Duration::ZERO), Duration::from_secs(4));
    }

    #[test]
    fn test_no_delay_when_request_was_slow() {
        assert_eq!(
            throttle_delay(180, 1, Duration::from_secs(2)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_zero_rate_does_not_divide_by_zero() {
        assert_eq!(throttle_delay(0, 0, Duration::ZERO), Duration::from_secs(60));
    }

    #[test]
    fn test_launch_worker_count_scales_delay() {
        let single = Throttle::new(Arc::new(SyncConfig::default()));
        let four = Throttle::new(Arc::new(SyncConfig::default().with_workers(Some(4))));

        assert_eq!(four.concurrent_batches(), 4);
        assert_eq!(
            four.delay_after(Duration::ZERO),
            throttle_delay(180, 4, Duration::ZERO)
        );
        assert!(four.delay_after(Duration::ZERO) > single.delay_after(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_sleeps_remaining_interval() {
        let throttle = Throttle::new(Arc::new(SyncConfig::default()));

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let slept = throttle.pace(started).await;

        assert!((micros(slept) - 466_667).abs() <= 1, "got {slept:?}");
        // Timers fire on millisecond ticks.
        let elapsed = micros(started.elapsed());
        assert!((elapsed - 666_667).abs() <= 1_000, "elapsed {elapsed}us");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_returns_immediately_when_over_budget() {
        let throttle = Throttle::new(Arc::new(SyncConfig::default().with_requests_per_minute(6000)));

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let slept = throttle.pace(started).await;

        assert_eq!(slept, Duration::ZERO);
    }
}
