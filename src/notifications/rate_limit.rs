//! Scan rate limiting.
//!
//! A guard timestamp that lets the expensive cross-join scan run at most once per minimum
//! interval, however often it is asked to run.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Default minimum spacing between two scans.
pub const DEFAULT_SCAN_MIN_INTERVAL: Duration = Duration::from_secs(5);

pub struct ScanRateLimiter {
    min_interval: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl ScanRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Check and record a run.
    /// Returns Ok(()) if allowed, Err(wait_duration) if the last run was too recent.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut last_run = self.last_run.lock().unwrap();
        if let Some(last) = *last_run {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Err(self.min_interval - elapsed);
            }
        }
        *last_run = Some(now);
        Ok(())
    }

    /// Record a run that bypassed the check.
    pub fn mark_run(&self) {
        *self.last_run.lock().unwrap() = Some(Instant::now());
    }

    /// Reset state (for testing or manual override).
    pub fn reset(&self) {
        *self.last_run.lock().unwrap() = None;
    }
}

impl Default for ScanRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_second_run_within_floor_is_rejected() {
        let limiter = ScanRateLimiter::new(Duration::from_secs(5));
        assert!(limiter.try_acquire().is_ok());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.try_acquire(), Err(Duration::from_secs(3)));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_attempts_do_not_extend_the_window() {
        let limiter = ScanRateLimiter::new(Duration::from_secs(5));
        limiter.try_acquire().unwrap();
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(limiter.try_acquire().is_err());
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_allows_immediate_run() {
        let limiter = ScanRateLimiter::default();
        limiter.try_acquire().unwrap();
        limiter.reset();
        assert!(limiter.try_acquire().is_ok());
        limiter.mark_run();
        assert!(limiter.try_acquire().is_err());
    }
}
