//! Tick sources and task lifecycle for polling loops.
//!
//! Polling is the current way of faking push: a [`Ticker`] decides when the next fetch
//! happens, and [`IntervalTicker`] is the production source. A real push subscription
//! would plug in as another `Ticker`.

use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Source of "time to fetch again" signals.
#[async_trait]
pub trait Ticker: Send + 'static {
    /// Resolve at the next tick.
    async fn tick(&mut self);
}

/// Fixed-period ticker. The first tick resolves immediately.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A slow fetch delays the schedule instead of causing a burst of catch-up ticks
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// A spawned loop together with the token that stops it.
///
/// Dropping the handle cancels the loop, so a torn-down owner never leaves a timer behind.
pub struct PeriodicTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `body` with a token that is cancelled by [`stop`](Self::stop), by drop, or by
    /// cancellation of `parent`.
    pub fn spawn<F, Fut>(parent: &CancellationToken, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let handle = tokio::spawn(body(cancel.clone()));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
