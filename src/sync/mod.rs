//! Polling-based live data.
//!
//! A [`PollingSynchronizer`] keeps one query's results fresh by re-fetching on a timer,
//! publishing new snapshots only when the mapped data changed. Synchronizers of one session
//! share a [`SyncContext`]: the store, the [`ResultCache`], the [`FetchErrorAggregator`] and
//! the cancellation token that tears them all down.

mod cache;
mod context;
mod errors;
pub mod queries;
mod scheduler;
mod synchronizer;

pub use cache::{CachedResultSet, ResultCache};
pub use context::SyncContext;
pub use errors::{FetchErrorAggregator, OwnerId, SyncError, DEFAULT_ERROR_SURFACE_THRESHOLD};
pub use scheduler::{IntervalTicker, PeriodicTask, Ticker};
pub use synchronizer::{
    PollingSynchronizer, RefreshHandle, SyncOptions, SyncSnapshot, DEFAULT_POLL_INTERVAL,
};
