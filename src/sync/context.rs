use super::cache::ResultCache;
use super::errors::FetchErrorAggregator;
use crate::clock::{Clock, SystemClock};
use crate::store::DocumentStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared collaborators handed to every synchronizer of a session.
///
/// Cancelling `cancellation_token` stops every synchronizer created from this context.
#[derive(Clone)]
pub struct SyncContext {
    /// Token cancelled on session teardown.
    pub cancellation_token: CancellationToken,

    /// Document store all fetches go through.
    pub store: Arc<dyn DocumentStore>,

    /// Snapshot cache shared by the session's synchronizers.
    pub cache: Arc<ResultCache>,

    /// Failing-source tracker shared by the session's synchronizers.
    pub errors: Arc<FetchErrorAggregator>,

    pub clock: Arc<dyn Clock>,
}

impl SyncContext {
    pub fn new(
        cancellation_token: CancellationToken,
        store: Arc<dyn DocumentStore>,
        cache: Arc<ResultCache>,
        errors: Arc<FetchErrorAggregator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cancellation_token,
            store,
            cache,
            errors,
            clock,
        }
    }

    /// Fresh cache and aggregator, system clock, independent token.
    pub fn standalone(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(
            CancellationToken::new(),
            store,
            Arc::new(ResultCache::new()),
            Arc::new(FetchErrorAggregator::default()),
            Arc::new(SystemClock),
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
