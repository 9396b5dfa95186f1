//! Fetch error surfacing.
//!
//! A single failing source is logged but not shown to the user. Only when at least
//! `threshold` sources are failing at the same time does the aggregator produce a
//! user-facing [`SyncError::Aggregate`].

use crate::store::{QueryKey, StoreError};
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// One query's fetch failed.
    #[error("Failed to fetch {query}: {message}")]
    Fetch { query: QueryKey, message: String },

    /// Several sources are failing at once.
    #[error("{message}")]
    Aggregate {
        failing: Vec<QueryKey>,
        message: String,
    },
}

impl SyncError {
    pub fn fetch(query: &QueryKey, err: &StoreError) -> Self {
        SyncError::Fetch {
            query: query.clone(),
            message: err.to_string(),
        }
    }
}

/// Default number of concurrently failing sources before an error is shown.
pub const DEFAULT_ERROR_SURFACE_THRESHOLD: usize = 2;

/// Identifies one watcher of a source. Two synchronizers polling the same query report
/// under different owners, so one of them recovering or stopping never hides the other.
pub type OwnerId = u64;

/// Tracks which sources are currently failing.
pub struct FetchErrorAggregator {
    threshold: usize,
    failing: Mutex<BTreeMap<(QueryKey, OwnerId), SyncError>>,
}

impl Default for FetchErrorAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_SURFACE_THRESHOLD)
    }
}

impl FetchErrorAggregator {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            failing: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn record_failure(&self, owner: OwnerId, error: SyncError) {
        let key = match &error {
            SyncError::Fetch { query, .. } => query.clone(),
            // Aggregates are derived, never recorded
            SyncError::Aggregate { .. } => return,
        };
        self.failing.lock().unwrap().insert((key, owner), error);
    }

    /// `owner`'s view of the source recovered, or it stopped watching it.
    pub fn clear(&self, owner: OwnerId, source: &QueryKey) {
        self.failing
            .lock()
            .unwrap()
            .remove(&(source.clone(), owner));
    }

    /// Distinct failing sources, however many owners report each.
    pub fn failing_sources(&self) -> Vec<QueryKey> {
        let failing = self.failing.lock().unwrap();
        Self::distinct_sources(&failing)
    }

    /// The error to show the user, if enough sources are failing.
    pub fn user_facing_error(&self) -> Option<SyncError> {
        let failing = self.failing.lock().unwrap();
        let sources = Self::distinct_sources(&failing);
        if sources.len() < self.threshold {
            return None;
        }
        let message = format!(
            "Unable to load data: {} sources are failing to sync",
            sources.len()
        );
        Some(SyncError::Aggregate {
            failing: sources,
            message,
        })
    }

    fn distinct_sources(failing: &BTreeMap<(QueryKey, OwnerId), SyncError>) -> Vec<QueryKey> {
        let mut sources: Vec<QueryKey> = failing.keys().map(|(key, _)| key.clone()).collect();
        // Keys are ordered by source first, so duplicates are adjacent
        sources.dedup();
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QueryDescriptor;

    fn fetch_error(collection: &str) -> (QueryKey, SyncError) {
        let key = QueryDescriptor::collection(collection).key().clone();
        let err = SyncError::fetch(&key, &StoreError::Unavailable("offline".to_string()));
        (key, err)
    }

    #[test]
    fn test_single_failure_is_not_user_facing() {
        let aggregator = FetchErrorAggregator::default();
        let (key, err) = fetch_error("assignments");
        aggregator.record_failure(1, err);

        assert_eq!(aggregator.failing_sources(), vec![key]);
        assert!(aggregator.user_facing_error().is_none());
    }

    #[test]
    fn test_threshold_failures_surface_one_aggregate() {
        let aggregator = FetchErrorAggregator::default();
        let (_, a) = fetch_error("assignments");
        let (notices, b) = fetch_error("notices");
        aggregator.record_failure(1, a.clone());
        // Repeated failure of the same source counts once
        aggregator.record_failure(1, a.clone());
        aggregator.record_failure(2, a);
        assert!(aggregator.user_facing_error().is_none());

        aggregator.record_failure(1, b);
        match aggregator.user_facing_error() {
            Some(SyncError::Aggregate { failing, .. }) => assert_eq!(failing.len(), 2),
            other => panic!("expected aggregate error, got {:?}", other),
        }

        aggregator.clear(1, &notices);
        assert!(aggregator.user_facing_error().is_none());
    }

    #[test]
    fn test_threshold_of_one_surfaces_immediately() {
        let aggregator = FetchErrorAggregator::new(1);
        let (_, err) = fetch_error("submissions");
        aggregator.record_failure(1, err);
        assert!(aggregator.user_facing_error().is_some());
    }

    #[test]
    fn test_clearing_one_owner_keeps_the_other_failing() {
        let aggregator = FetchErrorAggregator::new(1);
        let (key, err) = fetch_error("submissions");
        aggregator.record_failure(1, err.clone());
        aggregator.record_failure(2, err);

        aggregator.clear(1, &key);
        assert_eq!(aggregator.failing_sources(), vec![key.clone()]);
        assert!(aggregator.user_facing_error().is_some());

        aggregator.clear(2, &key);
        assert!(aggregator.failing_sources().is_empty());
        assert!(aggregator.user_facing_error().is_none());
    }
}
