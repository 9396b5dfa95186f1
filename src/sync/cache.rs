//! Local result cache.
//!
//! Keeps the last good result set of every cached query so a synchronizer re-created for
//! the same query (a view remounting) can show data immediately, flagged as stale, instead
//! of an empty state while its first fetch is in flight.

use crate::store::QueryKey;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One snapshot of a query's mapped results.
///
/// Replaced wholesale on every change; never patched in place.
#[derive(Debug)]
pub struct CachedResultSet<T> {
    pub query_key: QueryKey,
    pub items: Vec<T>,
    pub fetched_at: DateTime<Utc>,
    /// Served from the cache and not yet confirmed by a fetch of this synchronizer.
    pub stale: bool,
}

impl<T> CachedResultSet<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> CachedResultSet<T> {
    fn stale_copy(&self) -> Self {
        Self {
            query_key: self.query_key.clone(),
            items: self.items.clone(),
            fetched_at: self.fetched_at,
            stale: true,
        }
    }
}

type ErasedSet = Arc<dyn Any + Send + Sync>;

/// Snapshot store keyed by query identity.
///
/// Only synchronizers write to it; consumers read through their synchronizer.
#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<QueryKey, ErasedSet>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    /// Cached snapshot for `key`, if one of the right entity type exists.
    pub(crate) fn get<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
    ) -> Option<Arc<CachedResultSet<T>>> {
        let entry = self.entries.lock().unwrap().get(key).cloned()?;
        entry.downcast::<CachedResultSet<T>>().ok()
    }

    /// Stale copy of the cached snapshot, used to seed a freshly started synchronizer.
    pub(crate) fn seed<T: Clone + Send + Sync + 'static>(
        &self,
        key: &QueryKey,
    ) -> Option<Arc<CachedResultSet<T>>> {
        self.get::<T>(key).map(|set| Arc::new(set.stale_copy()))
    }

    pub(crate) fn put<T: Send + Sync + 'static>(&self, set: Arc<CachedResultSet<T>>) {
        let key = set.query_key.clone();
        self.entries.lock().unwrap().insert(key, set);
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
