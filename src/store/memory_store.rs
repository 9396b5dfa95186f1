//! In-memory document store.
//!
//! Backs the test suites and demos. Besides plain storage it can simulate the failure
//! modes the synchronization core has to tolerate: permission-denied reads, an
//! unavailable collection, failing writes and slow fetches.

use super::filter::apply_query;
use super::query::QueryDescriptor;
use super::trait_def::{DocumentStore, Fields, RawRecord, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct MemoryState {
    /// Records per collection, in insertion order
    collections: HashMap<String, Vec<RawRecord>>,
    denied_reads: HashSet<String>,
    unavailable: HashSet<String>,
    failing_writes: HashSet<String>,
    fetch_delay: Option<Duration>,
    fetch_count: usize,
    write_count: usize,
}

pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Insert or replace a document with a caller-chosen id.
    pub fn insert(&self, collection: &str, id: &str, fields: Fields) {
        let mut state = self.state.lock().unwrap();
        let records = state.collections.entry(collection.to_string()).or_default();
        match records.iter_mut().find(|r| r.id == id) {
            Some(existing) => existing.fields = fields,
            None => records.push(RawRecord::new(id, fields)),
        }
    }

    /// Snapshot of a whole collection, bypassing failure simulation.
    pub fn records(&self, collection: &str) -> Vec<RawRecord> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, collection: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.collections.get(collection).map_or(0, Vec::len)
    }

    /// Reads of `collection` fail with `PermissionDenied` until allowed again.
    pub fn deny_reads(&self, collection: &str, denied: bool) {
        let mut state = self.state.lock().unwrap();
        if denied {
            state.denied_reads.insert(collection.to_string());
        } else {
            state.denied_reads.remove(collection);
        }
    }

    /// Reads of `collection` fail with `Unavailable` until restored.
    pub fn set_unavailable(&self, collection: &str, unavailable: bool) {
        let mut state = self.state.lock().unwrap();
        if unavailable {
            state.unavailable.insert(collection.to_string());
        } else {
            state.unavailable.remove(collection);
        }
    }

    /// Writes to `collection` fail with `Backend` until restored.
    pub fn fail_writes(&self, collection: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_writes.insert(collection.to_string());
        } else {
            state.failing_writes.remove(collection);
        }
    }

    /// Delay applied before every fetch resolves.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().fetch_delay = delay;
    }

    /// Number of fetches that reached the store (including failed ones).
    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetch_count
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().write_count
    }

    fn check_writable(state: &MemoryState, collection: &str) -> Result<(), StoreError> {
        if state.failing_writes.contains(collection) {
            return Err(StoreError::Backend(format!(
                "simulated write failure on {}",
                collection
            )));
        }
        Ok(())
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, StoreError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.fetch_count += 1;
            state.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        let collection = query.source();
        if state.denied_reads.contains(collection) {
            return Err(StoreError::PermissionDenied(collection.to_string()));
        }
        if state.unavailable.contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "collection {} is unreachable",
                collection
            )));
        }

        let records = state
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default();
        Ok(apply_query(query, records))
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state, collection)?;

        let id = uuid::Uuid::new_v4().to_string();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(RawRecord::new(id.clone(), fields));
        state.write_count += 1;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state, collection)?;

        let record = state
            .collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (key, value) in fields {
            record.fields.insert(key, value);
        }
        state.write_count += 1;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::check_writable(&state, collection)?;

        if let Some(records) = state.collections.get_mut(collection) {
            records.retain(|r| r.id != id);
        }
        state.write_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_fetch_update_delete() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create("notices", fields(json!({"classId": "c-1", "title": "Trip"})))
            .await
            .unwrap();

        let query = QueryDescriptor::collection("notices").where_eq("classId", "c-1");
        let fetched = store.fetch(&query).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, id);

        store
            .update("notices", &id, fields(json!({"title": "Field trip"})))
            .await
            .unwrap();
        let fetched = store.fetch(&query).await.unwrap();
        assert_eq!(fetched[0].fields["title"], "Field trip");
        assert_eq!(fetched[0].fields["classId"], "c-1");

        store.delete("notices", &id).await.unwrap();
        assert!(store.fetch(&query).await.unwrap().is_empty());
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let result = store.update("notices", "nope", Fields::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_failure_simulation() {
        let store = MemoryDocumentStore::new();
        store.insert("classes", "c-1", fields(json!({"name": "Math"})));
        let query = QueryDescriptor::collection("classes");

        store.deny_reads("classes", true);
        let err = store.fetch(&query).await.unwrap_err();
        assert!(err.is_permission_denied());

        store.deny_reads("classes", false);
        store.set_unavailable("classes", true);
        let err = store.fetch(&query).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_unavailable("classes", false);
        assert_eq!(store.fetch(&query).await.unwrap().len(), 1);

        store.fail_writes("classes", true);
        assert!(store.create("classes", Fields::new()).await.is_err());
        assert_eq!(store.count("classes"), 1);
        assert_eq!(store.fetch_count(), 3);
    }

    #[test]
    fn test_insert_replaces_existing_id() {
        let store = MemoryDocumentStore::new();
        store.insert("users", "u-1", fields(json!({"name": "Ada"})));
        store.insert("users", "u-1", fields(json!({"name": "Ada L."})));
        let records = store.records("users");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields["name"], "Ada L.");
    }
}
