//! DocumentStore trait definition.
//!
//! The synchronization core only ever talks to the store through this trait, so the
//! backing service can be swapped (in-memory for tests, SQLite for the binary) without
//! touching synchronizers or the notification engine.

use super::query::QueryDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// A record as returned by the store, before mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub fields: Fields,
}

impl RawRecord {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Errors surfaced by a store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Expected for some cross-tenant reads.
    #[error("Permission denied on {0}")]
    PermissionDenied(String),

    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied(_))
    }
}

/// Trait for document store backends.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every record matching `query`, filtered, ordered and limited.
    async fn fetch(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, StoreError>;

    /// Create a document and return its generated id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Merge `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}
