//! Document store collaborator.
//!
//! The store itself is external to the synchronization core; this module defines the
//! interface the core consumes ([`DocumentStore`]), the query descriptors used as cache
//! identities, and two concrete backends.

mod filter;
mod memory_store;
mod query;
mod schema;
mod sqlite_store;
mod trait_def;

pub use filter::{apply_query, matches_filter};
pub use memory_store::MemoryDocumentStore;
pub use query::{Filter, FilterOp, OrderBy, QueryDescriptor, QueryKey, SortDirection};
pub use schema::DOCUMENTS_VERSIONED_SCHEMAS;
pub use sqlite_store::SqliteDocumentStore;
pub use trait_def::{DocumentStore, Fields, RawRecord, StoreError};

#[cfg(feature = "mock")]
pub use trait_def::MockDocumentStore;

/// Collection names used by the school application.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CLASSES: &str = "classes";
    pub const MEMBERSHIPS: &str = "memberships";
    pub const ASSIGNMENTS: &str = "assignments";
    pub const SUBMISSIONS: &str = "submissions";
    pub const NOTICES: &str = "notices";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const NOTIFICATION_DISMISSALS: &str = "notification_dismissals";
}
