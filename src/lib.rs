//! SchoolHub live-data synchronization library
//!
//! Polling synchronizers over the school document store, the local result cache that keeps
//! their snapshots stable, and the idempotent notification scan engine built on top of them.

pub mod clock;
pub mod config;
pub mod entities;
pub mod notifications;
pub mod session;
pub mod sqlite_persistence;
pub mod store;
pub mod sync;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use notifications::{NotificationScanEngine, NotificationService};
pub use session::SyncSession;
pub use store::{DocumentStore, MemoryDocumentStore, QueryDescriptor, SqliteDocumentStore};
pub use sync::{PollingSynchronizer, SyncOptions};
