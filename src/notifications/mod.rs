//! Notification records: models, the write path, and the idempotent scan engine.

mod ledger;
mod models;
mod rate_limit;
mod scan;
mod service;

pub use ledger::{IdempotencyLedger, LedgerClaim, LedgerState};
pub use models::{DedupKey, NewNotification, Notification, NotificationType, SubjectRefs};
pub use rate_limit::{ScanRateLimiter, DEFAULT_SCAN_MIN_INTERVAL};
pub use scan::{
    default_reminder_window, NotificationScanEngine, ScanOutcome, ScanReport, ScanSettings,
    ScannerIdentity,
};
pub use service::{CreateOutcome, NotificationError, NotificationService};
