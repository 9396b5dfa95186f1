//! Idempotency ledger.
//!
//! Session-scoped record of which dedup keys a scan engine has already attempted. It is a
//! fast local guard against issuing a second creation attempt for the same key while the
//! first one (or its store round trip) is still in flight. The store stays the source of
//! truth: a missing ledger entry only means "go and check".

use super::models::DedupKey;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    /// A scan is currently checking or creating this key.
    Claimed,
    /// A record for this key is known to exist (or to have been dismissed).
    Confirmed,
}

#[derive(Default)]
pub struct IdempotencyLedger {
    entries: Mutex<HashMap<DedupKey, LedgerState>>,
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `key`.
    ///
    /// Returns `None` if the key is already claimed or confirmed. The returned claim is
    /// released on drop unless [`LedgerClaim::confirm`] is called, so any early return or
    /// failure path leaves the key retryable.
    pub(crate) fn claim(&self, key: &DedupKey) -> Option<LedgerClaim<'_>> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(key) {
            return None;
        }
        entries.insert(key.clone(), LedgerState::Claimed);
        Some(LedgerClaim {
            ledger: self,
            key: key.clone(),
            confirmed: false,
        })
    }

    pub fn state(&self, key: &DedupKey) -> Option<LedgerState> {
        self.entries.lock().unwrap().get(key).copied()
    }

    /// True once a record for `key` is known to exist.
    pub fn is_handled(&self, key: &DedupKey) -> bool {
        self.state(key) == Some(LedgerState::Confirmed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn settle(&self, key: &DedupKey, confirmed: bool) {
        let mut entries = self.entries.lock().unwrap();
        if confirmed {
            entries.insert(key.clone(), LedgerState::Confirmed);
        } else {
            entries.remove(key);
        }
    }
}

/// An in-progress claim on a ledger key.
#[must_use = "dropping a claim releases it immediately"]
pub struct LedgerClaim<'a> {
    ledger: &'a IdempotencyLedger,
    key: DedupKey,
    confirmed: bool,
}

impl LedgerClaim<'_> {
    pub fn key(&self) -> &DedupKey {
        &self.key
    }

    /// Mark the key as handled for the rest of the session.
    pub fn confirm(mut self) {
        self.confirmed = true;
    }
}

impl Drop for LedgerClaim<'_> {
    fn drop(&mut self) {
        self.ledger.settle(&self.key, self.confirmed);
    }
}
