//! Notification scan engine.
//!
//! Evaluates the watched conditions (new submissions on my assignments, assignments due
//! soon) against the latest polled snapshots and creates at most one notification per
//! condition instance. Each candidate goes through the same protocol:
//!
//! 1. claim its dedup key in the [`IdempotencyLedger`] (already claimed: skip),
//! 2. ask the store whether a record or dismissal already exists,
//! 3. create the record if not,
//! 4. confirm the claim on success, release it on any failure so a later scan retries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::entities::{Assignment, Submission, UserRole};
use crate::sync::{IntervalTicker, PeriodicTask, SyncSnapshot, Ticker};

use super::ledger::IdempotencyLedger;
use super::models::NewNotification;
use super::rate_limit::{ScanRateLimiter, DEFAULT_SCAN_MIN_INTERVAL};
use super::service::NotificationService;

/// Default look-ahead for due date reminders.
pub fn default_reminder_window() -> chrono::Duration {
    chrono::Duration::hours(24)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Minimum spacing between two sweeps.
    pub min_interval: Duration,
    /// How far ahead of the due date a reminder is created.
    pub reminder_window: chrono::Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_SCAN_MIN_INTERVAL,
            reminder_window: default_reminder_window(),
        }
    }
}

/// Whose point of view a scan is evaluated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerIdentity {
    pub user_id: String,
    pub role: UserRole,
}

impl ScannerIdentity {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Counters of one completed sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Condition instances found satisfied
    pub evaluated: usize,
    pub created: usize,
    /// The store already had a record (or dismissal) for the key
    pub already_present: usize,
    /// The ledger already held the key; no store round trip
    pub short_circuited: usize,
    /// Existence check or write failed; the key stays retryable
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Rate limited; the sweep did not run.
    Skipped { retry_in: Duration },
    Completed(ScanReport),
}

impl ScanOutcome {
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            ScanOutcome::Completed(report) => Some(report),
            ScanOutcome::Skipped { .. } => None,
        }
    }
}

/// Idempotent notification scanner for one user.
///
/// Owns its ledger and rate limiter; both live exactly as long as the engine. The engine is
/// meant to be shared (`Arc`) by every task that wants to trigger scans.
pub struct NotificationScanEngine {
    identity: ScannerIdentity,
    settings: ScanSettings,
    ledger: IdempotencyLedger,
    limiter: ScanRateLimiter,
    service: Arc<NotificationService>,
    clock: Arc<dyn Clock>,
}

impl NotificationScanEngine {
    pub fn new(
        identity: ScannerIdentity,
        service: Arc<NotificationService>,
        clock: Arc<dyn Clock>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            identity,
            limiter: ScanRateLimiter::new(settings.min_interval),
            settings,
            ledger: IdempotencyLedger::new(),
            service,
            clock,
        }
    }

    pub fn identity(&self) -> &ScannerIdentity {
        &self.identity
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Read-only view of the session ledger.
    pub fn ledger(&self) -> &IdempotencyLedger {
        &self.ledger
    }

    /// Rate-limited sweep.
    pub async fn scan(&self, assignments: &[Assignment], submissions: &[Submission]) -> ScanOutcome {
        if let Err(retry_in) = self.limiter.try_acquire() {
            debug!(
                "Skipping notification scan for {}, next allowed in {:?}",
                self.identity.user_id, retry_in
            );
            return ScanOutcome::Skipped { retry_in };
        }
        ScanOutcome::Completed(self.sweep(assignments, submissions).await)
    }

    /// Sweep now regardless of the rate limiter (after a local write, for example).
    pub async fn force_scan(&self, assignments: &[Assignment], submissions: &[Submission]) -> ScanReport {
        self.limiter.mark_run();
        self.sweep(assignments, submissions).await
    }

    /// Every notification the current snapshots call for, before deduplication.
    pub fn candidates(
        &self,
        assignments: &[Assignment],
        submissions: &[Submission],
    ) -> Vec<NewNotification> {
        let now = self.clock.now();
        let user_id = self.identity.user_id.as_str();
        let mut candidates = Vec::new();

        match self.identity.role {
            UserRole::Teacher => {
                let owned: Vec<&Assignment> = assignments
                    .iter()
                    .filter(|a| a.teacher_id == user_id)
                    .collect();
                for assignment in &owned {
                    for submission in submissions
                        .iter()
                        .filter(|s| s.assignment_id == assignment.id)
                    {
                        candidates.push(NewNotification::new_submission(assignment, submission));
                    }
                }
                for assignment in owned {
                    if self.is_due_soon(assignment, now) {
                        candidates.push(NewNotification::due_date_reminder(user_id, assignment));
                    }
                }
            }
            UserRole::Student => {
                let submitted: HashSet<&str> = submissions
                    .iter()
                    .filter(|s| s.student_id == user_id)
                    .map(|s| s.assignment_id.as_str())
                    .collect();
                for assignment in assignments {
                    if !submitted.contains(assignment.id.as_str())
                        && self.is_due_soon(assignment, now)
                    {
                        candidates.push(NewNotification::due_date_reminder(user_id, assignment));
                    }
                }
            }
            UserRole::Admin => {}
        }
        candidates
    }

    fn is_due_soon(&self, assignment: &Assignment, now: chrono::DateTime<chrono::Utc>) -> bool {
        let remaining = assignment.due_date - now;
        remaining > chrono::Duration::zero() && remaining <= self.settings.reminder_window
    }

    async fn sweep(&self, assignments: &[Assignment], submissions: &[Submission]) -> ScanReport {
        let mut report = ScanReport::default();
        for candidate in self.candidates(assignments, submissions) {
            report.evaluated += 1;
            self.process(candidate, &mut report).await;
        }

        if report.created > 0 || report.failed > 0 {
            info!(
                "Notification scan for {}: {} created, {} failed, {} already present",
                self.identity.user_id, report.created, report.failed, report.already_present
            );
        } else {
            debug!("Notification scan for {}: {:?}", self.identity.user_id, report);
        }
        report
    }

    async fn process(&self, candidate: NewNotification, report: &mut ScanReport) {
        let key = candidate.dedup_key();
        let Some(claim) = self.ledger.claim(&key) else {
            report.short_circuited += 1;
            return;
        };

        match self.service.exists(&key).await {
            Ok(true) => {
                claim.confirm();
                report.already_present += 1;
            }
            Ok(false) => {
                let kind = candidate.notification_type;
                let recipient = candidate.recipient_id().to_string();
                match self.service.create(candidate).await {
                    Ok(id) => {
                        claim.confirm();
                        info!("Created {} notification {} for {}", kind, id, recipient);
                        report.created += 1;
                    }
                    Err(e) => {
                        // Dropping the claim releases the key for the next scan
                        warn!("Failed to create {} notification for {}: {}", kind, recipient, e);
                        report.failed += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Existence check for notification {} failed: {}", key, e);
                report.failed += 1;
            }
        }
    }

    /// Scan whenever either input snapshot changes, and on a periodic tick.
    ///
    /// Change-triggered scans still go through the rate limiter; a change that lands inside
    /// the floor is picked up by the next tick. The task stops when `cancel` fires or either
    /// input synchronizer goes away.
    pub fn spawn_watch(
        self: &Arc<Self>,
        mut assignments: watch::Receiver<SyncSnapshot<Assignment>>,
        mut submissions: watch::Receiver<SyncSnapshot<Submission>>,
        cancel: &CancellationToken,
    ) -> PeriodicTask {
        let engine = self.clone();
        PeriodicTask::spawn(cancel, move |cancel| async move {
            let mut ticker = IntervalTicker::new(engine.settings.min_interval);
            debug!("Starting notification scan loop for {}", engine.identity.user_id);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = assignments.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = submissions.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {}
                }

                let current_assignments = assignments.borrow_and_update().clone();
                let current_submissions = submissions.borrow_and_update().clone();
                // An unloaded source reads as empty, which would look like nothing was submitted
                if current_assignments.data.is_none() || current_submissions.data.is_none() {
                    debug!(
                        "Skipping scan for {} until assignments and submissions have loaded",
                        engine.identity.user_id
                    );
                    continue;
                }
                engine
                    .scan(current_assignments.items(), current_submissions.items())
                    .await;
            }
            debug!("Notification scan loop for {} stopped", engine.identity.user_id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notifications::NotificationType;
    use crate::store::MemoryDocumentStore;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 16, 12, 0, 0).unwrap()
    }

    fn engine(role: UserRole, user_id: &str) -> NotificationScanEngine {
        let store = Arc::new(MemoryDocumentStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now()));
        let service = Arc::new(NotificationService::new(store, clock.clone()));
        NotificationScanEngine::new(
            ScannerIdentity::new(user_id, role),
            service,
            clock,
            ScanSettings::default(),
        )
    }

    fn assignment(id: &str, teacher_id: &str, due_in: chrono::Duration) -> Assignment {
        Assignment {
            id: id.to_string(),
            class_id: "c-1".to_string(),
            class_name: "Biology".to_string(),
            teacher_id: teacher_id.to_string(),
            title: format!("Assignment {}", id),
            due_date: now() + due_in,
            created_at: None,
        }
    }

    fn submission(assignment_id: &str, student_id: &str) -> Submission {
        Submission {
            id: format!("{}-{}", assignment_id, student_id),
            assignment_id: assignment_id.to_string(),
            student_id: student_id.to_string(),
            student_name: student_id.to_uppercase(),
            class_id: None,
            submitted_at: now(),
            grade: None,
            feedback: None,
        }
    }

    #[test]
    fn test_teacher_candidates_cover_only_owned_assignments() {
        let engine = engine(UserRole::Teacher, "t-1");
        let assignments = vec![
            assignment("a-1", "t-1", chrono::Duration::hours(10)),
            assignment("a-2", "t-2", chrono::Duration::hours(10)),
            assignment("a-3", "t-1", chrono::Duration::days(3)),
        ];
        let submissions = vec![submission("a-1", "st-1"), submission("a-2", "st-1")];

        let candidates = engine.candidates(&assignments, &submissions);
        let kinds: Vec<_> = candidates
            .iter()
            .map(|c| (c.notification_type, c.refs.assignment_id.clone().unwrap()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (NotificationType::NewSubmission, "a-1".to_string()),
                (NotificationType::DueDateReminder, "a-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_student_reminders_skip_submitted_work() {
        let engine = engine(UserRole::Student, "st-1");
        let assignments = vec![
            assignment("a-1", "t-1", chrono::Duration::hours(5)),
            assignment("a-2", "t-1", chrono::Duration::hours(5)),
        ];
        let submissions = vec![submission("a-1", "st-1"), submission("a-2", "st-2")];

        let candidates = engine.candidates(&assignments, &submissions);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].refs.assignment_id.as_deref(), Some("a-2"));
        assert_eq!(candidates[0].recipient_id(), "st-1");
    }

    #[test]
    fn test_admin_scans_produce_nothing() {
        let engine = engine(UserRole::Admin, "ad-1");
        let assignments = vec![assignment("a-1", "t-1", chrono::Duration::hours(1))];
        assert!(engine
            .candidates(&assignments, &[submission("a-1", "st-1")])
            .is_empty());
    }

    #[test]
    fn test_window_boundaries() {
        let engine = engine(UserRole::Teacher, "t-1");
        let due = |d| vec![assignment("a-1", "t-1", d)];

        assert_eq!(engine.candidates(&due(chrono::Duration::hours(24)), &[]).len(), 1);
        assert!(engine
            .candidates(&due(chrono::Duration::hours(24) + chrono::Duration::seconds(1)), &[])
            .is_empty());
        assert!(engine.candidates(&due(chrono::Duration::zero()), &[]).is_empty());
        assert!(engine.candidates(&due(-chrono::Duration::hours(1)), &[]).is_empty());
    }
}
