//! Notification service for creating and managing notification records

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::entities::{map_records, to_stored_timestamp, Assignment, Notice, Submission};
use crate::store::{collections, DocumentStore, Fields, QueryDescriptor, StoreError};
use crate::sync::RefreshHandle;

use super::models::{DedupKey, NewNotification, Notification};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NotificationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Submission {0} has no grade yet")]
    NotGraded(String),
}

/// Result of an existence-checked creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(String),
    /// A record (or a dismissal) with the same dedup key already exists.
    AlreadyPresent,
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Write path for notification records.
///
/// Every successful write pokes the notification synchronizer (when one is attached) so the
/// list reflects it without waiting for the next tick.
pub struct NotificationService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    refresh: Option<RefreshHandle>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            refresh: None,
        }
    }

    /// Attach the refresh trigger of the notification list synchronizer.
    pub fn with_refresh(mut self, refresh: RefreshHandle) -> Self {
        self.refresh = Some(refresh);
        self
    }

    fn notify_changed(&self) {
        if let Some(refresh) = &self.refresh {
            refresh.refresh();
        }
    }

    /// Authoritative check: does a record, or a dismissal, exist for `key`?
    pub async fn exists(&self, key: &DedupKey) -> Result<bool, NotificationError> {
        let existing = QueryDescriptor::collection(collections::NOTIFICATIONS)
            .where_eq("dedupKey", key.as_str())
            .limit(1);
        if !self.store.fetch(&existing).await?.is_empty() {
            return Ok(true);
        }

        let dismissed = QueryDescriptor::collection(collections::NOTIFICATION_DISMISSALS)
            .where_eq("dedupKey", key.as_str())
            .limit(1);
        Ok(!self.store.fetch(&dismissed).await?.is_empty())
    }

    /// Write a notification record unconditionally. Returns the new record id.
    pub async fn create(&self, notification: NewNotification) -> Result<String, NotificationError> {
        let fields = notification.into_fields(self.clock.now());
        let id = self
            .store
            .create(collections::NOTIFICATIONS, fields)
            .await?;
        self.notify_changed();
        Ok(id)
    }

    /// Write a notification record unless one with the same dedup key exists.
    pub async fn create_if_absent(
        &self,
        notification: NewNotification,
    ) -> Result<CreateOutcome, NotificationError> {
        if self.exists(&notification.dedup_key()).await? {
            return Ok(CreateOutcome::AlreadyPresent);
        }
        self.create(notification).await.map(CreateOutcome::Created)
    }

    /// Notify every enrolled student about a newly created assignment.
    ///
    /// Safe to call again after a partial failure: already notified students are skipped.
    pub async fn notify_assignment_created(
        &self,
        assignment: &Assignment,
        student_ids: &[String],
    ) -> Result<usize, NotificationError> {
        let mut created = 0;
        for student_id in student_ids {
            let outcome = self
                .create_if_absent(NewNotification::assignment_created(student_id, assignment))
                .await?;
            if outcome.is_created() {
                created += 1;
            }
        }
        info!(
            "Notified {} of {} students about assignment {}",
            created,
            student_ids.len(),
            assignment.id
        );
        Ok(created)
    }

    /// Notify a student that their submission was graded.
    pub async fn notify_assignment_graded(
        &self,
        assignment: &Assignment,
        submission: &Submission,
    ) -> Result<CreateOutcome, NotificationError> {
        if !submission.is_graded() {
            return Err(NotificationError::NotGraded(submission.id.clone()));
        }
        self.create_if_absent(NewNotification::assignment_graded(assignment, submission))
            .await
    }

    /// Notify every enrolled student about a new class notice.
    pub async fn notify_new_notice(
        &self,
        notice: &Notice,
        student_ids: &[String],
    ) -> Result<usize, NotificationError> {
        let mut created = 0;
        for student_id in student_ids {
            let outcome = self
                .create_if_absent(NewNotification::new_notice(student_id, notice))
                .await?;
            if outcome.is_created() {
                created += 1;
            }
        }
        info!(
            "Notified {} of {} students about notice {}",
            created,
            student_ids.len(),
            notice.id
        );
        Ok(created)
    }

    /// Every notification of `user_id`, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        let query = QueryDescriptor::collection(collections::NOTIFICATIONS)
            .where_eq("userId", user_id)
            .order_by("createdAt", crate::store::SortDirection::Desc);
        let records = self.store.fetch(&query).await?;
        Ok(map_records(records))
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<(), NotificationError> {
        let mut fields = Fields::new();
        fields.insert("read".to_string(), true.into());
        self.store
            .update(collections::NOTIFICATIONS, notification_id, fields)
            .await?;
        self.notify_changed();
        Ok(())
    }

    /// Mark every unread notification of `user_id` as read. Returns how many changed.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationError> {
        let unread = QueryDescriptor::collection(collections::NOTIFICATIONS)
            .where_eq("userId", user_id)
            .where_eq("read", false);
        let records = self.store.fetch(&unread).await?;

        let mut updated = 0;
        for record in &records {
            let mut fields = Fields::new();
            fields.insert("read".to_string(), true.into());
            self.store
                .update(collections::NOTIFICATIONS, &record.id, fields)
                .await?;
            updated += 1;
        }
        if updated > 0 {
            self.notify_changed();
        }
        debug!("Marked {} notifications read for {}", updated, user_id);
        Ok(updated)
    }

    /// Delete one notification.
    ///
    /// Dedup-keyed notifications leave a dismissal behind so the condition that produced
    /// them never re-fires.
    pub async fn delete(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.remove(notification).await?;
        self.notify_changed();
        Ok(())
    }

    /// Delete every notification of `user_id`. Returns how many were removed.
    pub async fn clear_all(&self, user_id: &str) -> Result<usize, NotificationError> {
        let notifications = self.list(user_id).await?;
        for notification in &notifications {
            self.remove(notification).await?;
        }
        if !notifications.is_empty() {
            self.notify_changed();
        }
        info!("Cleared {} notifications for {}", notifications.len(), user_id);
        Ok(notifications.len())
    }

    async fn remove(&self, notification: &Notification) -> Result<(), NotificationError> {
        if let Some(dedup_key) = &notification.dedup_key {
            let mut fields = Fields::new();
            fields.insert("dedupKey".to_string(), dedup_key.as_str().into());
            fields.insert("userId".to_string(), notification.user_id.as_str().into());
            fields.insert(
                "dismissedAt".to_string(),
                to_stored_timestamp(&self.clock.now()),
            );
            // Dismissal first: a failed delete must not allow the notification to come back
            self.store
                .create(collections::NOTIFICATION_DISMISSALS, fields)
                .await?;
        }
        self.store
            .delete(collections::NOTIFICATIONS, &notification.id)
            .await?;
        Ok(())
    }

    pub fn unread_count(notifications: &[Notification]) -> usize {
        notifications.iter().filter(|n| !n.read).count()
    }
}
