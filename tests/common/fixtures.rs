//! Store seeding and engine construction helpers

use super::constants::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use schoolhub_sync::config::SyncSettings;
use schoolhub_sync::entities::{map_records, Assignment, Submission, UserRole};
use schoolhub_sync::notifications::{
    Notification, NotificationScanEngine, NotificationService, ScanSettings, ScannerIdentity,
};
use schoolhub_sync::store::{collections, Fields};
use schoolhub_sync::{Clock, DocumentStore, ManualClock, MemoryDocumentStore, QueryDescriptor};
use serde_json::{json, Value};
use std::sync::Arc;

/// Fixed "now" shared by every test: 2024-05-16 12:00:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 16, 12, 0, 0).unwrap()
}

pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

/// The ways a date can be stored.
#[derive(Debug, Clone, Copy)]
pub enum DateEncoding {
    /// `{"seconds", "nanoseconds"}`
    Native,
    /// `{"_seconds", "_nanoseconds"}`
    Serialized,
    Iso,
    EpochMillis,
}

pub fn encode_date(date: DateTime<Utc>, encoding: DateEncoding) -> Value {
    match encoding {
        DateEncoding::Native => json!({
            "seconds": date.timestamp(),
            "nanoseconds": date.timestamp_subsec_nanos(),
        }),
        DateEncoding::Serialized => json!({
            "_seconds": date.timestamp(),
            "_nanoseconds": date.timestamp_subsec_nanos(),
        }),
        DateEncoding::Iso => json!(date.to_rfc3339()),
        DateEncoding::EpochMillis => json!(date.timestamp_millis()),
    }
}

/// Users, two classes and their memberships. No assignments or submissions.
pub fn seed_school(store: &MemoryDocumentStore) {
    for (id, name, role) in [
        (TEACHER_ID, "Ada Teacher", "teacher"),
        (OTHER_TEACHER_ID, "Bob Teacher", "teacher"),
        (STUDENT_1_ID, "Cleo Student", "student"),
        (STUDENT_2_ID, "Dan Student", "student"),
        (ADMIN_ID, "Eve Admin", "admin"),
    ] {
        store.insert(
            collections::USERS,
            id,
            fields(json!({
                "name": name,
                "email": format!("{}@school.test", id),
                "role": role,
                "createdAt": "2024-01-10T08:00:00Z",
            })),
        );
    }

    store.insert(
        collections::CLASSES,
        CLASS_1_ID,
        fields(json!({"name": CLASS_1_NAME, "teacherId": TEACHER_ID})),
    );
    store.insert(
        collections::CLASSES,
        CLASS_2_ID,
        fields(json!({"name": CLASS_2_NAME, "teacherId": OTHER_TEACHER_ID})),
    );

    for (id, student_id) in [("m-1", STUDENT_1_ID), ("m-2", STUDENT_2_ID)] {
        store.insert(
            collections::MEMBERSHIPS,
            id,
            fields(json!({
                "classId": CLASS_1_ID,
                "studentId": student_id,
                "joinedAt": {"_seconds": 1_704_873_600, "_nanoseconds": 0},
            })),
        );
    }
}

/// Assignment in CLASS_1 owned by `teacher_id`, due `due_in` after `fixed_now()`.
pub fn insert_assignment(
    store: &MemoryDocumentStore,
    id: &str,
    teacher_id: &str,
    due_in: Duration,
    encoding: DateEncoding,
) {
    store.insert(
        collections::ASSIGNMENTS,
        id,
        fields(json!({
            "classId": CLASS_1_ID,
            "className": CLASS_1_NAME,
            "teacherId": teacher_id,
            "title": format!("Assignment {}", id),
            "dueDate": encode_date(fixed_now() + due_in, encoding),
            "createdAt": encode_date(fixed_now() - Duration::days(2), DateEncoding::Iso),
        })),
    );
}

pub fn insert_submission(store: &MemoryDocumentStore, id: &str, assignment_id: &str, student_id: &str) {
    store.insert(
        collections::SUBMISSIONS,
        id,
        fields(json!({
            "assignmentId": assignment_id,
            "studentId": student_id,
            "studentName": format!("Student {}", student_id),
            "classId": CLASS_1_ID,
            "submittedAt": encode_date(fixed_now() - Duration::hours(1), DateEncoding::Native),
        })),
    );
}

pub async fn load_assignments(store: &MemoryDocumentStore) -> Vec<Assignment> {
    let records = store
        .fetch(&QueryDescriptor::collection(collections::ASSIGNMENTS))
        .await
        .unwrap();
    map_records(records)
}

pub async fn load_submissions(store: &MemoryDocumentStore) -> Vec<Submission> {
    let records = store
        .fetch(&QueryDescriptor::collection(collections::SUBMISSIONS))
        .await
        .unwrap();
    map_records(records)
}

/// Every stored notification, bypassing failure simulation.
pub fn stored_notifications(store: &MemoryDocumentStore) -> Vec<Notification> {
    map_records(store.records(collections::NOTIFICATIONS))
}

/// A scan engine wired to an in-memory store and a manual clock pinned at `fixed_now()`.
pub struct ScanHarness {
    pub store: Arc<MemoryDocumentStore>,
    pub clock: Arc<ManualClock>,
    pub service: Arc<NotificationService>,
    pub engine: Arc<NotificationScanEngine>,
}

impl ScanHarness {
    pub fn new(user_id: &str, role: UserRole) -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_school(&store);
        Self::with_store(store, user_id, role)
    }

    pub fn teacher() -> Self {
        Self::new(TEACHER_ID, UserRole::Teacher)
    }

    pub fn student(student_id: &str) -> Self {
        Self::new(student_id, UserRole::Student)
    }

    /// Fresh engine (and ledger) over an existing store, as after a reload.
    pub fn with_store(store: Arc<MemoryDocumentStore>, user_id: &str, role: UserRole) -> Self {
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let service = Arc::new(NotificationService::new(store.clone(), dyn_clock.clone()));
        let engine = Arc::new(NotificationScanEngine::new(
            ScannerIdentity::new(user_id, role),
            service.clone(),
            dyn_clock,
            ScanSettings::default(),
        ));
        Self {
            store,
            clock,
            service,
            engine,
        }
    }

    /// Current assignments and submissions, straight from the store.
    pub async fn snapshot(&self) -> (Vec<Assignment>, Vec<Submission>) {
        (
            load_assignments(&self.store).await,
            load_submissions(&self.store).await,
        )
    }
}

/// Session settings with the defaults used across the suite.
pub fn test_settings() -> SyncSettings {
    SyncSettings::default()
}

/// Let spawned tasks run without reaching the next poll tick.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}
