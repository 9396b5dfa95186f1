//! Notification data models

use crate::entities::{
    to_stored_timestamp, Assignment, FieldReader, FromRecord, MapError, Notice, Submission,
};
use crate::store::{Fields, RawRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Notification type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    AssignmentCreated,
    AssignmentGraded,
    DueDateReminder,
    NewNotice,
    NewSubmission,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::AssignmentCreated => "assignment_created",
            NotificationType::AssignmentGraded => "assignment_graded",
            NotificationType::DueDateReminder => "due_date_reminder",
            NotificationType::NewNotice => "new_notice",
            NotificationType::NewSubmission => "new_submission",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assignment_created" => Some(NotificationType::AssignmentCreated),
            "assignment_graded" => Some(NotificationType::AssignmentGraded),
            "due_date_reminder" => Some(NotificationType::DueDateReminder),
            "new_notice" => Some(NotificationType::NewNotice),
            "new_submission" => Some(NotificationType::NewSubmission),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable business identifiers a notification is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubjectRefs {
    pub recipient_id: String,
    pub assignment_id: Option<String>,
    pub student_id: Option<String>,
    pub notice_id: Option<String>,
}

/// Deduplication key: sha256 over the notification type and its subject refs.
///
/// Never includes timestamps, so the same condition instance always yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn compute(notification_type: NotificationType, refs: &SubjectRefs) -> Self {
        let mut hasher = Sha256::new();
        // Each part is tagged and length-prefixed so ids containing separators cannot collide
        let mut part = |value: Option<&str>| match value {
            Some(v) => {
                hasher.update([1u8]);
                hasher.update((v.len() as u64).to_be_bytes());
                hasher.update(v.as_bytes());
            }
            None => hasher.update([0u8]),
        };
        part(Some(notification_type.as_str()));
        part(Some(&refs.recipient_id));
        part(refs.assignment_id.as_deref());
        part(refs.student_id.as_deref());
        part(refs.notice_id.as_deref());
        DedupKey(format!("{:x}", hasher.finalize()))
    }

    pub fn from_stored(value: impl Into<String>) -> Self {
        DedupKey(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored notification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Recipient
    pub user_id: String,
    pub dedup_key: Option<String>,
    pub assignment_id: Option<String>,
    pub assignment_title: Option<String>,
    pub notice_id: Option<String>,
    pub notice_title: Option<String>,
    pub class_id: String,
    pub class_name: String,
    pub teacher_id: Option<String>,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub grade: Option<String>,
    pub feedback: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl FromRecord for Notification {
    const KIND: &'static str = "notification";

    fn from_record(record: &RawRecord) -> Result<Self, MapError> {
        let r = FieldReader::new(Self::KIND, record);
        let kind = r.string("type")?;
        let notification_type =
            NotificationType::parse(&kind).ok_or_else(|| MapError::InvalidField {
                kind: Self::KIND,
                id: record.id.clone(),
                field: "type",
                reason: format!("unknown notification type {}", kind),
            })?;
        Ok(Notification {
            id: r.id(),
            notification_type,
            user_id: r.string("userId")?,
            dedup_key: r.opt_string("dedupKey")?,
            assignment_id: r.opt_string("assignmentId")?,
            assignment_title: r.opt_string("assignmentTitle")?,
            notice_id: r.opt_string("noticeId")?,
            notice_title: r.opt_string("noticeTitle")?,
            class_id: r.opt_string("classId")?.unwrap_or_default(),
            class_name: r.opt_string("className")?.unwrap_or_default(),
            teacher_id: r.opt_string("teacherId")?,
            student_id: r.opt_string("studentId")?,
            student_name: r.opt_string("studentName")?,
            grade: r.opt_text("grade")?,
            feedback: r.opt_string("feedback")?,
            due_date: r.opt_date("dueDate")?,
            created_at: r.date("createdAt")?,
            read: r.bool_or("read", false)?,
        })
    }
}

/// A notification about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub refs: SubjectRefs,
    pub assignment_title: Option<String>,
    pub notice_title: Option<String>,
    pub class_id: String,
    pub class_name: String,
    pub teacher_id: Option<String>,
    pub student_name: Option<String>,
    pub grade: Option<String>,
    pub feedback: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewNotification {
    fn for_assignment(
        notification_type: NotificationType,
        recipient_id: &str,
        assignment: &Assignment,
    ) -> Self {
        Self {
            notification_type,
            refs: SubjectRefs {
                recipient_id: recipient_id.to_string(),
                assignment_id: Some(assignment.id.clone()),
                student_id: None,
                notice_id: None,
            },
            assignment_title: Some(assignment.title.clone()),
            notice_title: None,
            class_id: assignment.class_id.clone(),
            class_name: assignment.class_name.clone(),
            teacher_id: Some(assignment.teacher_id.clone()),
            student_name: None,
            grade: None,
            feedback: None,
            due_date: Some(assignment.due_date),
        }
    }

    /// A student turned in work for an assignment; addressed to its teacher.
    pub fn new_submission(assignment: &Assignment, submission: &Submission) -> Self {
        let mut n = Self::for_assignment(
            NotificationType::NewSubmission,
            &assignment.teacher_id,
            assignment,
        );
        n.refs.student_id = Some(submission.student_id.clone());
        n.student_name = Some(submission.student_name.clone());
        n
    }

    pub fn due_date_reminder(recipient_id: &str, assignment: &Assignment) -> Self {
        Self::for_assignment(NotificationType::DueDateReminder, recipient_id, assignment)
    }

    pub fn assignment_created(student_id: &str, assignment: &Assignment) -> Self {
        Self::for_assignment(NotificationType::AssignmentCreated, student_id, assignment)
    }

    /// Grade posted; addressed to the student. Keyed per (student, assignment), so a
    /// regrade does not produce a second notification.
    pub fn assignment_graded(assignment: &Assignment, submission: &Submission) -> Self {
        let mut n = Self::for_assignment(
            NotificationType::AssignmentGraded,
            &submission.student_id,
            assignment,
        );
        n.refs.student_id = Some(submission.student_id.clone());
        n.grade = submission.grade.clone();
        n.feedback = submission.feedback.clone();
        n
    }

    pub fn new_notice(student_id: &str, notice: &Notice) -> Self {
        Self {
            notification_type: NotificationType::NewNotice,
            refs: SubjectRefs {
                recipient_id: student_id.to_string(),
                assignment_id: None,
                student_id: None,
                notice_id: Some(notice.id.clone()),
            },
            assignment_title: None,
            notice_title: Some(notice.title.clone()),
            class_id: notice.class_id.clone(),
            class_name: notice.class_name.clone(),
            teacher_id: Some(notice.teacher_id.clone()),
            student_name: None,
            grade: None,
            feedback: None,
            due_date: None,
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.refs.recipient_id
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::compute(self.notification_type, &self.refs)
    }

    /// Stored representation, unread.
    pub fn into_fields(self, created_at: DateTime<Utc>) -> Fields {
        let dedup_key = self.dedup_key();
        let mut fields = Fields::new();
        let mut put = |name: &str, value: Option<Value>| {
            if let Some(value) = value {
                fields.insert(name.to_string(), value);
            }
        };

        put("type", Some(Value::from(self.notification_type.as_str())));
        put("userId", Some(Value::from(self.refs.recipient_id)));
        put("dedupKey", Some(Value::from(dedup_key.0)));
        put("assignmentId", self.refs.assignment_id.map(Value::from));
        put("assignmentTitle", self.assignment_title.map(Value::from));
        put("noticeId", self.refs.notice_id.map(Value::from));
        put("noticeTitle", self.notice_title.map(Value::from));
        put("classId", Some(Value::from(self.class_id)));
        put("className", Some(Value::from(self.class_name)));
        put("teacherId", self.teacher_id.map(Value::from));
        put("studentId", self.refs.student_id.map(Value::from));
        put("studentName", self.student_name.map(Value::from));
        put("grade", self.grade.map(Value::from));
        put("feedback", self.feedback.map(Value::from));
        put("dueDate", self.due_date.as_ref().map(to_stored_timestamp));
        put("createdAt", Some(to_stored_timestamp(&created_at)));
        put("read", Some(Value::Bool(false)));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn assignment() -> Assignment {
        Assignment {
            id: "a-1".to_string(),
            class_id: "c-1".to_string(),
            class_name: "Biology".to_string(),
            teacher_id: "t-1".to_string(),
            title: "Cell diagram".to_string(),
            due_date: Utc.with_ymd_and_hms(2024, 5, 17, 14, 30, 0).unwrap(),
            created_at: None,
        }
    }

    fn submission(student_id: &str) -> Submission {
        Submission {
            id: format!("s-{}", student_id),
            assignment_id: "a-1".to_string(),
            student_id: student_id.to_string(),
            student_name: "Bo".to_string(),
            class_id: Some("c-1".to_string()),
            submitted_at: Utc.with_ymd_and_hms(2024, 5, 16, 10, 0, 0).unwrap(),
            grade: None,
            feedback: None,
        }
    }

    #[test]
    fn test_notification_type_serialization() {
        let serialized = serde_json::to_string(&NotificationType::DueDateReminder).unwrap();
        assert_eq!(serialized, "\"due_date_reminder\"");

        let deserialized: NotificationType = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, NotificationType::DueDateReminder);
        assert_eq!(NotificationType::parse("new_submission"), Some(NotificationType::NewSubmission));
        assert_eq!(NotificationType::parse("download_completed"), None);
    }

    #[test]
    fn test_dedup_key_depends_only_on_business_ids() {
        let a = assignment();
        let first = NewNotification::new_submission(&a, &submission("st-1"));
        let mut resubmitted = submission("st-1");
        resubmitted.submitted_at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 0, 0).unwrap();
        let second = NewNotification::new_submission(&a, &resubmitted);
        let other_student = NewNotification::new_submission(&a, &submission("st-2"));

        assert_eq!(first.dedup_key(), second.dedup_key());
        assert_ne!(first.dedup_key(), other_student.dedup_key());
        assert_eq!(first.dedup_key().as_str().len(), 64);
    }

    #[test]
    fn test_type_is_part_of_the_key() {
        let a = assignment();
        let reminder = NewNotification::due_date_reminder("t-1", &a);
        let created = NewNotification::assignment_created("t-1", &a);
        assert_ne!(reminder.dedup_key(), created.dedup_key());
    }

    #[test]
    fn test_ids_containing_separators_do_not_collide() {
        let refs = |recipient: &str, assignment: &str| SubjectRefs {
            recipient_id: recipient.to_string(),
            assignment_id: Some(assignment.to_string()),
            ..Default::default()
        };
        let left = DedupKey::compute(NotificationType::DueDateReminder, &refs("t|a", "b"));
        let right = DedupKey::compute(NotificationType::DueDateReminder, &refs("t", "a|b"));
        assert_ne!(left, right);

        // A missing ref differs from a ref that looks like a placeholder
        let missing = SubjectRefs {
            recipient_id: "t".to_string(),
            ..Default::default()
        };
        let dash = SubjectRefs {
            recipient_id: "t".to_string(),
            notice_id: Some("-".to_string()),
            ..Default::default()
        };
        assert_ne!(
            DedupKey::compute(NotificationType::NewNotice, &missing),
            DedupKey::compute(NotificationType::NewNotice, &dash)
        );
    }

    #[test]
    fn test_into_fields_maps_back_to_notification() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 16, 12, 0, 0).unwrap();
        let n = NewNotification::new_submission(&assignment(), &submission("st-1"));
        let key = n.dedup_key();
        let record = RawRecord::new("n-1", n.into_fields(created_at));

        let notification = Notification::from_record(&record).unwrap();
        assert_eq!(notification.notification_type, NotificationType::NewSubmission);
        assert_eq!(notification.user_id, "t-1");
        assert_eq!(notification.dedup_key.as_deref(), Some(key.as_str()));
        assert_eq!(notification.student_id.as_deref(), Some("st-1"));
        assert_eq!(notification.created_at, created_at);
        assert_eq!(notification.due_date, Some(assignment().due_date));
        assert!(!notification.read);
    }

    #[test]
    fn test_notification_serializes_with_type_field() {
        let record = RawRecord::new(
            "n-2",
            NewNotification::due_date_reminder("st-1", &assignment())
                .into_fields(Utc.with_ymd_and_hms(2024, 5, 16, 12, 0, 0).unwrap()),
        );
        let notification = Notification::from_record(&record).unwrap();
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "due_date_reminder");
        assert_eq!(json["userId"], "st-1");
        assert_eq!(json["read"], false);
    }
}
