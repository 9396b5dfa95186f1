//! Record mappers: raw stored record -> typed entity.
//!
//! Mappers are pure and deterministic. A malformed record produces a [`MapError`] naming
//! the offending field; callers decide whether to drop the record or fail.

use super::dates::coerce_timestamp;
use super::models::{Assignment, Class, Membership, Notice, Submission, User, UserRole};
use crate::store::RawRecord;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("{kind} {id}: missing field `{field}`")]
    MissingField {
        kind: &'static str,
        id: String,
        field: &'static str,
    },

    #[error("{kind} {id}: invalid field `{field}`: {reason}")]
    InvalidField {
        kind: &'static str,
        id: String,
        field: &'static str,
        reason: String,
    },
}

/// Conversion from a raw stored record, registered per entity kind.
pub trait FromRecord: Sized + Clone + PartialEq + Send + Sync + 'static {
    /// Entity kind, used in logs and errors.
    const KIND: &'static str;

    fn from_record(record: &RawRecord) -> Result<Self, MapError>;
}

/// Typed field access over a [`RawRecord`] that produces precise [`MapError`]s.
pub struct FieldReader<'a> {
    kind: &'static str,
    record: &'a RawRecord,
}

impl<'a> FieldReader<'a> {
    pub fn new(kind: &'static str, record: &'a RawRecord) -> Self {
        Self { kind, record }
    }

    pub fn id(&self) -> String {
        self.record.id.clone()
    }

    fn missing(&self, field: &'static str) -> MapError {
        MapError::MissingField {
            kind: self.kind,
            id: self.record.id.clone(),
            field,
        }
    }

    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> MapError {
        MapError::InvalidField {
            kind: self.kind,
            id: self.record.id.clone(),
            field,
            reason: reason.into(),
        }
    }

    fn present(&self, field: &'static str) -> Option<&'a Value> {
        self.record.get(field).filter(|v| !v.is_null())
    }

    pub fn string(&self, field: &'static str) -> Result<String, MapError> {
        self.opt_string(field)?.ok_or_else(|| self.missing(field))
    }

    pub fn opt_string(&self, field: &'static str) -> Result<Option<String>, MapError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.invalid(field, format!("expected string, got {}", other))),
        }
    }

    /// Strings or numbers, rendered as text (grades are stored both ways).
    pub fn opt_text(&self, field: &'static str) -> Result<Option<String>, MapError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(self.invalid(field, format!("expected text, got {}", other))),
        }
    }

    pub fn bool_or(&self, field: &'static str, default: bool) -> Result<bool, MapError> {
        match self.present(field) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.invalid(field, format!("expected bool, got {}", other))),
        }
    }

    pub fn date(&self, field: &'static str) -> Result<DateTime<Utc>, MapError> {
        self.opt_date(field)?.ok_or_else(|| self.missing(field))
    }

    pub fn opt_date(&self, field: &'static str) -> Result<Option<DateTime<Utc>>, MapError> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => coerce_timestamp(value)
                .map(Some)
                .map_err(|e| self.invalid(field, e.to_string())),
        }
    }
}

impl FromRecord for User {
    const KIND: &'static str = "user";

    fn from_record(record: &RawRecord) -> Result<Self, MapError> {
        let r = FieldReader::new(Self::KIND, record);
        let role = r.string("role")?;
        Ok(User {
            id: r.id(),
            name: r.opt_string("name")?.unwrap_or_default(),
            email: r.opt_string("email")?.unwrap_or_default(),
            role: UserRole::parse(&role).ok_or_else(|| MapError::InvalidField {
                kind: Self::KIND,
                id: record.id.clone(),
                field: "role",
                reason: format!("unknown role {}", role),
            })?,
            created_at: r.opt_date("createdAt")?,
        })
    }
}

impl FromRecord for Class {
    const KIND: &'static str = "class";

    fn from_record(record: &RawRecord) -> Result<Self, MapError> {
        let r = FieldReader::new(Self::KIND, record);
        Ok(Class {
            id: r.id(),
            name: r.string("name")?,
            teacher_id: r.string("teacherId")?,
            created_at: r.opt_date("createdAt")?,
        })
    }
}

impl FromRecord for Membership {
    const KIND: &'static str = "membership";

    fn from_record(record: &RawRecord) -> Result<Self, MapError> {
        let r = FieldReader::new(Self::KIND, record);
        Ok(Membership {
            id: r.id(),
            class_id: r.string("classId")?,
            student_id: r.string("studentId")?,
            joined_at: r.opt_date("joinedAt")?,
        })
    }
}

impl FromRecord for Assignment {
    const KIND: &'static str = "assignment";

    fn from_record(record: &RawRecord) -> Result<Self, MapError> {
        let r = FieldReader::new(Self::KIND, record);
        Ok(Assignment {
            id: r.id(),
            class_id: r.string("classId")?,
            class_name: r.opt_string("className")?.unwrap_or_default(),
            teacher_id: r.string("teacherId")?,
            title: r.string("title")?,
            due_date: r.date("dueDate")?,
            created_at: r.opt_date("createdAt")?,
        })
    }
}

impl FromRecord for Submission {
    const KIND: &'static str = "submission";

    fn from_record(record: &RawRecord) -> Result<Self, MapError> {
        let r = FieldReader::new(Self::KIND, record);
        Ok(Submission {
            id: r.id(),
            assignment_id: r.string("assignmentId")?,
            student_id: r.string("studentId")?,
            student_name: r.opt_string("studentName")?.unwrap_or_default(),
            class_id: r.opt_string("classId")?,
            submitted_at: r.date("submittedAt")?,
            grade: r.opt_text("grade")?,
            feedback: r.opt_string("feedback")?,
        })
    }
}

impl FromRecord for Notice {
    const KIND: &'static str = "notice";

    fn from_record(record: &RawRecord) -> Result<Self, MapError> {
        let r = FieldReader::new(Self::KIND, record);
        Ok(Notice {
            id: r.id(),
            class_id: r.string("classId")?,
            class_name: r.opt_string("className")?.unwrap_or_default(),
            teacher_id: r.string("teacherId")?,
            title: r.string("title")?,
            created_at: r.date("createdAt")?,
        })
    }
}

/// Map a batch of records, dropping (and logging) the ones that fail.
pub fn map_records<T: FromRecord>(records: impl IntoIterator<Item = RawRecord>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| match T::from_record(&record) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("Dropping malformed {} record: {}", T::KIND, e);
                None
            }
        })
        .collect()
}
