//! Canonical dashboard queries.
//!
//! Dependent queries take the ids produced by an upstream synchronizer and return `None`
//! while there is nothing to ask for, which keeps the downstream synchronizer inactive.

use crate::store::{collections, FilterOp, QueryDescriptor, SortDirection};
use serde_json::Value;

/// Default page size of the notification list.
pub const NOTIFICATION_LIST_LIMIT: usize = 50;

fn id_list(ids: &[String]) -> Option<Value> {
    if ids.is_empty() {
        return None;
    }
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    Some(Value::from(ids))
}

pub fn user_by_id(user_id: &str) -> QueryDescriptor {
    QueryDescriptor::collection(collections::USERS)
        .where_eq("id", user_id)
        .limit(1)
}

pub fn classes_for_teacher(teacher_id: &str) -> QueryDescriptor {
    QueryDescriptor::collection(collections::CLASSES)
        .where_eq("teacherId", teacher_id)
        .order_by("name", SortDirection::Asc)
}

pub fn memberships_for_student(student_id: &str) -> QueryDescriptor {
    QueryDescriptor::collection(collections::MEMBERSHIPS).where_eq("studentId", student_id)
}

pub fn assignments_for_teacher(teacher_id: &str) -> QueryDescriptor {
    QueryDescriptor::collection(collections::ASSIGNMENTS)
        .where_eq("teacherId", teacher_id)
        .order_by("dueDate", SortDirection::Asc)
}

pub fn assignments_for_classes(class_ids: &[String]) -> Option<QueryDescriptor> {
    let ids = id_list(class_ids)?;
    Some(
        QueryDescriptor::collection(collections::ASSIGNMENTS)
            .filter("classId", FilterOp::In, ids)
            .order_by("dueDate", SortDirection::Asc),
    )
}

pub fn submissions_for_assignments(assignment_ids: &[String]) -> Option<QueryDescriptor> {
    let ids = id_list(assignment_ids)?;
    Some(
        QueryDescriptor::collection(collections::SUBMISSIONS)
            .filter("assignmentId", FilterOp::In, ids)
            .order_by("submittedAt", SortDirection::Desc),
    )
}

pub fn submissions_by_student(student_id: &str) -> QueryDescriptor {
    QueryDescriptor::collection(collections::SUBMISSIONS)
        .where_eq("studentId", student_id)
        .order_by("submittedAt", SortDirection::Desc)
}

pub fn notices_for_classes(class_ids: &[String]) -> Option<QueryDescriptor> {
    let ids = id_list(class_ids)?;
    Some(
        QueryDescriptor::collection(collections::NOTICES)
            .filter("classId", FilterOp::In, ids)
            .order_by("createdAt", SortDirection::Desc),
    )
}

pub fn notifications_for_user(user_id: &str) -> QueryDescriptor {
    QueryDescriptor::collection(collections::NOTIFICATIONS)
        .where_eq("userId", user_id)
        .order_by("createdAt", SortDirection::Desc)
        .limit(NOTIFICATION_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependent_queries_are_inactive_without_ids() {
        assert!(assignments_for_classes(&[]).is_none());
        assert!(submissions_for_assignments(&[]).is_none());
        assert!(notices_for_classes(&[]).is_none());
    }

    #[test]
    fn test_id_order_does_not_change_identity() {
        let a = submissions_for_assignments(&["a-2".to_string(), "a-1".to_string()]).unwrap();
        let b = submissions_for_assignments(&[
            "a-1".to_string(),
            "a-2".to_string(),
            "a-1".to_string(),
        ])
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_notification_query_identity() {
        assert_eq!(
            notifications_for_user("u-1").key().as_str(),
            "notifications?userId==\"u-1\"#order=createdAt:desc#limit=50"
        );
    }
}
