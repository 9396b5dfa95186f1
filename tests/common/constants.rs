//! Shared constants for integration tests
//!
//! When the seeded school changes (users, classes, ids), update only this file.

// ============================================================================
// Users
// ============================================================================

/// Teacher owning the seeded class
pub const TEACHER_ID: &str = "teacher-1";

/// Teacher of another class, used to check ownership filtering
pub const OTHER_TEACHER_ID: &str = "teacher-2";

/// Student enrolled in the seeded class
pub const STUDENT_1_ID: &str = "student-1";

/// Second student enrolled in the seeded class
pub const STUDENT_2_ID: &str = "student-2";

pub const ADMIN_ID: &str = "admin-1";

// ============================================================================
// School data
// ============================================================================

/// Class "Biology", taught by TEACHER_ID
pub const CLASS_1_ID: &str = "class-1";
pub const CLASS_1_NAME: &str = "Biology";

/// Class "History", taught by OTHER_TEACHER_ID
pub const CLASS_2_ID: &str = "class-2";
pub const CLASS_2_NAME: &str = "History";

pub const ASSIGNMENT_1_ID: &str = "assignment-1";
pub const ASSIGNMENT_2_ID: &str = "assignment-2";
