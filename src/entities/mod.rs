//! School entities and the record mappers that produce them.

pub mod dates;
mod mapper;
mod models;

pub use dates::{coerce_timestamp, to_stored_timestamp, DateCoercionError};
pub use mapper::{map_records, FieldReader, FromRecord, MapError};
pub use models::{Assignment, Class, Membership, Notice, Submission, User, UserRole};
