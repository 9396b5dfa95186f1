//! SQLite schema for the document store.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 1 - JSON documents keyed by (collection, id)
// =============================================================================

const DOCUMENTS_TABLE_V1: Table = Table {
    name: "documents",
    columns: &[
        sqlite_column!("collection", &SqlType::Text, non_null = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_documents_collection", "collection")],
    unique_constraints: &[&["collection", "id"]],
};

pub const DOCUMENTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[DOCUMENTS_TABLE_V1],
    migration: None,
}];
