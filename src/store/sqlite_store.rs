use super::filter::apply_query;
use super::query::QueryDescriptor;
use super::schema::DOCUMENTS_VERSIONED_SCHEMAS;
use super::trait_def::{DocumentStore, Fields, RawRecord, StoreError};
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Document store persisting JSON bodies in a single SQLite table.
///
/// Filtering happens in process over the collection, with the same semantics as the
/// in-memory store.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

fn backend_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl SqliteDocumentStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open document database")?;
        let latest = DOCUMENTS_VERSIONED_SCHEMAS
            .last()
            .context("No document schema defined")?;

        if is_new_db {
            info!("Creating new document database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;
            if db_version < 1 {
                anyhow::bail!(
                    "Document database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let schema = DOCUMENTS_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown document database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Document database schema validation failed for version {}",
                    db_version
                )
            })?;

            if (db_version as usize) < latest.version {
                Self::migrate(&mut conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database with the latest schema.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        DOCUMENTS_VERSIONED_SCHEMAS
            .last()
            .context("No document schema defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest_from = from_version;
        for schema in DOCUMENTS_VERSIONED_SCHEMAS
            .iter()
            .filter(|s| s.version > from_version)
        {
            info!(
                "Migrating document database from version {} to {}",
                latest_from, schema.version
            );
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            latest_from = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace a document with a caller-chosen id.
    pub fn put(&self, collection: &str, id: &str, fields: &Fields) -> Result<()> {
        let body = serde_json::to_string(fields)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = cast(strftime('%s','now') as int)",
            params![collection, id, body],
        )?;
        Ok(())
    }

    fn load_collection(conn: &Connection, collection: &str) -> Result<Vec<RawRecord>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY rowid")
            .map_err(backend_error)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(backend_error)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(backend_error)?;
            match serde_json::from_str::<Fields>(&body) {
                Ok(fields) => records.push(RawRecord::new(id, fields)),
                // A corrupt body is skipped here, the same way a malformed record is
                // dropped by the mapper further up.
                Err(e) => warn!("Skipping unreadable document {}/{}: {}", collection, id, e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn fetch(&self, query: &QueryDescriptor) -> Result<Vec<RawRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let records = Self::load_collection(&conn, query.source())?;
        Ok(apply_query(query, records))
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_string(&fields).map_err(backend_error)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, body],
        )
        .map_err(backend_error)?;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend_error)?;
        let Some(body) = body else {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };

        let mut merged: Fields = serde_json::from_str(&body).map_err(backend_error)?;
        for (key, value) in fields {
            merged.insert(key, value);
        }
        let merged_body = serde_json::to_string(&merged).map_err(backend_error)?;
        conn.execute(
            "UPDATE documents SET body = ?3, updated_at = cast(strftime('%s','now') as int)
             WHERE collection = ?1 AND id = ?2",
            params![collection, id, merged_body],
        )
        .map_err(backend_error)?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )
        .map_err(backend_error)?;
        Ok(())
    }
}
