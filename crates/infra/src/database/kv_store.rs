//! SQLite-backed implementation of the key-value store port.
//!
//! Each queue blob is one row in `kv_store`. Writes replace the whole row in a
//! single statement, so a crash never leaves a half-written blob behind.

use std::sync::Arc;

use async_trait::async_trait;
use outpost_core::KeyValueStore;
use outpost_domain::{OutpostError, Result as DomainResult};
use rusqlite::{params, OptionalExtension};
use tokio::task;

use super::manager::{map_sql_error, DbManager};
use crate::errors::InfraError;

const KV_GET_SQL: &str = "SELECT value FROM kv_store WHERE key = ?1";
const KV_SET_SQL: &str = "INSERT INTO kv_store (key, value, updated_at)
    VALUES (?1, ?2, CAST(strftime('%s','now') AS INTEGER))
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";
const KV_REMOVE_SQL: &str = "DELETE FROM kv_store WHERE key = ?1";

/// Key-value store persisted in the engine's SQLite database.
pub struct SqliteKeyValueStore {
    db: Arc<DbManager>,
}

impl SqliteKeyValueStore {
    /// Construct a store over `db`. Run [`DbManager::run_migrations`] first.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<String>> {
            let conn = db.get_connection()?;
            conn.query_row(KV_GET_SQL, params![key], |row| row.get::<_, String>(0))
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let value = value.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(KV_SET_SQL, params![key, value]).map(|_| ()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn remove(&self, key: &str) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(KV_REMOVE_SQL, params![key]).map(|_| ()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_join_error(err: task::JoinError) -> OutpostError {
    OutpostError::from(InfraError::from(err))
}
