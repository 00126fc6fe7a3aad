//! SQLite-backed alias store
//!
//! Documents are kept as JSON in `body`; the indexed fields are mirrored, trimmed, into
//! their own columns so `find_by_field` can use an index instead of scanning.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use super::AliasStore;
use crate::model::{DocField, MappingDocument, StoredDocument};
use crate::{Error, Result};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::StoreUnavailable(format!(
                        "Cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        // mode=rwc: read, write, create
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        debug!("Connecting to database: {}", db_url);

        let pool = SqlitePool::connect(&db_url).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mapping_documents (
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL DEFAULT '',
            salesforce_name TEXT,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mapping_documents_salesforce_name \
         ON mapping_documents(salesforce_name)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mapping_documents_user_name \
         ON mapping_documents(user_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn decode_rows(rows: Vec<(String, String)>) -> Result<Vec<StoredDocument>> {
    rows.into_iter()
        .map(|(id, body)| {
            Ok(StoredDocument {
                id,
                rev: None,
                doc: serde_json::from_str(&body)?,
            })
        })
        .collect()
}

#[async_trait]
impl AliasStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn create(&self, doc: &MappingDocument) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let body = serde_json::to_string(doc)?;

        sqlx::query(
            "INSERT INTO mapping_documents (id, user_name, salesforce_name, body) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(doc.user_name.trim())
        .bind(doc.salesforce_name.as_deref().map(str::trim))
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn read(&self, id: &str) -> Result<Option<StoredDocument>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, body FROM mapping_documents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(decode_rows(row.into_iter().collect())?.pop())
    }

    async fn update(&self, stored: &StoredDocument) -> Result<()> {
        let body = serde_json::to_string(&stored.doc)?;

        let result = sqlx::query(
            "UPDATE mapping_documents \
             SET user_name = ?, salesforce_name = ?, body = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ?",
        )
        .bind(stored.doc.user_name.trim())
        .bind(stored.doc.salesforce_name.as_deref().map(str::trim))
        .bind(body)
        .bind(&stored.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(stored.id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM mapping_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<StoredDocument>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, body FROM mapping_documents ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        decode_rows(rows)
    }

    async fn find_by_field(&self, field: DocField, value: &str) -> Result<Vec<StoredDocument>> {
        // Column name comes from the closed DocField set, never from input
        let sql = format!(
            "SELECT id, body FROM mapping_documents WHERE {} = ? ORDER BY id",
            field.as_str()
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(value.trim())
            .fetch_all(&self.pool)
            .await?;

        decode_rows(rows)
    }
}
