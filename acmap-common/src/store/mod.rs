//! Alias store abstraction and backends
//!
//! Every backend persists [`MappingDocument`]s keyed by an opaque, store-assigned id.
//! Scans return documents in ascending id order.

mod couchdb;
mod memory;
mod sqlite;

pub use couchdb::CouchStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::StoreConfig;
use crate::model::{DocField, MappingDocument, StoredDocument};
use crate::Result;

/// Persistent collection of mapping documents
#[async_trait]
pub trait AliasStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Insert a new document, returning its id
    async fn create(&self, doc: &MappingDocument) -> Result<String>;

    /// Fetch one document, `None` if the id is unknown
    async fn read(&self, id: &str) -> Result<Option<StoredDocument>>;

    /// Replace an existing document.
    ///
    /// Fails with [`crate::Error::NotFound`] if the id is unknown.
    async fn update(&self, stored: &StoredDocument) -> Result<()>;

    /// Remove a document.
    ///
    /// Fails with [`crate::Error::NotFound`] if the id is unknown.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Every document in the collection
    async fn scan_all(&self) -> Result<Vec<StoredDocument>>;

    /// Documents whose `field` equals `value` (case-sensitive, surrounding whitespace
    /// ignored on both sides).
    ///
    /// Backends with secondary indexes override this; the default is a full scan.
    async fn find_by_field(&self, field: DocField, value: &str) -> Result<Vec<StoredDocument>> {
        let value = value.trim();
        Ok(self
            .scan_all()
            .await?
            .into_iter()
            .filter(|stored| stored.doc.field(field).map(str::trim) == Some(value))
            .collect())
    }
}

/// Shared store handle passed into resolver and lookup constructors
pub type SharedStore = Arc<dyn AliasStore>;

/// Open the backend described by `config`
pub async fn open_store(config: &StoreConfig) -> Result<SharedStore> {
    let store: SharedStore = match config {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Sqlite { path } => Arc::new(SqliteStore::open(path).await?),
        StoreConfig::CouchDb(couch) => {
            let store = CouchStore::new(couch.clone())?;
            store.ensure_database().await?;
            store.ensure_alias_index().await;
            Arc::new(store)
        }
    };
    info!(backend = store.backend(), "Alias store ready");
    Ok(store)
}
