//! In-memory alias store

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::AliasStore;
use crate::model::{MappingDocument, StoredDocument};
use crate::{Error, Result};

/// Process-local store; contents are lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, MappingDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under a caller-chosen id (test fixtures, legacy imports)
    pub async fn insert_with_id(&self, id: impl Into<String>, doc: MappingDocument) {
        self.docs.write().await.insert(id.into(), doc);
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl AliasStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, doc: &MappingDocument) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.docs.write().await.insert(id.clone(), doc.clone());
        Ok(id)
    }

    async fn read(&self, id: &str) -> Result<Option<StoredDocument>> {
        Ok(self.docs.read().await.get(id).map(|doc| StoredDocument {
            id: id.to_string(),
            rev: None,
            doc: doc.clone(),
        }))
    }

    async fn update(&self, stored: &StoredDocument) -> Result<()> {
        let mut docs = self.docs.write().await;
        match docs.get_mut(&stored.id) {
            Some(slot) => {
                *slot = stored.doc.clone();
                Ok(())
            }
            None => Err(Error::NotFound(stored.id.clone())),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.docs
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn scan_all(&self) -> Result<Vec<StoredDocument>> {
        Ok(self
            .docs
            .read()
            .await
            .iter()
            .map(|(id, doc)| StoredDocument {
                id: id.clone(),
                rev: None,
                doc: doc.clone(),
            })
            .collect())
    }
}
