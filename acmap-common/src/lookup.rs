//! Alias lookup and listing
//!
//! Every call reads the store directly. Nothing here caches, so a lookup always sees
//! the last committed write.
//!
//! Lookup matches the stored alias exactly, case included, ignoring only surrounding
//! whitespace. Resolution compares
//! case-insensitively; the two paths deliberately differ.

use tracing::debug;

use crate::model::{DocField, MappingRecord};
use crate::store::SharedStore;
use crate::Result;

pub struct LookupService {
    store: SharedStore,
}

impl LookupService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Account names whose canonical alias is exactly `alias`, ordered by record id.
    ///
    /// A blank query, or one nothing matches, yields an empty list.
    pub async fn find_accounts_for_alias(&self, alias: &str) -> Result<Vec<String>> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self.store.find_by_field(DocField::AliasName, alias).await?;
        hits.sort_by(|a, b| a.id.cmp(&b.id));

        let accounts: Vec<String> = hits.into_iter().map(|s| s.doc.user_name).collect();
        debug!(alias, matches = accounts.len(), "Alias lookup");
        Ok(accounts)
    }

    /// First non-blank account mapped to `alias`
    pub async fn find_primary_account(&self, alias: &str) -> Result<Option<String>> {
        Ok(self
            .find_accounts_for_alias(alias)
            .await?
            .into_iter()
            .map(|name| name.trim().to_string())
            .find(|name| !name.is_empty()))
    }

    /// Every record, legacy documents presented in the single-alias shape
    pub async fn list_all(&self) -> Result<Vec<MappingRecord>> {
        Ok(self
            .store
            .scan_all()
            .await?
            .iter()
            .map(MappingRecord::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MappingDocument;
    use crate::resolver::{MappingResolver, MappingUpdate, ResolutionPolicy};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lookup_is_case_sensitive() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_with_id("1", MappingDocument::new("Acme", "Acme Corp"))
            .await;
        let lookup = LookupService::new(store);

        assert_eq!(
            lookup.find_accounts_for_alias("Acme Corp").await.unwrap(),
            vec!["Acme".to_string()]
        );
        assert!(lookup.find_accounts_for_alias("acme corp").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_trims_query_and_ignores_blank() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_with_id("1", MappingDocument::new("Acme", "Acme Corp"))
            .await;
        let lookup = LookupService::new(store);

        assert_eq!(
            lookup.find_accounts_for_alias("  Acme Corp ").await.unwrap(),
            vec!["Acme".to_string()]
        );
        assert!(lookup.find_accounts_for_alias("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_returns_all_accounts_in_id_order() {
        let store = Arc::new(MemoryStore::new());
        store.insert_with_id("b", MappingDocument::new("Second", "Shared")).await;
        store.insert_with_id("a", MappingDocument::new("First", "Shared")).await;
        store.insert_with_id("c", MappingDocument::new("  ", "Shared")).await;
        let lookup = LookupService::new(store);

        assert_eq!(
            lookup.find_accounts_for_alias("Shared").await.unwrap(),
            vec!["First".to_string(), "Second".to_string(), "  ".to_string()]
        );
        assert_eq!(
            lookup.find_primary_account("Shared").await.unwrap().as_deref(),
            Some("First")
        );
        assert_eq!(lookup.find_primary_account("Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_sees_writes_immediately() {
        let store = Arc::new(MemoryStore::new());
        let resolver = MappingResolver::new(store.clone(), ResolutionPolicy::MergeWithHistory);
        let lookup = LookupService::new(store);

        let id = resolver.resolve("Acme", "Old Name").await.unwrap().id().to_string();
        assert_eq!(lookup.find_accounts_for_alias("Old Name").await.unwrap().len(), 1);

        resolver
            .update(
                &id,
                MappingUpdate {
                    account_name: None,
                    alias_name: Some("New Name".into()),
                },
            )
            .await
            .unwrap();

        assert!(lookup.find_accounts_for_alias("Old Name").await.unwrap().is_empty());
        assert_eq!(
            lookup.find_accounts_for_alias("New Name").await.unwrap(),
            vec!["Acme".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_all_surfaces_legacy_alias() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_with_id("legacy", MappingDocument::legacy("Acme", vec!["A".into(), "B".into()]))
            .await;
        store
            .insert_with_id("empty", MappingDocument::legacy("Nobody", Vec::new()))
            .await;
        let lookup = LookupService::new(store);

        let records = lookup.list_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "empty");
        assert_eq!(records[0].alias_name, None);
        assert_eq!(records[1].id, "legacy");
        assert_eq!(records[1].alias_name.as_deref(), Some("A"));
    }
}
