//! Mapping resolver
//!
//! Decides what a proposed (account, alias) pair does to the store: create a record,
//! rewrite one, leave everything alone, or reject the pair. Each resolver runs exactly
//! one [`ResolutionPolicy`], chosen by whoever constructs it.
//!
//! Resolution compares names case-insensitively after trimming. Every call performs at
//! most one store write.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::model::{same_name, MappingDocument, MappingRecord};
use crate::store::SharedStore;
use crate::{Error, Result};

/// How `resolve` treats a pair that touches an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionPolicy {
    /// One account per alias; a second account claiming an alias is rejected
    #[serde(rename = "strict")]
    StrictUniqueness,
    /// One record per account; a new alias takes the canonical slot and the old one is
    /// kept in `conflicts`
    #[serde(rename = "merge")]
    MergeWithHistory,
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionPolicy::StrictUniqueness => write!(f, "strict"),
            ResolutionPolicy::MergeWithHistory => write!(f, "merge"),
        }
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ResolutionPolicy::StrictUniqueness),
            "merge" => Ok(ResolutionPolicy::MergeWithHistory),
            other => Err(format!("unknown policy '{}' (expected strict or merge)", other)),
        }
    }
}

/// What `resolve` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// New record written
    Created { id: String },
    /// Existing record rewritten; `displaced` is the alias moved into `conflicts`
    Updated { id: String, displaced: Option<String> },
    /// Pair already present, nothing written
    Unchanged { id: String },
}

impl ResolveOutcome {
    pub fn id(&self) -> &str {
        match self {
            ResolveOutcome::Created { id }
            | ResolveOutcome::Updated { id, .. }
            | ResolveOutcome::Unchanged { id } => id,
        }
    }
}

/// Partial edit applied by [`MappingResolver::update`].
///
/// Absent or blank fields leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingUpdate {
    pub account_name: Option<String>,
    pub alias_name: Option<String>,
}

pub struct MappingResolver {
    store: SharedStore,
    policy: ResolutionPolicy,
}

impl MappingResolver {
    pub fn new(store: SharedStore, policy: ResolutionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Apply one (account, alias) sighting under this resolver's policy
    pub async fn resolve(&self, account_name: &str, alias_name: &str) -> Result<ResolveOutcome> {
        let account = required("user_name", account_name)?;
        let alias = required("salesforce_name", alias_name)?;

        match self.policy {
            ResolutionPolicy::StrictUniqueness => self.resolve_strict(account, alias).await,
            ResolutionPolicy::MergeWithHistory => self.resolve_merge(account, alias).await,
        }
    }

    async fn resolve_strict(&self, account: &str, alias: &str) -> Result<ResolveOutcome> {
        let docs = self.store.scan_all().await?;

        if let Some(existing) = docs
            .iter()
            .find(|s| s.doc.is_account(account) && s.doc.claims_alias(alias))
        {
            debug!(id = %existing.id, account, alias, "Mapping already exists");
            return Ok(ResolveOutcome::Unchanged {
                id: existing.id.clone(),
            });
        }

        if let Some(owner) = docs.iter().find(|s| s.doc.claims_alias(alias)) {
            info!(
                alias,
                requested_by = account,
                owner = %owner.doc.user_name,
                "Rejected alias already mapped to another account"
            );
            return Err(Error::Conflict {
                alias: alias.to_string(),
                account: owner.doc.user_name.clone(),
            });
        }

        let id = self.store.create(&MappingDocument::new(account, alias)).await?;
        info!(%id, account, alias, "Added new mapping");
        Ok(ResolveOutcome::Created { id })
    }

    async fn resolve_merge(&self, account: &str, alias: &str) -> Result<ResolveOutcome> {
        let existing = self
            .store
            .scan_all()
            .await?
            .into_iter()
            .find(|s| s.doc.is_account(account));

        let Some(mut stored) = existing else {
            let id = self.store.create(&MappingDocument::new(account, alias)).await?;
            info!(%id, account, alias, "Added new mapping");
            return Ok(ResolveOutcome::Created { id });
        };

        let current = stored.doc.canonical_alias().map(str::to_string);
        if current.as_deref().is_some_and(|c| same_name(c, alias)) {
            debug!(id = %stored.id, account, alias, "Mapping already exists");
            return Ok(ResolveOutcome::Unchanged { id: stored.id });
        }

        stored.doc.migrate_legacy();
        if let Some(old) = &current {
            stored.doc.add_conflict(old);
        }
        stored.doc.salesforce_name = Some(alias.to_string());
        stored.doc.clear_conflict(alias);

        self.store.update(&stored).await?;

        match &current {
            Some(old) => info!(
                id = %stored.id,
                account,
                previous = %old,
                alias,
                "Alias replaced, previous value kept as conflict"
            ),
            None => info!(id = %stored.id, account, alias, "Alias set on existing mapping"),
        }

        Ok(ResolveOutcome::Updated {
            id: stored.id,
            displaced: current,
        })
    }

    /// Edit an existing record by id.
    ///
    /// A changed alias must not be claimed by any other record. The resulting alias is
    /// removed from `conflicts`, and legacy records are rewritten in the single-alias
    /// shape.
    pub async fn update(&self, id: &str, changes: MappingUpdate) -> Result<MappingRecord> {
        let mut stored = self
            .store
            .read(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let new_account = non_blank(changes.account_name.as_deref());
        let new_alias = non_blank(changes.alias_name.as_deref());

        if let Some(alias) = new_alias {
            if !stored.doc.claims_alias(alias) {
                let others = self.store.scan_all().await?;
                if let Some(owner) = others
                    .iter()
                    .find(|o| o.id != stored.id && o.doc.claims_alias(alias))
                {
                    info!(
                        %id,
                        alias,
                        owner = %owner.doc.user_name,
                        "Rejected update to alias mapped to another account"
                    );
                    return Err(Error::Conflict {
                        alias: alias.to_string(),
                        account: owner.doc.user_name.clone(),
                    });
                }
            }
        }

        stored.doc.migrate_legacy();
        if let Some(alias) = new_alias {
            stored.doc.salesforce_name = Some(alias.to_string());
        }
        if let Some(account) = new_account {
            stored.doc.user_name = account.to_string();
        }
        if let Some(alias) = stored.doc.canonical_alias().map(str::to_string) {
            stored.doc.clear_conflict(&alias);
        }

        self.store.update(&stored).await?;
        info!(%id, "Updated mapping");
        Ok(MappingRecord::from(&stored))
    }

    /// Remove a record by id
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        info!(%id, "Deleted mapping");
        Ok(())
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(value)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AliasStore, MemoryStore};
    use std::sync::Arc;

    fn resolver(policy: ResolutionPolicy) -> (Arc<MemoryStore>, MappingResolver) {
        let store = Arc::new(MemoryStore::new());
        let resolver = MappingResolver::new(store.clone(), policy);
        (store, resolver)
    }

    async fn doc(store: &MemoryStore, id: &str) -> MappingDocument {
        store.read(id).await.unwrap().expect("document exists").doc
    }

    #[test]
    fn test_policy_parses_from_cli_names() {
        assert_eq!(
            "strict".parse::<ResolutionPolicy>(),
            Ok(ResolutionPolicy::StrictUniqueness)
        );
        assert_eq!(
            " Merge ".parse::<ResolutionPolicy>(),
            Ok(ResolutionPolicy::MergeWithHistory)
        );
        assert!("lww".parse::<ResolutionPolicy>().is_err());
        assert_eq!(ResolutionPolicy::MergeWithHistory.to_string(), "merge");
    }

    #[tokio::test]
    async fn test_blank_inputs_are_rejected() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);

        assert!(matches!(
            resolver.resolve("   ", "Acme Inc").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            resolver.resolve("Acme", "").await,
            Err(Error::Validation(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_inputs_are_trimmed_before_storage() {
        let (store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        let outcome = resolver.resolve("  Acme ", " Acme Inc  ").await.unwrap();

        let stored = doc(&store, outcome.id()).await;
        assert_eq!(stored.user_name, "Acme");
        assert_eq!(stored.salesforce_name.as_deref(), Some("Acme Inc"));
    }

    // Merge-with-history

    #[tokio::test]
    async fn test_merge_same_pair_twice_is_idempotent() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);

        let first = resolver.resolve("Acme", "Acme Inc").await.unwrap();
        let second = resolver.resolve("ACME", "acme inc").await.unwrap();

        assert!(matches!(first, ResolveOutcome::Created { .. }));
        assert_eq!(second, ResolveOutcome::Unchanged { id: first.id().to_string() });
        assert_eq!(store.len().await, 1);
        assert!(doc(&store, first.id()).await.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_merge_new_alias_displaces_old_into_conflicts() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);
        let id = resolver.resolve("Acme", "X").await.unwrap().id().to_string();

        let outcome = resolver.resolve("acme", "Y").await.unwrap();
        assert_eq!(
            outcome,
            ResolveOutcome::Updated {
                id: id.clone(),
                displaced: Some("X".to_string())
            }
        );
        let after = doc(&store, &id).await;
        assert_eq!(after.salesforce_name.as_deref(), Some("Y"));
        assert!(after.conflicts.contains(&"X".to_string()));
        assert_eq!(after.user_name, "Acme");
    }

    #[tokio::test]
    async fn test_merge_returning_alias_resolves_its_conflict() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);
        let id = resolver.resolve("Acme", "X").await.unwrap().id().to_string();
        resolver.resolve("Acme", "Y").await.unwrap();
        resolver.resolve("Acme", "X").await.unwrap();

        let after = doc(&store, &id).await;
        assert_eq!(after.salesforce_name.as_deref(), Some("X"));
        assert!(!after.conflicts.iter().any(|c| same_name(c, "X")));
        assert!(after.conflicts.contains(&"Y".to_string()));
    }

    #[tokio::test]
    async fn test_merge_repeated_flips_do_not_grow_conflicts() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);
        let id = resolver.resolve("Acme", "X").await.unwrap().id().to_string();
        for alias in ["Y", "X", "Y", "x", "Y"] {
            resolver.resolve("Acme", alias).await.unwrap();
        }

        let after = doc(&store, &id).await;
        assert_eq!(after.salesforce_name.as_deref(), Some("Y"));
        assert_eq!(after.conflicts.len(), 1);
    }

    #[tokio::test]
    async fn test_merge_allows_alias_shared_across_accounts() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);
        resolver.resolve("Acme", "Shared").await.unwrap();
        let other = resolver.resolve("Globex", "Shared").await.unwrap();

        assert!(matches!(other, ResolveOutcome::Created { .. }));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_merge_rewrites_legacy_record() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);
        store
            .insert_with_id("legacy", MappingDocument::legacy("Acme", vec!["A".into(), "B".into()]))
            .await;

        let outcome = resolver.resolve("Acme", "C").await.unwrap();
        assert_eq!(outcome.id(), "legacy");

        let after = doc(&store, "legacy").await;
        assert_eq!(after.salesforce_name.as_deref(), Some("C"));
        assert!(after.salesforce_names.is_empty());
        assert!(after.conflicts.contains(&"A".to_string()));
        assert!(after.conflicts.contains(&"B".to_string()));
    }

    // Strict uniqueness

    #[tokio::test]
    async fn test_strict_exact_pair_is_noop() {
        let (store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        let first = resolver.resolve("Acme", "Acme Inc").await.unwrap();
        let again = resolver.resolve("acme", "ACME INC").await.unwrap();

        assert_eq!(again, ResolveOutcome::Unchanged { id: first.id().to_string() });
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_strict_second_account_for_alias_is_conflict() {
        let (store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        resolver.resolve("Acme", "X").await.unwrap();

        match resolver.resolve("Globex", "x").await {
            Err(Error::Conflict { alias, account }) => {
                assert_eq!(alias, "x");
                assert_eq!(account, "Acme");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_strict_permits_second_record_for_same_account() {
        let (store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        resolver.resolve("Acme", "X").await.unwrap();
        let outcome = resolver.resolve("Acme", "Y").await.unwrap();

        assert!(matches!(outcome, ResolveOutcome::Created { .. }));
        assert_eq!(store.len().await, 2);
    }

    // Update / delete

    #[tokio::test]
    async fn test_update_changes_fields_and_clears_resolved_conflict() {
        let (store, resolver) = resolver(ResolutionPolicy::MergeWithHistory);
        let id = resolver.resolve("Acme", "X").await.unwrap().id().to_string();
        resolver.resolve("Acme", "Y").await.unwrap();

        let record = resolver
            .update(
                &id,
                MappingUpdate {
                    account_name: Some(" Acme Corp ".into()),
                    alias_name: Some("x".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.account_name, "Acme Corp");
        assert_eq!(record.alias_name.as_deref(), Some("x"));
        let after = doc(&store, &id).await;
        assert!(!after.conflicts.iter().any(|c| same_name(c, "x")));
    }

    #[tokio::test]
    async fn test_update_blank_fields_are_ignored() {
        let (_store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        let id = resolver.resolve("Acme", "X").await.unwrap().id().to_string();

        let record = resolver
            .update(
                &id,
                MappingUpdate {
                    account_name: Some("  ".into()),
                    alias_name: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(record.account_name, "Acme");
        assert_eq!(record.alias_name.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn test_update_to_alias_owned_elsewhere_is_conflict() {
        let (store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        resolver.resolve("Acme", "X").await.unwrap();
        let id = resolver.resolve("Globex", "Y").await.unwrap().id().to_string();

        let result = resolver
            .update(
                &id,
                MappingUpdate {
                    account_name: None,
                    alias_name: Some("X".into()),
                },
            )
            .await;

        assert!(matches!(result, Err(Error::Conflict { .. })));
        assert_eq!(doc(&store, &id).await.salesforce_name.as_deref(), Some("Y"));
    }

    #[tokio::test]
    async fn test_update_recasing_own_alias_is_allowed() {
        let (_store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        let id = resolver.resolve("Acme", "acme inc").await.unwrap().id().to_string();

        let record = resolver
            .update(
                &id,
                MappingUpdate {
                    account_name: None,
                    alias_name: Some("Acme Inc".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.alias_name.as_deref(), Some("Acme Inc"));
    }

    #[tokio::test]
    async fn test_update_migrates_legacy_shape() {
        let (store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        store
            .insert_with_id("legacy", MappingDocument::legacy("Acme", vec!["A".into(), "B".into()]))
            .await;

        let record = resolver
            .update("legacy", MappingUpdate::default())
            .await
            .unwrap();

        assert_eq!(record.alias_name.as_deref(), Some("A"));
        let after = doc(&store, "legacy").await;
        assert!(after.salesforce_names.is_empty());
        assert_eq!(after.salesforce_name.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_deleted_id_is_not_found_afterwards() {
        let (_store, resolver) = resolver(ResolutionPolicy::StrictUniqueness);
        let id = resolver.resolve("Acme", "X").await.unwrap().id().to_string();

        resolver.delete(&id).await.unwrap();

        assert!(matches!(resolver.delete(&id).await, Err(Error::NotFound(_))));
        assert!(matches!(
            resolver.update(&id, MappingUpdate::default()).await,
            Err(Error::NotFound(_))
        ));
    }
}
