//! Mapping record model
//!
//! Documents are stored in the shape the CRM tooling has always written:
//!
//! ```json
//! { "user_name": "Acme", "salesforce_name": "Acme Inc", "conflicts": ["ACME Ltd"] }
//! ```
//!
//! Older documents carry a `salesforce_names` list instead of a single
//! `salesforce_name`. Both shapes are read; every write produces the single-name shape.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Indexed document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocField {
    /// Canonical account name (`user_name`)
    AccountName,
    /// Canonical alias (`salesforce_name`)
    AliasName,
}

impl DocField {
    /// Field name as stored in the document
    pub fn as_str(&self) -> &'static str {
        match self {
            DocField::AccountName => "user_name",
            DocField::AliasName => "salesforce_name",
        }
    }
}

/// Case-insensitive name comparison used throughout resolution
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Mapping document as persisted by every store backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    /// Canonical account name
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_name: String,

    /// Canonical alias
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub salesforce_name: Option<String>,

    /// Legacy multi-alias shape, read only
    #[serde(
        default,
        deserialize_with = "lenient_string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub salesforce_names: Vec<String>,

    /// Aliases displaced from the canonical slot
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub conflicts: Vec<String>,

    /// Fields this service does not own; carried through rewrites untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MappingDocument {
    /// New single-alias document with no conflict history
    pub fn new(account_name: impl Into<String>, alias_name: impl Into<String>) -> Self {
        Self {
            user_name: account_name.into(),
            salesforce_name: Some(alias_name.into()),
            ..Default::default()
        }
    }

    /// Legacy multi-alias document
    pub fn legacy(account_name: impl Into<String>, aliases: Vec<String>) -> Self {
        Self {
            user_name: account_name.into(),
            salesforce_names: aliases,
            ..Default::default()
        }
    }

    /// The alias currently in the canonical slot.
    ///
    /// Falls back to the first entry of the legacy list when the single-name field is
    /// absent or blank.
    pub fn canonical_alias(&self) -> Option<&str> {
        self.salesforce_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.salesforce_names
                    .first()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
            })
    }

    /// True if the canonical alias equals `alias` ignoring case
    pub fn claims_alias(&self, alias: &str) -> bool {
        self.canonical_alias().is_some_and(|current| same_name(current, alias))
    }

    /// True if the account name equals `account` ignoring case
    pub fn is_account(&self, account: &str) -> bool {
        same_name(&self.user_name, account)
    }

    /// Record `alias` in the conflict history unless already present
    pub fn add_conflict(&mut self, alias: &str) {
        if !self.conflicts.iter().any(|c| same_name(c, alias)) {
            self.conflicts.push(alias.to_string());
        }
    }

    /// Drop `alias` from the conflict history
    pub fn clear_conflict(&mut self, alias: &str) {
        self.conflicts.retain(|c| !same_name(c, alias));
    }

    /// Rewrite into the single-alias shape.
    ///
    /// The canonical alias moves into `salesforce_name`; every other legacy alias joins
    /// the conflict history.
    pub fn migrate_legacy(&mut self) {
        if self.salesforce_names.is_empty() {
            return;
        }
        let canonical = self.canonical_alias().map(str::to_string);
        let legacy = std::mem::take(&mut self.salesforce_names);
        for alias in legacy.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            if canonical.as_deref().is_some_and(|c| same_name(c, alias)) {
                continue;
            }
            self.add_conflict(alias);
        }
        self.salesforce_name = canonical;
    }

    /// Value of an indexed field
    pub fn field(&self, field: DocField) -> Option<&str> {
        match field {
            DocField::AccountName => Some(self.user_name.as_str()),
            DocField::AliasName => self.salesforce_name.as_deref(),
        }
    }
}

/// Document together with its store-assigned identity
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Store-assigned identifier
    pub id: String,
    /// Revision token (CouchDB only)
    pub rev: Option<String>,
    pub doc: MappingDocument,
}

/// Listing entry returned by `GET /users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub id: String,
    #[serde(rename = "user_name")]
    pub account_name: String,
    #[serde(rename = "salesforce_name")]
    pub alias_name: Option<String>,
    pub conflicts: Vec<String>,
}

impl From<&StoredDocument> for MappingRecord {
    fn from(stored: &StoredDocument) -> Self {
        Self {
            id: stored.id.clone(),
            account_name: stored.doc.user_name.clone(),
            alias_name: stored.doc.canonical_alias().map(str::to_string),
            conflicts: stored.doc.conflicts.clone(),
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

/// Strings pass through; any other JSON value reads as absent
pub fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

// Anything but a list of strings reads as empty; non-string entries are dropped.
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}
