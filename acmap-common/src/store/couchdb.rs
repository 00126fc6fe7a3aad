//! CouchDB-backed alias store
//!
//! Talks to the CouchDB HTTP API directly. `find_by_field` goes through Mango `_find`,
//! backed by a JSON index on `salesforce_name` created at startup.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::AliasStore;
use crate::config::CouchConfig;
use crate::model::{DocField, MappingDocument, StoredDocument};
use crate::{Error, Result};

const ALIAS_INDEX_NAME: &str = "salesforce-name-index";
const FIND_PAGE_SIZE: usize = 500;

pub struct CouchStore {
    http_client: Client,
    base: Url,
    config: CouchConfig,
}

/// Write acknowledgement (`POST /db`, `PUT /db/id`)
#[derive(Debug, Deserialize)]
struct WriteAck {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    #[serde(default)]
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    docs: Vec<Value>,
    bookmark: Option<String>,
}

impl CouchStore {
    pub fn new(config: CouchConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid CouchDB url '{}': {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid CouchDB url '{}'", config.url)));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base,
            config,
        })
    }

    /// URL for `/<database>/<segments...>`, each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.config.database);
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    /// Create the database if it does not exist yet
    pub async fn ensure_database(&self) -> Result<()> {
        let db_url = self.url(&[]);
        let response = self.with_auth(self.http_client.get(db_url.clone())).send().await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = self.with_auth(self.http_client.put(db_url)).send().await?;
                match created.status() {
                    // 412: created concurrently by someone else
                    StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::PRECONDITION_FAILED => {
                        info!(database = %self.config.database, "Created CouchDB database");
                        Ok(())
                    }
                    _ => Err(unexpected(created, "create database").await),
                }
            }
            _ => Err(unexpected(response, "check database").await),
        }
    }

    /// Create the Mango index behind alias lookups.
    ///
    /// Failure only costs lookup speed, so it is logged and ignored.
    pub async fn ensure_alias_index(&self) {
        let body = json!({
            "index": { "fields": [DocField::AliasName.as_str()] },
            "name": ALIAS_INDEX_NAME,
            "type": "json",
        });
        let request = self.with_auth(self.http_client.post(self.url(&["_index"])).json(&body));

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(index = ALIAS_INDEX_NAME, "CouchDB alias index ready");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Could not create CouchDB alias index");
            }
            Err(e) => warn!("Could not create CouchDB alias index: {}", e),
        }
    }

    async fn current_rev(&self, id: &str) -> Result<Option<String>> {
        Ok(self.read(id).await?.and_then(|stored| stored.rev))
    }
}

#[async_trait]
impl AliasStore for CouchStore {
    fn backend(&self) -> &'static str {
        "couchdb"
    }

    async fn create(&self, doc: &MappingDocument) -> Result<String> {
        let response = self
            .with_auth(self.http_client.post(self.url(&[])).json(doc))
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => Ok(response.json::<WriteAck>().await?.id),
            _ => Err(unexpected(response, "create document").await),
        }
    }

    async fn read(&self, id: &str) -> Result<Option<StoredDocument>> {
        // Reserved ids address CouchDB endpoints, never mapping documents
        if id.is_empty() || id.starts_with('_') {
            return Ok(None);
        }

        let response = self
            .with_auth(self.http_client.get(self.url(&[id])))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Some(split_document(response.json().await?)?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(unexpected(response, "read document").await),
        }
    }

    async fn update(&self, stored: &StoredDocument) -> Result<()> {
        let rev = match &stored.rev {
            Some(rev) => rev.clone(),
            None => self
                .current_rev(&stored.id)
                .await?
                .ok_or_else(|| Error::NotFound(stored.id.clone()))?,
        };

        let mut body = serde_json::to_value(&stored.doc)?;
        if let Value::Object(map) = &mut body {
            map.insert("_rev".to_string(), Value::String(rev));
        }

        let response = self
            .with_auth(self.http_client.put(self.url(&[stored.id.as_str()])).json(&body))
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::NotFound(stored.id.clone())),
            _ => Err(unexpected(response, "update document").await),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let rev = self
            .current_rev(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut url = self.url(&[id]);
        url.query_pairs_mut().append_pair("rev", &rev);
        let response = self.with_auth(self.http_client.delete(url)).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::NotFound(id.to_string())),
            _ => Err(unexpected(response, "delete document").await),
        }
    }

    async fn scan_all(&self) -> Result<Vec<StoredDocument>> {
        let mut url = self.url(&["_all_docs"]);
        url.query_pairs_mut().append_pair("include_docs", "true");

        let response = self.with_auth(self.http_client.get(url)).send().await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response, "scan documents").await);
        }

        let all: AllDocsResponse = response.json().await?;
        all.rows
            .into_iter()
            .filter_map(|row| row.doc)
            .filter(|doc| !is_design_doc(doc))
            .map(split_document)
            .collect()
    }

    async fn find_by_field(&self, field: DocField, value: &str) -> Result<Vec<StoredDocument>> {
        let mut found = Vec::new();
        let mut bookmark: Option<String> = None;

        // Indexed exact match; values written through this crate are stored trimmed
        let mut selector = Map::new();
        selector.insert(field.as_str().to_string(), Value::String(value.trim().to_string()));

        loop {
            let mut query = json!({
                "selector": selector.clone(),
                "limit": FIND_PAGE_SIZE,
            });
            if let Some(mark) = &bookmark {
                query["bookmark"] = Value::String(mark.clone());
            }

            let response = self
                .with_auth(self.http_client.post(self.url(&["_find"])).json(&query))
                .send()
                .await?;
            if response.status() != StatusCode::OK {
                return Err(unexpected(response, "find documents").await);
            }

            let page: FindResponse = response.json().await?;
            let page_len = page.docs.len();
            for doc in page.docs.into_iter().filter(|doc| !is_design_doc(doc)) {
                found.push(split_document(doc)?);
            }

            if page_len < FIND_PAGE_SIZE || page.bookmark.is_none() {
                break;
            }
            bookmark = page.bookmark;
        }

        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

fn is_design_doc(doc: &Value) -> bool {
    doc.get("_id")
        .and_then(Value::as_str)
        .is_some_and(|id| id.starts_with("_design/"))
}

/// Separate CouchDB metadata (`_id`, `_rev`, other `_` fields) from document content
fn split_document(value: Value) -> Result<StoredDocument> {
    let id = value
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::StoreUnavailable("CouchDB document without _id".to_string()))?;
    let rev = value.get("_rev").and_then(Value::as_str).map(str::to_string);

    let mut doc: MappingDocument = serde_json::from_value(value)?;
    doc.extra.retain(|key, _| !key.starts_with('_'));

    Ok(StoredDocument { id, rev, doc })
}

async fn unexpected(response: Response, action: &str) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::StoreUnavailable(format!("CouchDB {} failed ({}): {}", action, status, body.trim()))
}
