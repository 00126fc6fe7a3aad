//! Mapping CRUD endpoints
//!
//! - `GET /users` lists every record
//! - `POST /users` resolves one (user_name, salesforce_name) pair
//! - `PUT /users/:id` edits a record
//! - `DELETE /users/:id` removes a record

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use acmap_common::model::lenient_optional_string;
use acmap_common::{MappingRecord, MappingUpdate, ResolveOutcome};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Body of `POST /users`. Non-string field values count as missing.
#[derive(Debug, Default, Deserialize)]
pub struct AddMappingRequest {
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub salesforce_name: Option<String>,
}

/// Body of `PUT /users/:id`; absent, blank or non-string fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMappingRequest {
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub salesforce_name: Option<String>,
}

/// Success body for write endpoints
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl MessageResponse {
    fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
            id: None,
        }
    }

    fn with_id(msg: &str, id: &str) -> Self {
        Self {
            msg: msg.to_string(),
            id: Some(id.to_string()),
        }
    }
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<MappingRecord>>> {
    let records = state.lookup.list_all().await?;
    debug!(count = records.len(), "Listed mappings");
    Ok(Json(records))
}

/// POST /users
pub async fn add_user(
    State(state): State<AppState>,
    payload: Result<Json<AddMappingRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = payload?;
    let account = request.user_name.unwrap_or_default();
    let alias = request.salesforce_name.unwrap_or_default();

    if account.trim().is_empty() || alias.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "user_name and salesforce_name are required".to_string(),
        ));
    }

    let response = match state.resolver.resolve(&account, &alias).await? {
        ResolveOutcome::Created { id } => MessageResponse::with_id("Added new mapping", &id),
        ResolveOutcome::Updated { id, .. } => MessageResponse::with_id("Updated mapping", &id),
        ResolveOutcome::Unchanged { id } => {
            MessageResponse::with_id("Mapping already exists", &id)
        }
    };

    Ok(Json(response))
}

/// PUT /users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateMappingRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = payload?;
    let changes = MappingUpdate {
        account_name: request.user_name,
        alias_name: request.salesforce_name,
    };

    state.resolver.update(&id, changes).await?;
    Ok(Json(MessageResponse::new("Updated")))
}

/// DELETE /users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.resolver.delete(&id).await?;
    Ok(Json(MessageResponse::new("Deleted")))
}

