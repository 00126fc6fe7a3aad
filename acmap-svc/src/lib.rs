//! acmap-svc library - account alias mapping service
//!
//! HTTP CRUD surface over the alias store with a maintenance page at `/`, plus the shared setup used by the
//! `acmap-lookup` and `acmap-ingest` command-line tools.

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use acmap_common::{LookupService, MappingResolver, ResolutionPolicy, SharedStore};

pub mod api;
pub mod error;
pub mod logging;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Backing store, also reachable through the services below
    pub store: SharedStore,
    /// Resolver running the configured API policy
    pub resolver: Arc<MappingResolver>,
    pub lookup: Arc<LookupService>,
    /// Used for health uptime
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(store: SharedStore, policy: ResolutionPolicy) -> Self {
        Self {
            resolver: Arc::new(MappingResolver::new(store.clone(), policy)),
            lookup: Arc::new(LookupService::new(store.clone())),
            store,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, put};

    Router::new()
        .route("/users", get(api::list_users).post(api::add_user))
        .route("/users/:id", put(api::update_user).delete(api::delete_user))
        .merge(api::health_routes())
        .merge(api::ui_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
