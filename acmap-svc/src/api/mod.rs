//! HTTP API handlers for acmap-svc

pub mod health;
pub mod ui;
pub mod users;

pub use health::health_routes;
pub use ui::ui_routes;
pub use users::{add_user, delete_user, list_users, update_user};
