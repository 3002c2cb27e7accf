pub mod admin;
pub mod ai;
pub mod auth;
pub mod error;
pub mod items;
pub mod middleware;
pub mod routes;
pub mod storage;
pub mod swaps;
pub mod users;

use std::sync::Arc;

use rewear_ai::AiClient;
use rewear_db::Database;
use rewear_types::models::NotificationKind;
use tracing::warn;

use crate::storage::ImageStore;

pub use error::{ApiError, FieldError};
pub use routes::build_router;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Accounts registering with this address are created as admins.
    pub admin_email: Option<String>,
    pub ai: AiClient,
    pub images: ImageStore,
}

impl AppStateInner {
    /// Inserts a notification, logging instead of failing the request.
    pub(crate) fn notify(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: &str,
        related_id: Option<i64>,
    ) {
        if let Err(e) = self.db.create_notification(user_id, kind, title, message, related_id) {
            warn!("Failed to notify user {} ({}): {}", user_id, kind, e);
        }
    }
}
