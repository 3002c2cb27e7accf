use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};

use crate::middleware::{optional_auth, require_admin, require_auth};
use crate::{AppState, admin, ai, auth, items, swaps, users};

/// Five images at 5 MB each plus the text fields.
pub const MAX_BODY_BYTES: usize = 30 * 1024 * 1024;

pub async fn health() -> &'static str {
    "ok"
}

/// Every `/api` route, grouped by the auth gate in front of it.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/items/categories/list", get(items::categories))
        .route("/api/users/profile/{id}", get(users::public_profile))
        .route("/api/users/{id}/items", get(users::public_items))
        .route("/api/users/{id}/swaps", get(users::swap_history));

    let optional_routes = Router::new()
        .route("/api/items", get(items::list_items))
        .route("/api/items/{id}", get(items::get_item))
        .layer(from_fn_with_state(state.clone(), optional_auth));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/profile", put(auth::update_profile))
        .route("/api/items", post(items::create_item))
        .route("/api/items/user/me", get(items::my_items))
        .route("/api/items/{id}", put(items::update_item).delete(items::delete_item))
        .route("/api/swaps", post(swaps::create_swap))
        .route("/api/swaps/sent", get(swaps::sent))
        .route("/api/swaps/received", get(swaps::received))
        .route("/api/swaps/stats", get(swaps::stats))
        .route("/api/swaps/{id}/accept", put(swaps::accept))
        .route("/api/swaps/{id}/reject", put(swaps::reject))
        .route("/api/swaps/{id}/cancel", put(swaps::cancel))
        .route("/api/swaps/{id}/complete", put(swaps::complete))
        .route("/api/users/stats", get(users::stats))
        .route("/api/users/notifications", get(users::notifications))
        .route("/api/users/notifications/unread-count", get(users::unread_count))
        .route("/api/users/notifications/read-all", put(users::mark_all_read))
        .route("/api/users/notifications/{id}/read", put(users::mark_read))
        .route("/api/users/points/transactions", get(users::transactions))
        .route("/api/ai/analyze-image", post(ai::analyze_image))
        .route("/api/ai/generate-description", post(ai::generate_description))
        .route("/api/ai/extract-tags", post(ai::extract_tags))
        .route("/api/ai/suggest-points", post(ai::suggest_points))
        .route("/api/ai/moderate", post(ai::moderate))
        .route("/api/ai/recommendations", get(ai::recommendations))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/api/admin/items/pending", get(admin::pending_items))
        .route("/api/admin/items/{id}/approve", put(admin::approve_item))
        .route("/api/admin/items/{id}/reject", put(admin::reject_item))
        .route("/api/admin/items/{id}", delete(admin::remove_item))
        .route("/api/admin/users", get(admin::users))
        .route("/api/admin/users/{id}/role", put(admin::update_role))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/activity", get(admin::activity))
        .layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health))
        .merge(public_routes)
        .merge(optional_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
