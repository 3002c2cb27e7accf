use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use rewear_types::api::{
    AdminUsersResponse, ItemsResponse, MessageResponse, ReasonRequest, RoleUpdateRequest,
};
use rewear_types::models::{NotificationKind, Role};

use crate::AppState;
use crate::error::ApiError;
use crate::items::discard_images;
use crate::middleware::AuthUser;

pub async fn pending_items(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ItemsResponse {
        items: state.db.list_pending_items()?,
    }))
}

pub async fn approve_item(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .db
        .get_item(id)?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    if !state.db.set_item_approved(id)? {
        return Err(ApiError::not_found("Item not found"));
    }

    state.notify(
        item.user_id,
        NotificationKind::ItemApproved,
        "Item Approved",
        &format!("Your item \"{}\" has been approved!", item.title),
        Some(id),
    );

    info!("Item {} approved by admin {}", id, admin.id());
    Ok(Json(MessageResponse::new("Item approved successfully")))
}

pub async fn reject_item(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let reason = parse_reason(&body)?;
    take_down(&state, id, Takedown::Reject, reason.as_deref()).await?;
    info!("Item {} rejected by admin {}", id, admin.id());
    Ok(Json(MessageResponse::new("Item rejected successfully")))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let reason = parse_reason(&body)?;
    take_down(&state, id, Takedown::Remove, reason.as_deref()).await?;
    info!("Item {} removed by admin {}", id, admin.id());
    Ok(Json(MessageResponse::new("Item removed successfully")))
}

#[derive(Clone, Copy)]
enum Takedown {
    Reject,
    Remove,
}

/// Loads the item, deletes it, then tells the owner why.
async fn take_down(state: &AppState, id: i64, kind: Takedown, reason: Option<&str>) -> Result<(), ApiError> {
    let item = state
        .db
        .get_item(id)?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;

    if !state.db.delete_item(id)? {
        return Err(ApiError::not_found("Item not found"));
    }
    discard_images(state, &item.images).await;

    let (notification, title, verb) = match kind {
        Takedown::Reject => (NotificationKind::ItemRejected, "Item Rejected", "has been rejected"),
        Takedown::Remove => (NotificationKind::ItemRemoved, "Item Removed", "has been removed by admin"),
    };
    let message = format!(
        "Your item \"{}\" {}. {}",
        item.title,
        verb,
        reason.unwrap_or_default()
    );
    state.notify(item.user_id, notification, title, message.trim_end(), Some(id));
    Ok(())
}

/// The reason body is optional, so an empty request is accepted.
fn parse_reason(body: &[u8]) -> Result<Option<String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req: ReasonRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?;
    Ok(req.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()))
}

pub async fn users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(AdminUsersResponse {
        users: state.db.list_users_with_counts()?,
    }))
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<RoleUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role: Role = req
        .role
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid role"))?;

    if !state.db.set_role(id, role)? {
        return Err(ApiError::not_found("User not found"));
    }

    info!("User {} set to role {} by admin {}", id, role, admin.id());
    Ok(Json(MessageResponse::new("User role updated successfully")))
}

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.admin_stats()?))
}

pub async fn activity(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.recent_activity()?))
}
