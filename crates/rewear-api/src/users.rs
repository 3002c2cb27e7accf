use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use rewear_types::api::{
    ItemListResponse, MessageResponse, NotificationsResponse, PageQuery, Pagination,
    PublicProfileResponse, SwapsResponse, TransactionsResponse, UnreadCountResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::items::to_u32;
use crate::middleware::AuthUser;

const PUBLIC_ITEMS_PAGE: u32 = 12;
const INBOX_PAGE: u32 = 20;
const MAX_PAGE: u32 = 100;

/// Page number, page size and row offset for a `?page&limit` query.
fn paging(query: &PageQuery, default_limit: u32) -> (u32, u32, u32) {
    let page = to_u32(query.page, 1);
    let limit = to_u32(query.limit, default_limit).min(MAX_PAGE);
    (page, limit, (page - 1).saturating_mul(limit))
}

pub async fn public_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, items) = state
        .db
        .get_public_profile(id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(PublicProfileResponse { user, items }))
}

pub async fn public_items(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit, offset) = paging(&query, PUBLIC_ITEMS_PAGE);
    let (items, total) = state.db.list_public_items_by_owner(id, limit, offset)?;
    Ok(Json(ItemListResponse {
        items,
        pagination: Pagination::new(page, limit, total),
    }))
}

pub async fn swap_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(SwapsResponse {
        swaps: state.db.list_user_swap_history(id)?,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.user_stats(user.id())?))
}

pub async fn notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit, offset) = paging(&query, INBOX_PAGE);
    let (notifications, total) = state.db.list_notifications(user.id(), limit, offset)?;
    Ok(Json(NotificationsResponse {
        notifications,
        pagination: Pagination::new(page, limit, total),
    }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(UnreadCountResponse {
        count: state.db.unread_count(user.id())?,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.mark_read(id, user.id())? {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(MessageResponse::new("Notification marked as read")))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.mark_all_read(user.id())?;
    Ok(Json(MessageResponse::new("All notifications marked as read")))
}

pub async fn transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit, offset) = paging(&query, INBOX_PAGE);
    let (transactions, total) = state.db.list_point_transactions(user.id(), limit, offset)?;
    Ok(Json(TransactionsResponse {
        transactions,
        pagination: Pagination::new(page, limit, total),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_offsets() {
        let q = PageQuery { page: Some(3), limit: Some(10) };
        assert_eq!(paging(&q, 20), (3, 10, 20));

        let q = PageQuery { page: None, limit: Some(1000) };
        assert_eq!(paging(&q, 20), (1, 100, 0));

        assert_eq!(paging(&PageQuery::default(), 20), (1, 20, 0));
    }
}
