use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use rewear_db::SettleError;
use rewear_types::api::{
    CreateSwapRequest, MessageResponse, SwapResponse, SwapStatsResponse, SwapsResponse,
};
use rewear_types::models::{NotificationKind, SwapAction, SwapParty, TransitionError};

use crate::AppState;
use crate::error::{ApiError, Validator};
use crate::middleware::AuthUser;

pub async fn create_swap(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateSwapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Validator::new()
        .check(
            req.offered_points.is_none_or(|p| p >= 0),
            "offeredPoints",
            "Offered points must be a non-negative integer",
        )
        .finish()?;

    let item = state
        .db
        .get_item(req.item_id)?
        .filter(|i| i.is_available && i.is_approved)
        .ok_or_else(|| ApiError::not_found("Item not found or not available"))?;

    if item.user_id == user.id() {
        return Err(ApiError::bad_request("Cannot swap your own item"));
    }

    let offered_points = req.offered_points.filter(|p| *p > 0);
    if let Some(points) = offered_points {
        if user.0.points < points {
            return Err(ApiError::bad_request("Insufficient points"));
        }
    }

    if let Some(offered_id) = req.offered_item_id {
        let usable = state
            .db
            .get_item(offered_id)?
            .is_some_and(|i| i.user_id == user.id() && i.is_available);
        if !usable {
            return Err(ApiError::bad_request("Offered item not found or not available"));
        }
    }

    if state.db.has_pending_swap(user.id(), item.id)? {
        return Err(ApiError::bad_request(
            "You already have a pending swap request for this item",
        ));
    }

    let message = req.message.as_deref().map(str::trim).filter(|m| !m.is_empty());
    let swap_id = state
        .db
        .create_swap(user.id(), item.id, req.offered_item_id, offered_points, message)?;

    state.notify(
        item.user_id,
        NotificationKind::SwapRequest,
        "New Swap Request",
        &format!("You have a new swap request for \"{}\"", item.title),
        Some(swap_id),
    );

    let swap = state
        .db
        .get_swap_summary(swap_id)?
        .ok_or_else(|| anyhow::anyhow!("Swap {} vanished after insert", swap_id))?;

    info!("Swap {} requested by user {} for item {}", swap_id, user.id(), item.id);

    Ok((
        StatusCode::CREATED,
        Json(SwapResponse {
            message: "Swap request created successfully".into(),
            swap,
        }),
    ))
}

pub async fn sent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(SwapsResponse {
        swaps: state.db.list_sent_swaps(user.id())?,
    }))
}

pub async fn received(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(SwapsResponse {
        swaps: state.db.list_received_swaps(user.id())?,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(SwapStatsResponse {
        stats: state.db.swap_stats(user.id())?,
    }))
}

pub async fn accept(
    state: State<AppState>,
    user: Extension<AuthUser>,
    id: Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    transition(state, user, id, SwapAction::Accept).await
}

pub async fn reject(
    state: State<AppState>,
    user: Extension<AuthUser>,
    id: Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    transition(state, user, id, SwapAction::Reject).await
}

pub async fn cancel(
    state: State<AppState>,
    user: Extension<AuthUser>,
    id: Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    transition(state, user, id, SwapAction::Cancel).await
}

pub async fn complete(
    state: State<AppState>,
    user: Extension<AuthUser>,
    id: Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    transition(state, user, id, SwapAction::Complete).await
}

/// Shared body of the four lifecycle endpoints.
async fn transition(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    action: SwapAction,
) -> Result<Json<MessageResponse>, ApiError> {
    let not_found = || ApiError::not_found(not_found_message(action));

    let ctx = state.db.get_swap_context(id)?.ok_or_else(not_found)?;

    let party = if user.id() == ctx.item_owner_id {
        SwapParty::Owner
    } else if user.id() == ctx.swap.requester_id {
        SwapParty::Requester
    } else {
        // Outsiders see the same 404 a party would for a swap in the wrong state.
        if let Err(TransitionError::InvalidState { .. }) = ctx.swap.status.apply(action, SwapParty::Owner) {
            return Err(not_found());
        }
        return Err(ApiError::forbidden(format!("Not authorized to {} this swap", action)));
    };

    let next = ctx.swap.status.apply(action, party).map_err(|e| match e {
        TransitionError::InvalidState { .. } => not_found(),
        TransitionError::NotPermitted { .. } => {
            ApiError::forbidden(format!("Not authorized to {} this swap", action))
        }
    })?;

    if action == SwapAction::Accept {
        state.db.accept_swap(id, user.id()).map_err(|e| match e {
            SettleError::NotFound | SettleError::NotPending => not_found(),
            SettleError::NotOwner => ApiError::forbidden("Not authorized to accept this swap"),
            SettleError::InsufficientPoints => {
                ApiError::bad_request("Requester has insufficient points")
            }
            SettleError::ItemUnavailable => ApiError::bad_request("Item is no longer available"),
            SettleError::Db(e) => ApiError::Internal(e),
        })?;
    } else if !state.db.transition_swap(id, ctx.swap.status, next)? {
        warn!("Swap {} moved on before {} could apply", id, action);
        return Err(not_found());
    }

    let recipient = match party {
        SwapParty::Owner => ctx.swap.requester_id,
        SwapParty::Requester => ctx.item_owner_id,
    };
    let (kind, title) = action.notification();
    state.notify(
        recipient,
        kind,
        title,
        &action.notification_message(&ctx.item_title),
        Some(id),
    );

    info!("Swap {} {} -> {} by user {}", id, ctx.swap.status, next, user.id());

    Ok(Json(MessageResponse::new(format!("Swap {} successfully", past_tense(action)))))
}

fn not_found_message(action: SwapAction) -> &'static str {
    match action {
        SwapAction::Complete => "Swap not found or not accepted",
        _ => "Swap request not found",
    }
}

fn past_tense(action: SwapAction) -> &'static str {
    match action {
        SwapAction::Accept => "accepted",
        SwapAction::Reject => "rejected",
        SwapAction::Cancel => "cancelled",
        SwapAction::Complete => "completed",
    }
}
