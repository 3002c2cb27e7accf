use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use rewear_db::items::DEFAULT_PAGE_SIZE;
use rewear_db::{ItemChanges, ItemFilter, NewItem, SortField, SortOrder};
use rewear_types::api::{
    CatalogQuery, CategoriesResponse, ItemDetailResponse, ItemListResponse, ItemMutationResponse,
    ItemsResponse, MessageResponse, Pagination, PointsRequest, UpdateItemRequest, split_tags,
};
use rewear_types::models::ItemCondition;

use crate::AppState;
use crate::error::{ApiError, FieldError, Validator};
use crate::middleware::{AuthUser, MaybeUser};

pub const MAX_IMAGES: usize = 5;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let condition = match query.condition.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => Some(raw.parse::<ItemCondition>().map_err(|_| {
            ApiError::Validation(vec![FieldError::new("condition", "Invalid condition")])
        })?),
        None => None,
    };

    let filter = ItemFilter {
        category: query.category,
        item_type: query.item_type,
        condition,
        min_points: query.min_points,
        max_points: query.max_points,
        search: query.search,
        sort_by: SortField::parse(query.sort_by.as_deref()),
        sort_order: SortOrder::parse(query.sort_order.as_deref()),
        page: to_u32(query.page, 1),
        limit: to_u32(query.limit, DEFAULT_PAGE_SIZE),
    };

    let (items, total) = state.db.list_items(&filter)?;
    Ok(Json(ItemListResponse {
        items,
        pagination: Pagination::new(filter.page(), filter.limit(), total),
    }))
}

pub async fn categories(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(CategoriesResponse {
        categories: state.db.category_map()?,
    }))
}

pub async fn my_items(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.db.list_items_by_owner(user.id())?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(MaybeUser(viewer)): Extension<MaybeUser>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .db
        .get_item_detail(id, viewer.as_ref().map(AuthUser::id))?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    Ok(Json(ItemDetailResponse { item }))
}

/// Text fields and images collected from the create-item form.
#[derive(Default)]
struct ItemForm {
    title: String,
    description: String,
    category: String,
    item_type: String,
    size: Option<String>,
    condition: String,
    tags: String,
    points_value: Option<String>,
    images: Vec<(Vec<u8>, String)>,
}

impl ItemForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "images" {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("image/") {
                    return Err(ApiError::bad_request("Only image files are allowed"));
                }
                if form.images.len() == MAX_IMAGES {
                    return Err(ApiError::bad_request("At most 5 images are allowed"));
                }
                // Stop reading as soon as the image passes the cap.
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| ApiError::bad_request(e.body_text()))? {
                    if data.len() + chunk.len() > MAX_IMAGE_BYTES {
                        return Err(ApiError::bad_request("Each image must be 5MB or smaller"));
                    }
                    data.extend_from_slice(&chunk);
                }
                form.images.push((data, content_type));
                continue;
            }

            let value = field.text().await.map_err(|e| ApiError::bad_request(e.body_text()))?;
            let value = value.trim().to_string();
            match name.as_str() {
                "title" => form.title = value,
                "description" => form.description = value,
                "category" => form.category = value,
                "type" => form.item_type = value,
                "size" => form.size = Some(value).filter(|s| !s.is_empty()),
                "condition" => form.condition = value,
                "tags" => form.tags = value,
                "pointsValue" | "points_value" => form.points_value = Some(value).filter(|s| !s.is_empty()),
                _ => {}
            }
        }

        Ok(form)
    }
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = ItemForm::read(multipart).await?;

    let condition = form.condition.parse::<ItemCondition>().ok();
    let points = form.points_value.as_deref().map(|p| p.parse::<i64>().ok().filter(|p| *p >= 0));

    Validator::new()
        .check(!form.title.is_empty(), "title", "Title is required")
        .check(!form.category.is_empty(), "category", "Category is required")
        .check(!form.item_type.is_empty(), "type", "Type is required")
        .check(condition.is_some(), "condition", "Valid condition is required")
        .check(!matches!(points, Some(None)), "pointsValue", "Points value must be a non-negative integer")
        .finish()?;
    let Some(condition) = condition else {
        return Err(ApiError::bad_request("Valid condition is required"));
    };

    let points_value = match points.flatten() {
        Some(p) => p,
        None => {
            state
                .ai
                .suggest_points(&PointsRequest {
                    category: Some(form.category.clone()),
                    item_type: Some(form.item_type.clone()),
                    condition: Some(condition.to_string()),
                    ..PointsRequest::default()
                })
                .await
        }
    };

    let mut image_urls = Vec::with_capacity(form.images.len());
    for (data, content_type) in &form.images {
        match state.images.save(data, content_type).await {
            Ok(url) => image_urls.push(url),
            Err(e) => {
                discard_images(&state, &image_urls).await;
                return Err(e.into());
            }
        }
    }

    let new_item = NewItem {
        user_id: user.id(),
        title: form.title,
        description: form.description,
        ai_category: Some(form.category.clone()),
        category: form.category,
        item_type: form.item_type,
        size: form.size,
        condition,
        tags: split_tags(&form.tags),
        images: image_urls.clone(),
        points_value,
    };

    let item = match state.db.create_item(&new_item) {
        Ok(item) => item,
        Err(e) => {
            discard_images(&state, &image_urls).await;
            return Err(e.into());
        }
    };

    info!(
        "Item {} listed by user {} ({} images, {} points)",
        item.item.id,
        user.id(),
        image_urls.len(),
        points_value
    );

    Ok((
        StatusCode::CREATED,
        Json(ItemMutationResponse {
            message: "Item created successfully".into(),
            item,
        }),
    ))
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state
        .db
        .get_item(id)?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    if existing.user_id != user.id() {
        return Err(ApiError::forbidden("Not authorized to update this item"));
    }

    let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
    Validator::new()
        .check(!blank(&req.title), "title", "Title cannot be empty")
        .check(!blank(&req.category), "category", "Category cannot be empty")
        .check(!blank(&req.item_type), "type", "Type cannot be empty")
        .check(req.points_value.is_none_or(|p| p >= 0), "pointsValue", "Points value must be a non-negative integer")
        .finish()?;

    let changes = ItemChanges {
        title: req.title.map(|s| s.trim().to_string()),
        description: req.description,
        category: req.category.map(|s| s.trim().to_string()),
        item_type: req.item_type.map(|s| s.trim().to_string()),
        size: req.size,
        condition: req.condition,
        tags: req.tags.map(|t| t.into_tags()),
        points_value: req.points_value,
    };

    let item = state
        .db
        .update_item(id, &changes)?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;

    Ok(Json(ItemMutationResponse {
        message: "Item updated successfully".into(),
        item,
    }))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .db
        .get_item(id)?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    if item.user_id != user.id() {
        return Err(ApiError::forbidden("Not authorized to delete this item"));
    }

    state.db.delete_item(id)?;
    discard_images(&state, &item.images).await;

    info!("Item {} deleted by owner {}", id, user.id());
    Ok(Json(MessageResponse::new("Item deleted successfully")))
}

pub(crate) async fn discard_images(state: &AppState, urls: &[String]) {
    for url in urls {
        state.images.delete(url).await;
    }
}

/// Query numbers arrive as i64; anything below 1 uses the default.
pub(crate) fn to_u32(value: Option<i64>, default: u32) -> u32 {
    match value {
        Some(v) if v >= 1 => u32::try_from(v).unwrap_or(u32::MAX),
        _ => default,
    }
}
