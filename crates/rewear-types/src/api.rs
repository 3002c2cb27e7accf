use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ItemCondition, Role, SwapStatus, TransactionType};

// -- JWT Claims --

/// Token claims. `sub` is the numeric user id; the row is re-fetched on
/// every request so role and points are never trusted from the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Shared --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total_items: u64) -> Self {
        let limit = u64::from(limit.max(1));
        let total_pages = total_items.div_ceil(limit) as u32;
        Self {
            current_page: page,
            total_pages,
            total_items,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// `?page=&limit=` as sent by the client; blank or garbled values fall back
/// to the route's defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub limit: Option<i64>,
}

/// Accepts numbers or numeric strings; anything else (including "") is `None`.
pub fn lenient_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

/// The caller's own account as returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub points: i64,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: UserProfile,
}

// -- Items --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub size: Option<String>,
    pub condition: ItemCondition,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub points_value: i64,
    pub is_available: bool,
    pub is_approved: bool,
    pub ai_category: Option<String>,
    pub ai_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog and moderation row: the item plus who listed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemListing {
    #[serde(flatten)]
    pub item: Item,
    pub uploader_name: Option<String>,
    pub uploader_avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uploader_email: Option<String>,
    /// Pending swap requests against this item.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub swap_requests: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: Item,
    pub uploader_id: i64,
    pub uploader_name: Option<String>,
    pub uploader_avatar: Option<String>,
    pub uploader_bio: Option<String>,
    #[serde(rename = "canSwap")]
    pub can_swap: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemDetailResponse {
    pub item: ItemDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemListResponse {
    pub items: Vec<ItemListing>,
    pub pagination: Pagination,
}

/// Category name to the distinct types listed under it.
#[derive(Debug, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub categories: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemMutationResponse {
    pub message: String,
    pub item: ItemListing,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub min_points: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_points: Option<i64>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub limit: Option<i64>,
}

/// Tags arrive either as a comma-separated string (form style) or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Text(String),
}

impl TagsInput {
    pub fn into_tags(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            Self::Text(text) => split_tags(&text),
        }
    }
}

pub fn split_tags(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub size: Option<String>,
    pub condition: Option<ItemCondition>,
    pub tags: Option<TagsInput>,
    pub points_value: Option<i64>,
}

// -- Swaps --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwapRequest {
    pub item_id: i64,
    pub offered_item_id: Option<i64>,
    pub offered_points: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    pub id: i64,
    pub requester_id: i64,
    pub item_id: i64,
    pub offered_item_id: Option<i64>,
    pub offered_points: Option<i64>,
    pub status: SwapStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A swap joined with the display fields of the items and people involved.
/// Which name fields are populated depends on the listing it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapSummary {
    #[serde(flatten)]
    pub swap: Swap,
    pub item_title: Option<String>,
    pub item_images: Vec<String>,
    pub item_points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub item_owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub item_owner_avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub requester_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub requester_avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub other_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub other_user_avatar: Option<String>,
    pub offered_item_title: Option<String>,
    pub offered_item_images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwapResponse {
    pub message: String,
    pub swap: SwapSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwapsResponse {
    pub swaps: Vec<SwapSummary>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStats {
    pub total_swaps: i64,
    pub pending_swaps: i64,
    pub accepted_swaps: i64,
    pub completed_swaps: i64,
    pub rejected_swaps: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwapStatsResponse {
    pub stats: SwapStats,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub items_count: i64,
    pub swaps_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicProfileResponse {
    pub user: PublicProfile,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: Option<String>,
    pub is_read: bool,
    pub related_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: i64,
    pub description: Option<String>,
    pub related_item_id: Option<i64>,
    pub item_title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<PointTransaction>,
    pub pagination: Pagination,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct OwnItemStats {
    pub total_items: i64,
    pub available_items: i64,
    pub pending_items: i64,
    pub total_points_value: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SentSwapStats {
    pub total_swaps: i64,
    pub pending_swaps: i64,
    pub accepted_swaps: i64,
    pub completed_swaps: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ReceivedSwapStats {
    pub total_received: i64,
    pub pending_received: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub items: OwnItemStats,
    pub swaps: SentSwapStats,
    pub received_swaps: ReceivedSwapStats,
}

// -- Admin --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub points: i64,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub items_count: i64,
    pub swaps_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUsersResponse {
    pub users: Vec<AdminUser>,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlatformUserStats {
    pub total_users: i64,
    pub new_users_week: i64,
    pub new_users_month: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlatformItemStats {
    pub total_items: i64,
    pub pending_items: i64,
    pub available_items: i64,
    pub new_items_week: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlatformSwapStats {
    pub total_swaps: i64,
    pub pending_swaps: i64,
    pub accepted_swaps: i64,
    pub completed_swaps: i64,
    pub new_swaps_week: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub users: PlatformUserStats,
    pub items: PlatformItemStats,
    pub swaps: PlatformSwapStats,
    pub categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub recent_items: Vec<ItemListing>,
    pub recent_swaps: Vec<SwapSummary>,
    pub recent_users: Vec<RecentUser>,
}

// -- AI --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageRequest {
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageAnalysis {
    #[serde(default)]
    pub category: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptionRequest {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    pub style: Option<String>,
    pub material: Option<String>,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointsRequest {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub style: Option<String>,
    pub condition: Option<String>,
    pub brand: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractTagsRequest {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModerateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moderation {
    pub is_appropriate: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub suggested_changes: Option<String>,
}

/// What the recommendation prompt is told about a user's taste.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub category: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub message: String,
    pub analysis: ImageAnalysis,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DescriptionResponse {
    pub message: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub message: String,
    pub recommendations: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagsResponse {
    pub message: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsResponse {
    pub message: String,
    pub points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModerationResponse {
    pub message: String,
    pub moderation: Moderation,
}
