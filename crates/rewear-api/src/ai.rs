use axum::{Extension, Json, extract::State, response::IntoResponse};

use rewear_types::api::{
    AnalysisResponse, AnalyzeImageRequest, DescriptionRequest, DescriptionResponse,
    ExtractTagsRequest, ModerateRequest, ModerationResponse, PointsRequest, PointsResponse,
    RecommendationsResponse, TagsResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

pub async fn analyze_image(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeImageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let image_url = required(req.image_url, "Image URL is required")?;
    let analysis = state
        .ai
        .analyze_image(&image_url)
        .await
        .map_err(|e| ApiError::ai("Failed to analyze image", e))?;
    Ok(Json(AnalysisResponse {
        message: "Image analyzed successfully".into(),
        analysis,
    }))
}

pub async fn generate_description(
    State(state): State<AppState>,
    Json(req): Json<DescriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let description = state
        .ai
        .generate_description(&req)
        .await
        .map_err(|e| ApiError::ai("Failed to generate description", e))?;
    Ok(Json(DescriptionResponse {
        message: "Description generated successfully".into(),
        description,
    }))
}

pub async fn recommendations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let interests = state.db.user_interests(user.id())?;
    let recommendations = state
        .ai
        .recommendations(&interests)
        .await
        .map_err(|e| ApiError::ai("Failed to generate recommendations", e))?;
    Ok(Json(RecommendationsResponse {
        message: "Recommendations generated successfully".into(),
        recommendations,
    }))
}

pub async fn extract_tags(
    State(state): State<AppState>,
    Json(req): Json<ExtractTagsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = required(req.text, "Text is required")?;
    let tags = state
        .ai
        .extract_tags(&text)
        .await
        .map_err(|e| ApiError::ai("Failed to extract tags", e))?;
    Ok(Json(TagsResponse {
        message: "Tags extracted successfully".into(),
        tags,
    }))
}

pub async fn suggest_points(
    State(state): State<AppState>,
    Json(req): Json<PointsRequest>,
) -> impl IntoResponse {
    let points = state.ai.suggest_points(&req).await;
    Json(PointsResponse {
        message: "Points suggestion generated successfully".into(),
        points,
    })
}

pub async fn moderate(
    State(state): State<AppState>,
    Json(req): Json<ModerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.unwrap_or_default();
    let description = req.description.unwrap_or_default();
    if title.trim().is_empty() && description.trim().is_empty() {
        return Err(ApiError::bad_request("Title or description is required"));
    }

    let moderation = state
        .ai
        .moderate(&title, &description)
        .await
        .map_err(|e| ApiError::ai("Failed to moderate content", e))?;
    Ok(Json(ModerationResponse {
        message: "Content moderated successfully".into(),
        moderation,
    }))
}
