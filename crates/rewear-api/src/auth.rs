use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::info;

use rewear_types::api::{
    AuthResponse, Claims, LoginRequest, RegisterRequest, UpdateProfileRequest, UserResponse,
};
use rewear_types::models::Role;

use crate::AppState;
use crate::error::{ApiError, Validator};
use crate::middleware::AuthUser;

const MIN_PASSWORD_LEN: usize = 6;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let name = req.name.trim();

    Validator::new()
        .check(is_plausible_email(&email), "email", "Valid email is required")
        .check(
            req.password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            "Password must be at least 6 characters",
        )
        .check(!name.is_empty(), "name", "Name is required")
        .finish()?;

    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict("User already exists".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();

    let role = match &state.admin_email {
        Some(admin) if admin.eq_ignore_ascii_case(&email) => Role::Admin,
        _ => Role::User,
    };

    let user = state.db.create_user(&email, &password_hash, name, role)?;
    let token = create_token(&state.jwt_secret, state.token_ttl_days, user.id, &user.email)?;

    info!("User {} registered ({})", user.id, role);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.profile(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());

    let email = req.email.trim().to_lowercase();
    let user = state.db.get_user_by_email(&email)?.ok_or_else(invalid)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Stored hash for user {} is unreadable: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let token = create_token(&state.jwt_secret, state.token_ttl_days, user.id, &user.email)?;

    Ok(Json(AuthResponse {
        token,
        user: user.profile(),
    }))
}

pub async fn me(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    Json(UserResponse { user: user.0 })
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.as_deref().map(str::trim);
    Validator::new()
        .check(name != Some(""), "name", "Name cannot be empty")
        .finish()?;

    let updated = state
        .db
        .update_profile(user.id(), name, req.bio.as_deref(), req.avatar.as_deref())?
        .ok_or(ApiError::UserNotFound)?;

    Ok(Json(UserResponse {
        user: updated.profile(),
    }))
}

pub fn create_token(secret: &str, ttl_days: i64, user_id: i64, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace),
        None => false,
    }
}
