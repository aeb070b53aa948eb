use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        extractors::AuthUser,
        handlers::{invalid_body, password_long_enough},
        password::{hash_password_blocking, verify_password_blocking},
        repo_types::User,
    },
    error::ApiError,
    state::AppState,
};

use super::dto::{
    ChangePasswordRequest, MessageResponse, Profile, ProfileResponse, StatsResponse,
    UpdateProfileRequest, UpdateProfileResponse, UpdatedProfile,
};
use super::repo;

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/profile/password", put(change_password))
        .route("/api/profile/stats", get(get_stats))
}

async fn load_user(state: &AppState, user_id: i32, public: &'static str) -> Result<User, ApiError> {
    User::find_by_id(&state.db, user_id)
        .await
        .map_err(|e| ApiError::internal(public, e))?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = load_user(&state, user_id, "Error retrieving user profile").await?;
    Ok(Json(ProfileResponse {
        profile: Profile {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UpdateProfileResponse>, ApiError> {
    let Json(payload) = payload.map_err(invalid_body)?;
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }

    let updated = User::update_name(&state.db, user_id, &name)
        .await
        .map_err(|e| ApiError::internal("Error updating user profile", e))?;
    if !updated {
        return Err(ApiError::NotFound("User not found".into()));
    }

    info!(user_id, "profile updated");
    Ok(Json(UpdateProfileResponse {
        message: "Profile updated successfully",
        profile: UpdatedProfile { id: user_id, name },
    }))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(payload) = payload.map_err(invalid_body)?;
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::BadRequest(
            "Current password and new password are required".into(),
        ));
    }
    if !password_long_enough(&payload.new_password) {
        return Err(ApiError::BadRequest("Password too short".into()));
    }

    let user = load_user(&state, user_id, "Error processing your request").await?;
    if !verify_password_blocking(payload.current_password, user.password_hash).await {
        warn!(user_id, "password change with wrong current password");
        return Err(ApiError::Unauthorized("Current password is incorrect".into()));
    }

    let hash = hash_password_blocking(payload.new_password)
        .await
        .map_err(|e| ApiError::internal("Error processing your request", e))?;
    User::update_password_hash(&state.db, user_id, &hash)
        .await
        .map_err(|e| ApiError::internal("Error processing your request", e))?;

    info!(user_id, "password changed");
    Ok(Json(MessageResponse {
        message: "Password updated successfully",
    }))
}

#[instrument(skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<StatsResponse>, ApiError> {
    let row = repo::stats_for_user(&state.db, user_id)
        .await
        .map_err(|e| ApiError::internal("Error retrieving user statistics", e))?;
    Ok(Json(StatsResponse { stats: row.into() }))
}
