use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, MeResponse, PublicUser, SignupRequest},
        extractors::AuthUser,
        jwt::TokenKeys,
        password::{hash_password_blocking, verify_against_dummy, verify_password_blocking},
        repo::is_email_conflict,
        repo_types::User,
    },
    error::ApiError,
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Length is counted in characters, not bytes.
pub(crate) fn password_long_enough(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn invalid_body(e: JsonRejection) -> ApiError {
    warn!(error = %e, "invalid request body");
    ApiError::BadRequest("Invalid request format".into())
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
}

fn issue_token(state: &AppState, user_id: i32) -> Result<String, ApiError> {
    TokenKeys::from_ref(state)
        .issue(user_id)
        .map_err(|e| ApiError::internal("Error generating authentication token", e))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(mut payload) = payload.map_err(invalid_body)?;
    payload.email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();

    if name.is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Name, email, and password are required".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if !password_long_enough(&payload.password) {
        warn!("password too short");
        return Err(ApiError::BadRequest("Password too short".into()));
    }

    let hash = hash_password_blocking(payload.password)
        .await
        .map_err(|e| ApiError::internal("Error processing your request", e))?;

    let user = match User::create(&state.db, &name, &payload.email, &hash).await {
        Ok(u) => u,
        Err(e) if is_email_conflict(&e) => {
            warn!(email = %payload.email, "email already registered");
            return Err(ApiError::Conflict("Email already in use".into()));
        }
        Err(e) => return Err(ApiError::internal("Error creating user", e)),
    };

    let token = issue_token(&state, user.id)?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully",
            token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(mut payload) = payload.map_err(invalid_body)?;
    payload.email = normalize_email(&payload.email);

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            verify_against_dummy(payload.password).await;
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        Err(e) => return Err(ApiError::internal("Error processing your request", e)),
    };

    let ok = verify_password_blocking(payload.password, user.password_hash.clone()).await;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = issue_token(&state, user.id)?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(AuthResponse {
        message: "Login successful",
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(|e| ApiError::internal("Error processing your request", e))?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(MeResponse {
        user: PublicUser::from(user),
    }))
}
