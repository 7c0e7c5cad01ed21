use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::auth::{is_valid_email, password};
use crate::db::models::{Role, User};
use crate::db::users::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser};
use crate::response::ApiResponse;
use crate::state::AppState;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

pub fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::BadRequest(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if !is_valid_email(email) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {PASSWORD_MIN} characters"
        )));
    }
    Ok(())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<ApiResponse<AuthPayload>> {
    let username = req.username.trim();
    let email = req.email.trim();
    validate_username(username)?;
    validate_email(email)?;
    validate_password(&req.password)?;

    let conn = state.db.get()?;
    if users::username_taken(&conn, username)? {
        return Err(AppError::BadRequest("Username already exists".into()));
    }
    if users::email_taken(&conn, email, None)? {
        return Err(AppError::BadRequest("Email already registered".into()));
    }

    let nickname = req
        .nickname
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(username);
    let password_hash = password::hash(&req.password, state.config.auth.bcrypt_cost)?;

    let user = users::insert(
        &conn,
        &NewUser {
            username,
            email,
            password_hash: &password_hash,
            nickname,
            role: Role::User,
        },
    )?;
    let token = state.tokens.issue(&user)?;

    tracing::info!("Registered user {} (id {})", user.username, user.id);
    Ok(ApiResponse::created(
        "Registration successful",
        AuthPayload { user, token },
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<ApiResponse<AuthPayload>> {
    let conn = state.db.get()?;
    let user = users::find_by_username(&conn, req.username.trim())?
        .filter(|user| password::verify(&req.password, &user.password_hash))
        .ok_or(AppError::Unauthorized("Invalid username or password"))?;

    let token = state.tokens.issue(&user)?;
    tracing::debug!("User {} logged in", user.username);
    Ok(ApiResponse::ok("Login successful", AuthPayload { user, token }))
}

/// POST /api/auth/logout
///
/// Tokens are stateless; the client discards its copy.
pub async fn logout() -> ApiResponse<()> {
    ApiResponse::message("Logged out")
}

/// GET /api/auth/user
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<ApiResponse<User>> {
    let conn = state.db.get()?;
    let user = users::find_active(&conn, user.id)?.ok_or(AppError::NotFound("User"))?;
    Ok(ApiResponse::ok("Current user", user))
}
