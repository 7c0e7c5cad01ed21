use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header;
use axum::http::request::Parts;

use crate::db::models::Role;
use crate::db::users;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the caller is `owner_id` or an admin.
    pub fn owns_or_admin(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_admin()
    }
}

/// Extractor that requires authentication.
/// Returns 401 when the token is missing or invalid, or its user is gone.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::Unauthorized("Missing authorization header"))?;
        let token = bearer_token(value.to_str().unwrap_or_default())
            .ok_or(AppError::Unauthorized("Invalid authorization header"))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AppError::Unauthorized("Invalid or expired token")
        })?;

        // Role comes from the stored row so demotions apply immediately.
        let conn = state.db.get()?;
        let user = users::find_active(&conn, claims.sub)?
            .ok_or(AppError::Unauthorized("User no longer exists"))?;

        Ok(CurrentUser {
            id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}

/// Extractor that requires an admin. 401 without a valid token, 403 for
/// everyone else.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin privileges required"));
        }
        Ok(AdminUser(user))
    }
}

/// Optional user extractor: `None` instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized(_)) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

impl MaybeUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(CurrentUser::is_admin)
    }
}

/// JSON body whose rejection is rendered as a 400 envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path params whose rejection is rendered as a 400 envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Query string whose rejection is rendered as a 400 envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
