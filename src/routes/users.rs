use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::handlers::{validate_email, validate_password};
use crate::auth::password;
use crate::db::models::{Role, User};
use crate::db::users::{self, UserChanges};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::pagination::{Page, PageMeta, PageQuery};
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list))
        .route("/users/{id}", get(show).put(update).delete(remove))
}

#[derive(Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

fn ensure_self_or_admin(user: &CurrentUser, id: i64) -> AppResult<()> {
    if !user.owns_or_admin(id) {
        return Err(AppError::Forbidden("You may only access your own account"));
    }
    Ok(())
}

/// GET /api/users
async fn list(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> AppResult<ApiResponse<UserList>> {
    let page = Page::from_query(&query);
    let conn = state.db.get()?;
    let (users, total) = users::list(&conn, page)?;
    Ok(ApiResponse::ok(
        "User list",
        UserList {
            users,
            meta: page.meta(total),
        },
    ))
}

/// GET /api/users/{id}
async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<User>> {
    ensure_self_or_admin(&user, id)?;
    let conn = state.db.get()?;
    let found = users::find_active(&conn, id)?.ok_or(AppError::NotFound("User"))?;
    Ok(ApiResponse::ok("User", found))
}

/// PUT /api/users/{id}
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> AppResult<ApiResponse<User>> {
    ensure_self_or_admin(&user, id)?;
    if req.role.is_some() && !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can change roles"));
    }

    let conn = state.db.get()?;
    users::find_active(&conn, id)?.ok_or(AppError::NotFound("User"))?;

    let mut changes = UserChanges {
        nickname: req.nickname.map(|n| n.trim().to_string()),
        avatar: req.avatar,
        role: req.role,
        ..UserChanges::default()
    };

    if let Some(email) = req.email.as_deref().map(str::trim) {
        validate_email(email)?;
        if users::email_taken(&conn, email, Some(id))? {
            return Err(AppError::BadRequest("Email already registered".into()));
        }
        changes.email = Some(email.to_string());
    }

    if let Some(ref new_password) = req.password {
        validate_password(new_password)?;
        changes.password_hash = Some(password::hash(
            new_password,
            state.config.auth.bcrypt_cost,
        )?);
    }

    users::update(&conn, id, &changes)?;
    let updated = users::find_active(&conn, id)?.ok_or(AppError::NotFound("User"))?;
    Ok(ApiResponse::ok("User updated", updated))
}

/// DELETE /api/users/{id}
async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<()>> {
    if admin.id == id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }

    let conn = state.db.get()?;
    if !users::soft_delete(&conn, id)? {
        return Err(AppError::NotFound("User"));
    }

    tracing::info!("User {} deleted by {}", id, admin.username);
    Ok(ApiResponse::message("User deleted"))
}
