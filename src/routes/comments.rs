use axum::extract::State;
use axum::routing::{delete, get, put};
use axum::Router;
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::comments::{self, NewComment};
use crate::db::models::{Comment, CommentStatus, PostStatus};
use crate::db::posts;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, ApiJson, ApiPath, CurrentUser, MaybeUser};
use crate::response::ApiResponse;
use crate::state::AppState;

pub const CONTENT_MAX: usize = 2000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments/post/{post_id}", get(for_post).post(create))
        .route("/comments/{id}", delete(remove))
        .route("/admin/comments/pending", get(pending))
        .route("/admin/comments/{id}/approve", put(approve))
        .route("/admin/comments/{id}/reject", put(reject))
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

fn validate_content(raw: &str) -> AppResult<&str> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment content is required".into()));
    }
    if content.chars().count() > CONTENT_MAX {
        return Err(AppError::BadRequest(format!(
            "Comment must be at most {CONTENT_MAX} characters"
        )));
    }
    Ok(content)
}

/// Load a live post the caller may see. Drafts answer 404 to everyone but
/// their author and admins.
fn visible_post(
    conn: &Connection,
    post_id: i64,
    viewer: Option<&CurrentUser>,
) -> AppResult<posts::PostRow> {
    posts::find(conn, post_id)?
        .filter(|post| {
            post.status == PostStatus::Published
                || viewer.is_some_and(|user| user.owns_or_admin(post.author_id))
        })
        .ok_or(AppError::NotFound("Post"))
}

/// GET /api/comments/post/{post_id}
async fn for_post(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiPath(post_id): ApiPath<i64>,
) -> AppResult<ApiResponse<Vec<Comment>>> {
    let conn = state.db.get()?;
    visible_post(&conn, post_id, viewer.0.as_ref())?;
    let thread = comments::approved_thread(&conn, post_id)?;
    Ok(ApiResponse::ok("Comments", thread))
}

/// POST /api/comments/post/{post_id}
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(post_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> AppResult<ApiResponse<Comment>> {
    let content = validate_content(&req.content)?;

    let conn = state.db.get()?;
    visible_post(&conn, post_id, Some(&user))?;

    if let Some(parent_id) = req.parent_id {
        let parent_ok = comments::find(&conn, parent_id)?
            .is_some_and(|parent| parent.post_id == post_id);
        if !parent_ok {
            return Err(AppError::BadRequest(
                "Parent comment does not exist on this post".into(),
            ));
        }
    }

    let status = CommentStatus::initial_for(user.role);
    let comment = comments::insert(
        &conn,
        &NewComment {
            content,
            post_id,
            user_id: user.id,
            parent_id: req.parent_id,
            status,
        },
    )?;

    let message = match status {
        CommentStatus::Pending => "Comment submitted for review",
        _ => "Comment posted",
    };
    Ok(ApiResponse::created(message, comment))
}

/// DELETE /api/comments/{id}
///
/// Replies go with their parent.
async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<()>> {
    let conn = state.db.get()?;
    let comment = comments::find(&conn, id)?.ok_or(AppError::NotFound("Comment"))?;
    if !user.owns_or_admin(comment.user_id) {
        return Err(AppError::Forbidden(
            "Only the author or an admin may delete this comment",
        ));
    }

    let removed = comments::soft_delete(&conn, id)?;
    tracing::info!("Comment {} deleted by {} ({} rows)", id, user.username, removed);
    Ok(ApiResponse::message("Comment deleted"))
}

/// GET /api/admin/comments/pending
async fn pending(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<ApiResponse<Vec<Comment>>> {
    let conn = state.db.get()?;
    let queue = comments::pending(&conn)?;
    Ok(ApiResponse::ok("Pending comments", queue))
}

/// PUT /api/admin/comments/{id}/approve
async fn approve(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<Comment>> {
    let comment = moderate(&state, &admin, id, CommentStatus::Approved)?;
    Ok(ApiResponse::ok("Comment approved", comment))
}

/// PUT /api/admin/comments/{id}/reject
async fn reject(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<Comment>> {
    let comment = moderate(&state, &admin, id, CommentStatus::Rejected)?;
    Ok(ApiResponse::ok("Comment rejected", comment))
}

fn moderate(
    state: &AppState,
    admin: &CurrentUser,
    id: i64,
    target: CommentStatus,
) -> AppResult<Comment> {
    let conn = state.db.get()?;
    let comment = comments::find(&conn, id)?.ok_or(AppError::NotFound("Comment"))?;
    if !comment.status.can_moderate_to(target) {
        return Err(AppError::BadRequest(format!(
            "Comment is already {}",
            comment.status
        )));
    }

    comments::set_status(&conn, id, target)?;
    tracing::info!(
        "Comment {} moved {} -> {} by {}",
        id,
        comment.status,
        target,
        admin.username
    );
    comments::find(&conn, id)?.ok_or(AppError::NotFound("Comment"))
}
