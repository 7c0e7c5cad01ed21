use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::models::{Post, PostStatus};
use crate::db::posts::{self, NewPost, PostFilter, PostRow};
use crate::db::terms::{self, TermKind};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, ApiJson, ApiPath, ApiQuery, CurrentUser, MaybeUser};
use crate::pagination::{Page, PageMeta, PageQuery};
use crate::response::ApiResponse;
use crate::slug;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list).post(create))
        .route("/posts/search", get(search))
        .route("/posts/{id}", get(show).put(update).delete(remove))
        .route("/posts/{id}/like", post(like))
}

// -- Request / response types --

#[derive(Deserialize, Default)]
pub struct ListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub category_id: Option<String>,
    pub tag_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct SearchQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub q: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Serialize)]
pub struct PostList {
    pub posts: Vec<Post>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Serialize)]
pub struct LikeCount {
    pub like_count: i64,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub categories: Vec<i64>,
    #[serde(default)]
    pub tags: Vec<i64>,
}

/// Every field is optional; absent fields are left untouched. `categories`
/// and `tags`, when present, replace the whole set.
#[derive(Deserialize, Default)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub status: Option<PostStatus>,
    pub categories: Option<Vec<i64>>,
    pub tags: Option<Vec<i64>>,
}

// -- Helpers --

fn parse_id_param(name: &str, raw: Option<&str>) -> AppResult<Option<i64>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Invalid {name}: {value:?}"))),
    }
}

/// Drafts are only visible to their author and to admins.
fn can_view(post: &PostRow, viewer: Option<&CurrentUser>) -> bool {
    post.status == PostStatus::Published
        || viewer.is_some_and(|user| user.owns_or_admin(post.author_id))
}

/// Non-admins only ever see published posts. Admins may filter by status.
fn visible_status(viewer: &MaybeUser, requested: Option<&str>) -> AppResult<Option<PostStatus>> {
    if !viewer.is_admin() {
        return Ok(Some(PostStatus::Published));
    }
    requested
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(AppError::BadRequest))
        .transpose()
}

fn slug_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Derived slugs that collide get a timestamp suffix instead of failing,
/// then a counter when the stamped slug is taken too.
fn unique_slug(conn: &Connection, base: String, exclude_id: Option<i64>) -> AppResult<String> {
    if !posts::slug_taken(conn, &base, exclude_id)? {
        return Ok(base);
    }
    let stamped = format!("{base}-{}", slug_suffix());
    let mut candidate = stamped.clone();
    let mut n = 1;
    while posts::slug_taken(conn, &candidate, exclude_id)? {
        n += 1;
        candidate = format!("{stamped}-{n}");
    }
    Ok(candidate)
}

fn ensure_terms_exist(conn: &Connection, kind: TermKind, ids: &[i64]) -> AppResult<()> {
    let missing = terms::missing_ids(conn, kind, ids)?;
    if !missing.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Unknown {} ids: {:?}",
            kind.label().to_lowercase(),
            missing
        )));
    }
    Ok(())
}

fn required(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

// -- Handlers --

/// GET /api/posts
async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> AppResult<ApiResponse<PostList>> {
    let page = Page::from_query(&query.page);
    let filter = PostFilter {
        status: visible_status(&viewer, query.status.as_deref())?,
        category_id: parse_id_param("category_id", query.category_id.as_deref())?,
        tag_id: parse_id_param("tag_id", query.tag_id.as_deref())?,
        search: None,
    };

    let conn = state.db.get()?;
    let (posts, total) = posts::page(&conn, &filter, page)?;
    Ok(ApiResponse::ok(
        "Post list",
        PostList {
            posts,
            meta: page.meta(total),
        },
    ))
}

/// GET /api/posts/search?q=
async fn search(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> AppResult<ApiResponse<PostList>> {
    let keyword = query
        .q
        .as_deref()
        .or(query.keyword.as_deref())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing search keyword 'q'".into()))?;

    let page = Page::from_query(&query.page);
    let filter = PostFilter {
        status: visible_status(&viewer, None)?,
        search: Some(keyword.to_string()),
        ..PostFilter::default()
    };

    let conn = state.db.get()?;
    let (posts, total) = posts::page(&conn, &filter, page)?;
    Ok(ApiResponse::ok(
        "Search results",
        PostList {
            posts,
            meta: page.meta(total),
        },
    ))
}

/// GET /api/posts/{id}
///
/// Counts a view on every successful read.
async fn show(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<Post>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut row = posts::find(&tx, id)?
        .filter(|row| can_view(row, viewer.0.as_ref()))
        .ok_or(AppError::NotFound("Post"))?;
    row.view_count = posts::increment_views(&tx, id)?;
    let post = posts::detail(&tx, row)?;
    tx.commit()?;

    Ok(ApiResponse::ok("Post detail", post))
}

/// POST /api/posts/{id}/like
///
/// Drafts the caller cannot see answer 404, same as the detail view.
async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<LikeCount>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    posts::find(&tx, id)?
        .filter(|row| can_view(row, Some(&user)))
        .ok_or(AppError::NotFound("Post"))?;
    let like_count = posts::increment_likes(&tx, id)?;
    tx.commit()?;

    Ok(ApiResponse::ok("Liked", LikeCount { like_count }))
}

/// POST /api/posts
async fn create(
    State(state): State<AppState>,
    AdminUser(author): AdminUser,
    ApiJson(req): ApiJson<CreatePostRequest>,
) -> AppResult<ApiResponse<Post>> {
    let title = req.title.trim();
    required("Title", title)?;
    required("Content", &req.content)?;
    let base_slug = slug::resolve(req.slug.as_deref(), title)
        .ok_or_else(|| AppError::BadRequest("Slug cannot be empty".into()))?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    ensure_terms_exist(&tx, TermKind::Category, &req.categories)?;
    ensure_terms_exist(&tx, TermKind::Tag, &req.tags)?;
    let slug = unique_slug(&tx, base_slug, None)?;

    let id = posts::insert(
        &tx,
        &NewPost {
            title,
            slug: &slug,
            content: &req.content,
            excerpt: req.excerpt.as_deref().unwrap_or_default(),
            cover_image: req.cover_image.as_deref().unwrap_or_default(),
            status: req.status.unwrap_or(PostStatus::Draft),
            author_id: author.id,
        },
    )?;
    terms::replace_for_post(&tx, TermKind::Category, id, &req.categories)?;
    terms::replace_for_post(&tx, TermKind::Tag, id, &req.tags)?;

    let row = posts::find(&tx, id)?.ok_or(AppError::NotFound("Post"))?;
    let post = posts::hydrate(&tx, row)?;
    tx.commit()?;

    tracing::info!("Post {} ({:?}) created by {}", id, post.slug, author.username);
    Ok(ApiResponse::created("Post created", post))
}

/// PUT /api/posts/{id}
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdatePostRequest>,
) -> AppResult<ApiResponse<Post>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut row = posts::find(&tx, id)?.ok_or(AppError::NotFound("Post"))?;
    if !user.owns_or_admin(row.author_id) {
        return Err(AppError::Forbidden("Only the author or an admin may edit this post"));
    }

    let mut title_changed = false;
    if let Some(title) = req.title.as_deref().map(str::trim) {
        required("Title", title)?;
        title_changed = title != row.title;
        row.title = title.to_string();
    }
    if let Some(content) = req.content {
        required("Content", &content)?;
        row.content = content;
    }
    if let Some(excerpt) = req.excerpt {
        row.excerpt = excerpt;
    }
    if let Some(cover_image) = req.cover_image {
        row.cover_image = cover_image;
    }
    if let Some(status) = req.status {
        row.status = status;
    }

    match req.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(explicit) => {
            let slug = slug::resolve(Some(explicit), &row.title)
                .ok_or_else(|| AppError::BadRequest("Slug cannot be empty".into()))?;
            if posts::slug_taken(&tx, &slug, Some(id))? {
                return Err(AppError::BadRequest(format!("Slug {slug:?} already exists")));
            }
            row.slug = slug;
        }
        None if title_changed => {
            let base = slug::resolve(None, &row.title)
                .ok_or_else(|| AppError::BadRequest("Slug cannot be empty".into()))?;
            row.slug = unique_slug(&tx, base, Some(id))?;
        }
        None => {}
    }

    if let Some(ref categories) = req.categories {
        ensure_terms_exist(&tx, TermKind::Category, categories)?;
        terms::replace_for_post(&tx, TermKind::Category, id, categories)?;
    }
    if let Some(ref tags) = req.tags {
        ensure_terms_exist(&tx, TermKind::Tag, tags)?;
        terms::replace_for_post(&tx, TermKind::Tag, id, tags)?;
    }

    posts::update(&tx, &row)?;
    let row = posts::find(&tx, id)?.ok_or(AppError::NotFound("Post"))?;
    let post = posts::hydrate(&tx, row)?;
    tx.commit()?;

    Ok(ApiResponse::ok("Post updated", post))
}

/// DELETE /api/posts/{id}
async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<()>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let row = posts::find(&tx, id)?.ok_or(AppError::NotFound("Post"))?;
    if !user.owns_or_admin(row.author_id) {
        return Err(AppError::Forbidden("Only the author or an admin may delete this post"));
    }
    posts::soft_delete(&tx, id)?;
    tx.commit()?;

    tracing::info!("Post {} deleted by {}", id, user.username);
    Ok(ApiResponse::message("Post deleted"))
}
