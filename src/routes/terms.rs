//! Categories and tags. One set of handlers, instantiated per kind.

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use rusqlite::TransactionBehavior;
use serde::Deserialize;

use crate::db::models::{Term, TermWithCount};
use crate::db::terms::{self, NewTerm, TermKind};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, ApiJson, ApiPath};
use crate::response::ApiResponse;
use crate::slug;
use crate::state::AppState;

pub const NAME_MAX: usize = 50;
pub const DESCRIPTION_MAX: usize = 255;

/// Marker tying a set of routes to one term table.
pub trait TermResource: Send + Sync + 'static {
    const KIND: TermKind;
}

pub struct Categories;
pub struct Tags;

impl TermResource for Categories {
    const KIND: TermKind = TermKind::Category;
}

impl TermResource for Tags {
    const KIND: TermKind = TermKind::Tag;
}

pub fn router<K: TermResource>() -> Router<AppState> {
    let base = format!("/{}", K::KIND.table());
    Router::new()
        .route(&base, get(list::<K>).post(create::<K>))
        .route(&format!("{base}/hot"), get(hot::<K>))
        .route(
            &format!("{base}/{{id}}"),
            get(show::<K>).put(update::<K>).delete(remove::<K>),
        )
}

#[derive(Deserialize, Default)]
pub struct TermRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if name.chars().count() > NAME_MAX {
        return Err(AppError::BadRequest(format!(
            "Name must be at most {NAME_MAX} characters"
        )));
    }
    Ok(())
}

/// Blank descriptions are stored as NULL.
fn normalize_description(raw: &str) -> AppResult<Option<String>> {
    let description = raw.trim();
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(AppError::BadRequest(format!(
            "Description must be at most {DESCRIPTION_MAX} characters"
        )));
    }
    Ok((!description.is_empty()).then(|| description.to_string()))
}

async fn list<K: TermResource>(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<Term>>> {
    let conn = state.db.get()?;
    let items = terms::list(&conn, K::KIND)?;
    Ok(ApiResponse::ok(format!("{} list", K::KIND.label()), items))
}

async fn hot<K: TermResource>(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<TermWithCount>>> {
    let conn = state.db.get()?;
    let items = terms::hot(&conn, K::KIND, K::KIND.hot_limit())?;
    Ok(ApiResponse::ok(format!("Popular {}", K::KIND.table()), items))
}

async fn show<K: TermResource>(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<Term>> {
    let conn = state.db.get()?;
    let term = terms::find(&conn, K::KIND, id)?.ok_or(AppError::NotFound(K::KIND.label()))?;
    Ok(ApiResponse::ok(K::KIND.label(), term))
}

async fn create<K: TermResource>(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<TermRequest>,
) -> AppResult<ApiResponse<Term>> {
    let kind = K::KIND;
    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    validate_name(name)?;
    let slug = slug::resolve(req.slug.as_deref(), name)
        .ok_or_else(|| AppError::BadRequest("Slug cannot be empty".into()))?;
    let description = normalize_description(req.description.as_deref().unwrap_or_default())?;

    let conn = state.db.get()?;
    ensure_unique(&conn, kind, name, &slug, None)?;
    let term = terms::insert(
        &conn,
        kind,
        &NewTerm {
            name,
            slug: &slug,
            description: description.as_deref(),
        },
    )?;

    tracing::info!(
        "{} {:?} created by {}",
        kind.label(),
        term.name,
        admin.username
    );
    Ok(ApiResponse::created(format!("{} created", kind.label()), term))
}

async fn update<K: TermResource>(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<TermRequest>,
) -> AppResult<ApiResponse<Term>> {
    let kind = K::KIND;
    let conn = state.db.get()?;
    let mut term = terms::find(&conn, kind, id)?.ok_or(AppError::NotFound(kind.label()))?;

    let mut name_changed = false;
    if let Some(name) = req.name.as_deref().map(str::trim) {
        validate_name(name)?;
        name_changed = name != term.name;
        term.name = name.to_string();
    }

    let explicit_slug = req.slug.as_deref().filter(|s| !s.trim().is_empty());
    if explicit_slug.is_some() || name_changed {
        term.slug = slug::resolve(explicit_slug, &term.name)
            .ok_or_else(|| AppError::BadRequest("Slug cannot be empty".into()))?;
    }

    if let Some(description) = req.description.as_deref() {
        term.description = normalize_description(description)?;
    }

    ensure_unique(&conn, kind, &term.name, &term.slug, Some(id))?;
    terms::update(&conn, kind, &term)?;

    let term = terms::find(&conn, kind, id)?.ok_or(AppError::NotFound(kind.label()))?;
    Ok(ApiResponse::ok(format!("{} updated", kind.label()), term))
}

async fn remove<K: TermResource>(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<ApiResponse<()>> {
    let kind = K::KIND;
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    terms::find(&tx, kind, id)?.ok_or(AppError::NotFound(kind.label()))?;
    terms::soft_delete(&tx, kind, id)?;
    tx.commit()?;

    tracing::info!("{} {} deleted by {}", kind.label(), id, admin.username);
    Ok(ApiResponse::message(format!("{} deleted", kind.label())))
}

fn ensure_unique(
    conn: &rusqlite::Connection,
    kind: TermKind,
    name: &str,
    slug: &str,
    exclude_id: Option<i64>,
) -> AppResult<()> {
    if terms::name_taken(conn, kind, name, exclude_id)? {
        return Err(AppError::BadRequest(format!(
            "{} name {:?} already exists",
            kind.label(),
            name
        )));
    }
    if terms::slug_taken(conn, kind, slug, exclude_id)? {
        return Err(AppError::BadRequest(format!(
            "{} slug {:?} already exists",
            kind.label(),
            slug
        )));
    }
    Ok(())
}
