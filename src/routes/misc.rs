use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::db::models::{ArchiveMonth, Post, PostStatus, TermWithCount};
use crate::db::posts::{self, PostFilter, PostOrder};
use crate::db::terms::{self, TermKind};
use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::state::AppState;

const HOME_POST_LIMIT: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/home", get(home))
        .route("/archive", get(archive))
}

#[derive(Serialize)]
pub struct HomePage {
    pub latest_posts: Vec<Post>,
    pub hot_posts: Vec<Post>,
    pub hot_categories: Vec<TermWithCount>,
    pub hot_tags: Vec<TermWithCount>,
}

/// GET /api/home
async fn home(State(state): State<AppState>) -> AppResult<ApiResponse<HomePage>> {
    let published = PostFilter {
        status: Some(PostStatus::Published),
        ..PostFilter::default()
    };

    let conn = state.db.get()?;
    let page = HomePage {
        latest_posts: posts::list(&conn, &published, PostOrder::Newest, HOME_POST_LIMIT, 0)?,
        hot_posts: posts::list(&conn, &published, PostOrder::MostViewed, HOME_POST_LIMIT, 0)?,
        hot_categories: terms::hot(&conn, TermKind::Category, TermKind::Category.hot_limit())?,
        hot_tags: terms::hot(&conn, TermKind::Tag, TermKind::Tag.hot_limit())?,
    };
    Ok(ApiResponse::ok("Home page", page))
}

/// GET /api/archive
async fn archive(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<ArchiveMonth>>> {
    let conn = state.db.get()?;
    let months = posts::archive(&conn)?;
    Ok(ApiResponse::ok("Archive", months))
}
