pub mod auth;
pub mod comments;
pub mod misc;
pub mod posts;
pub mod terms;
pub mod users;

use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use axum::response::Response;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::response::error_response;
use crate::state::AppState;

/// Build the full application router. Every endpoint lives under `/api`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(posts::router())
        .merge(terms::router::<terms::Categories>())
        .merge(terms::router::<terms::Tags>())
        .merge(comments::router())
        .merge(misc::router())
        .method_not_allowed_fallback(method_not_allowed);

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86400))
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Route not found", None)
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", None)
}
