use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rusqlite::ErrorCode;

use crate::response::error_response;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::NotFound(_) => error_response(StatusCode::NOT_FOUND, self.to_string(), None),
            AppError::Unauthorized(msg) => error_response(StatusCode::UNAUTHORIZED, *msg, None),
            AppError::Forbidden(msg) => error_response(StatusCode::FORBIDDEN, *msg, None),
            AppError::BadRequest(msg) => {
                error_response(StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::Database(e) if is_constraint_violation(e) => {
                tracing::warn!("Constraint violation: {}", e);
                error_response(
                    StatusCode::BAD_REQUEST,
                    "Conflicts with an existing record",
                    Some(e.to_string()),
                )
            }
            _ => {
                tracing::error!("{}", self);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    Some(self.to_string()),
                )
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
