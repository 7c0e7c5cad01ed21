use std::borrow::Cow;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// The JSON body every endpoint returns.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Successful response wrapped in an [`Envelope`].
pub struct ApiResponse<T> {
    status: StatusCode,
    message: Cow<'static, str>,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn created(message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// A body with no `data` field.
    pub fn message(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            code: self.status.as_u16(),
            message: self.message,
            data: self.data,
            error: None,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Error body: `data` is omitted, `error` carries detail when there is any.
pub fn error_response(
    status: StatusCode,
    message: impl Into<Cow<'static, str>>,
    error: Option<String>,
) -> Response {
    let body: Envelope<()> = Envelope {
        code: status.as_u16(),
        message: message.into(),
        data: None,
        error,
    };
    (status, Json(body)).into_response()
}
