//! Maps core and auth errors onto HTTP responses.

use api_shared::auth::AuthError;
use api_shared::dto::ErrorRes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use hmis_core::HmisError;

/// Error type returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<HmisError> for ApiError {
    fn from(err: HmisError) -> Self {
        let status = match &err {
            HmisError::InvalidInput(_) | HmisError::InvalidEnum { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            HmisError::NotFound { .. } => StatusCode::NOT_FOUND,
            HmisError::Duplicate { .. } => StatusCode::CONFLICT,
            _ => {
                tracing::error!("internal error: {err}");
                return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
            }
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential | AuthError::UnknownCredential => {
                ApiError::new(StatusCode::UNAUTHORIZED, err.to_string())
            }
            AuthError::Forbidden(_) => ApiError::new(StatusCode::FORBIDDEN, err.to_string()),
            AuthError::Internal(inner) => inner.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorRes {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
