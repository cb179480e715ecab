use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use civitas_db::DbError;
use civitas_types::api::ErrorBody;

/// Every failure a handler can surface to a caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    /// The response generator failed. Safe for the caller to retry.
    #[error("{0}")]
    Upstream(String),

    /// The store is saturated or unreachable. Safe for the caller to retry.
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Conflict(_) => "conflict",
            ApiError::Authentication(_) => "authentication_failed",
            ApiError::Authorization(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// The unified "who are you" failure for login and bearer checks.
    pub fn bad_credentials() -> Self {
        ApiError::Authentication("invalid credentials".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = match &self {
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                // Don't leak details
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorBody {
            error: self.code().to_string(),
            detail,
        });
        (self.status(), body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::Conflict(_) => {
                let what = match err.conflicting_column() {
                    Some("phone_number") => "phone number is already registered",
                    Some("email") => "email is already registered",
                    _ => "record already exists",
                };
                ApiError::Conflict(what.into())
            }
            DbError::Unavailable(detail) => {
                warn!("Store unavailable: {}", detail);
                ApiError::ServiceUnavailable("service busy, retry later".into())
            }
            DbError::Corrupt(_) | DbError::Sqlite(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("spawn_blocking join error: {}", err))
    }
}
