use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use mystery_types::api::ApiResponse;

/// Every handler failure. Rendered as `{ success: false, message }` with
/// the matching status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthenticated,

    /// Sign-in refused; the message says why.
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The client only sees `context`; `cause` goes to the log.
    #[error("{context}")]
    Internal {
        context: &'static str,
        cause: anyhow::Error,
    },
}

impl ApiError {
    /// `map_err` adapter turning any error into `Internal` with a fixed
    /// client-facing message.
    pub fn internal<E: Into<anyhow::Error>>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |e| Self::Internal {
            context,
            cause: e.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal { context, cause } = &self {
            error!("{}: {:#}", context, cause);
        }
        (self.status(), Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
