//! Application error types.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::menu::MenuError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Menu(#[from] MenuError),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Wire shape of every failure.
#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Menu(e) => match e {
                MenuError::NotFound { .. } => StatusCode::NOT_FOUND,
                MenuError::InvalidReference { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                MenuError::InvalidHierarchy(_) => StatusCode::CONFLICT,
                MenuError::Validation(_) => StatusCode::BAD_REQUEST,
                MenuError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Menu(MenuError::Storage(_)) | AppError::Internal(_) => "Internal",
            AppError::Menu(e) => e.kind(),
            AppError::Unauthorized => "Unauthorized",
            AppError::Forbidden => "Forbidden",
            AppError::BadRequest(_) => "BadRequest",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Infrastructure details stay in the log.
        let message = match &self {
            AppError::Internal(e) | AppError::Menu(MenuError::Storage(e)) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            _ => {
                tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
                self.to_string()
            }
        };

        let body = ErrorBody {
            kind: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
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

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
