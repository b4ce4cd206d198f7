//! The single typed error surfaced across every component.
//!
//! Internal library errors convert into the closest matching variant via
//! `#[from]`; call sites that know better construct a specific variant
//! directly (e.g. archive extraction maps a `zip::result::ZipError` into
//! `AppError::Extraction` with a human-readable message, not `Internal`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("upload too large")]
    TooLarge,

    #[error("{0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    Extraction(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Extraction(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// JSON rendering is the default — HTML callers get a plain status-line
/// fallback rendered inline by the admin routes (see `admin::routes::common`),
/// since the templated dashboard layout is out of scope (spec.md §1).
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_)) {
            tracing::error!(err = %self, "internal error");
        }
        let status = self.status_code();
        let body = Json(json!({ "error": self.message() }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(anyhow::anyhow!(e))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(anyhow::anyhow!(e))
    }
}
