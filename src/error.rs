use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::RepositoryError;
use crate::state::AppState;
use crate::storage::AssetError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("Asset service error: {0}")]
    AssetService(AssetError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "ValidationError",
            AppError::NotFound(_) => "NotFoundError",
            AppError::Conflict(_) => "ConflictError",
            AppError::Authentication(_) => "AuthenticationError",
            AppError::Authorization(_) => "AuthorizationError",
            AppError::AssetService(_) => "AssetServiceError",
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) | AppError::Json(_) => {
                "InternalError"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::AssetService(_)
            | AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Internal(_)
            | AppError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show any caller.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Authentication(msg)
            | AppError::Authorization(msg) => msg.clone(),
            AppError::AssetService(_) => "Image storage failed".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    fn is_server_fault(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => {
                tracing::debug!("Unique constraint rejected write: {}", msg);
                AppError::Conflict("A record with the same unique value already exists".into())
            }
            RepositoryError::Database(e) => AppError::Pool(e),
            RepositoryError::Sql(e) => AppError::Database(e),
            RepositoryError::Serialization(e) => AppError::Json(e),
        }
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::UnsupportedType(_) | AssetError::TooLarge { .. } | AssetError::InvalidId(_) => {
                AppError::Validation(err.to_string())
            }
            AssetError::Io(_) | AssetError::Unavailable(_) => AppError::AssetService(err),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Internal error text attached to a response so the detail layer can
/// decide whether the caller may see it.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.public_message();

        if self.is_server_fault() {
            tracing::error!("{}: {}", kind, self);
        }

        let mut response = (
            status,
            Json(json!({
                "success": false,
                "kind": kind,
                "message": message,
            })),
        )
            .into_response();

        if self.is_server_fault() {
            response.extensions_mut().insert(ErrorDetail {
                kind,
                message,
                detail: self.to_string(),
            });
        }

        response
    }
}

/// Middleware: in development, re-render server errors with their
/// internal detail. Production responses are passed through untouched.
pub async fn expose_error_details(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    if !state.config.is_development() {
        return response;
    }

    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(detail) => (
            response.status(),
            Json(json!({
                "success": false,
                "kind": detail.kind,
                "message": detail.message,
                "detail": detail.detail,
            })),
        )
            .into_response(),
        None => response,
    }
}

pub type AppResult<T> = Result<T, AppError>;
