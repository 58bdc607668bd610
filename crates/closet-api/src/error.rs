use axum::{
    Json,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Upper bound when re-reading a framework rejection body.
const REJECTION_BODY_LIMIT: usize = 16 * 1024;

const INTERNAL_MESSAGE: &str = "internal server error";

/// Error type returned by every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input. HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// Missing identity or bad credentials. HTTP 401.
    #[error("{0}")]
    Unauthorized(String),

    /// Acting user is not the owner/author/participant. HTTP 403.
    #[error("{0}")]
    Forbidden(String),

    /// HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate resource. HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// HTTP 413.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Anything unanticipated. Logged, never shown to the caller. HTTP 500.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error envelope. `path` is filled in by [`normalize_errors`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ErrorBody {
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message,
            path: String::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody::new(status, message);
        let mut response = (status, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

/// Outermost layer: stamps the request path into handler errors and
/// rewrites plain-text framework rejections (bad JSON, bad path params,
/// unknown routes, body limits) into the same JSON envelope.
pub async fn normalize_errors(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let mut response = next.run(req).await;
    let status = response.status();

    if let Some(mut body) = response.extensions_mut().remove::<ErrorBody>() {
        body.path = path;
        return (status, Json(body)).into_response();
    }

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    let status = rejection_status(status);

    let message = if status.is_server_error() {
        INTERNAL_MESSAGE.to_string()
    } else {
        let bytes = axum::body::to_bytes(response.into_body(), REJECTION_BODY_LIMIT)
            .await
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if text.is_empty() {
            status.canonical_reason().unwrap_or("Unknown").to_string()
        } else {
            text
        }
    };

    let mut body = ErrorBody::new(status, message);
    body.path = path;
    (status, Json(body)).into_response()
}

/// Body deserialization failures (type mismatch, unknown field) are bad
/// input like any other; axum reports them as 422.
fn rejection_status(status: StatusCode) -> StatusCode {
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        StatusCode::BAD_REQUEST
    } else {
        status
    }
}
