// ---------------------------------------------------------------------------
// handlers/: system (health) and module registry endpoints.
// MCP and OAuth endpoints live next to their subsystems (mcp::server, oauth).
// ---------------------------------------------------------------------------

pub(crate) mod modules;
pub(crate) mod system;

pub use modules::{
    check_module_dependencies, get_module, list_enabled_modules, list_module_routes, list_modules,
    toggle_module,
};
pub use system::{health, readiness};

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Centralized API error type for all JSON handlers.
/// Logs full details server-side and returns
/// `{ "error": "<message>", "code": "<CODE>", "requestId": "<uuid>" }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable error code string for each variant.
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::RateLimited(_) => "RATE_LIMITED",
            ApiError::Upstream(_) => "TRANSPORT_ERROR",
            ApiError::Internal(_) => "UNKNOWN",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients. Internal errors are replaced by a
    /// generic text; everything else is already user-facing.
    fn sanitized_message(&self) -> String {
        match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Unauthorized(m)
            | ApiError::RateLimited(m)
            | ApiError::Upstream(m) => m.clone(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let request_id = Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(request_id = %request_id, code = self.error_code(), "API error ({}): {}", status.as_u16(), self);
        } else {
            tracing::warn!(request_id = %request_id, code = self.error_code(), "API error ({}): {}", status.as_u16(), self);
        }

        let body = json!({
            "error": self.sanitized_message(),
            "code": self.error_code(),
            "requestId": request_id,
        });
        (status, Json(body)).into_response()
    }
}
