//! HTTP boundary of the call gateway.
//!
//! `POST /api/mcp/call` validates the request the same way the gateway does
//! (so clients get precise status codes), enforces bearer auth for services
//! that require it, then delegates to [`McpServiceManager::call_service`].
//! `GET /api/mcp/call[?service=]` reports registration and rate-limit state.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::client::{ErrorKind, GatewayError, McpRequest};
use crate::auth::bearer_token;
use crate::handlers::ApiError;
use crate::models::{McpCallBody, McpCallResult};
use crate::state::AppState;

/// POST /api/mcp/call
pub async fn mcp_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<McpCallBody>,
) -> Result<Response, ApiError> {
    let (service, method) = match (non_empty(body.service), non_empty(body.method)) {
        (Some(s), Some(m)) => (s, m),
        _ => {
            return Err(ApiError::BadRequest(
                "Service name and method are required".to_string(),
            ));
        }
    };

    let descriptor = state
        .services
        .get_service(&service)
        .ok_or_else(|| ApiError::NotFound(format!("Service '{}' does not exist", service)))?;

    if !descriptor.supports(&method) {
        return Err(ApiError::BadRequest(
            GatewayError::MethodNotSupported {
                service: service.clone(),
                method: method.clone(),
            }
            .to_string(),
        ));
    }

    if descriptor.auth_required && bearer_token(&headers).is_none() {
        return Err(ApiError::Unauthorized(format!(
            "Service '{}' requires authentication",
            service
        )));
    }

    let result = state
        .services
        .call_service(McpRequest::new(&service, &method, body.params).with_module(body.module))
        .await;

    if !result.success {
        let message = result
            .error
            .unwrap_or_else(|| "Service call failed".to_string());
        if result.code == Some(ErrorKind::RateLimited) {
            return Err(ApiError::RateLimited(message));
        }
        tracing::warn!(service = %service, method = %method, request_id = %result.request_id, "MCP call failed: {}", message);
        let body = json!({
            "error": message,
            "code": result.code,
            "requestId": result.request_id,
        });
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
    }

    Ok(Json(McpCallResult {
        success: true,
        data: result.data.unwrap_or_default(),
        request_id: result.request_id,
        timestamp: result.timestamp,
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub service: Option<String>,
}

/// GET /api/mcp/call
pub async fn mcp_status(State(state): State<AppState>, Query(q): Query<StatusQuery>) -> Response {
    match non_empty(q.service) {
        Some(name) => Json(state.services.get_service_status(&name)).into_response(),
        None => Json(state.services.all_services_status()).into_response(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
