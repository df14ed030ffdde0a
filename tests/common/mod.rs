// Shared helpers for integration tests: fake upstreams on ephemeral ports and
// an AppState wired to them.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};

use swapgate_backend::config::AppConfig;
use swapgate_backend::state::AppState;

/// Serve `router` on 127.0.0.1 with an OS-assigned port; returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Collect a response body into a serde_json::Value.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ── Fake MCP upstream ───────────────────────────────────────────────────
//
// POST /mcp/{service}/{method}
//   method "fail"    → 500
//   method "garbage" → 200 with a non-JSON body
//   params.delay_ms  → sleep before answering
//   otherwise        → {"result": {service, method, params, module, requestId, version}}

#[derive(Clone, Default)]
pub struct Upstream {
    pub hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn upstream_call(
    State(upstream): State<Upstream>,
    Path((service, method)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    upstream.hits.fetch_add(1, Ordering::SeqCst);

    if let Some(ms) = body["params"]["delay_ms"].as_u64() {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    match method.as_str() {
        "fail" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "garbage" => (StatusCode::OK, "<html>").into_response(),
        _ => {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            Json(json!({
                "result": {
                    "service": service,
                    "method": method,
                    "params": body["params"],
                    "module": body["module"],
                    "bodyRequestId": body["requestId"],
                    "requestId": header("x-request-id"),
                    "version": header("x-service-version"),
                }
            }))
            .into_response()
        }
    }
}

/// Returns the upstream's base URL (to be used as a service `baseUrl`).
pub async fn spawn_upstream() -> (String, Upstream) {
    let upstream = Upstream::default();
    let router = Router::new()
        .route("/mcp/{service}/{method}", post(upstream_call))
        .with_state(upstream.clone());
    (spawn_server(router).await, upstream)
}

// ── Fake OAuth provider ─────────────────────────────────────────────────
//
// POST /token    code "bad" or refresh token "revoked" → 400
// GET  /userinfo requires `Authorization: Bearer access-*`

async fn provider_token(Form(form): Form<HashMap<String, String>>) -> axum::response::Response {
    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            if form.get("code").map(String::as_str) == Some("bad") {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response();
            }
            Json(json!({
                "access_token": format!("access-{}", form.get("code").cloned().unwrap_or_default()),
                "refresh_token": "refresh-1",
                "expires_in": 3600,
                "redirect_uri_seen": form.get("redirect_uri"),
            }))
            .into_response()
        }
        Some("refresh_token") => {
            if form.get("refresh_token").map(String::as_str) == Some("revoked") {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response();
            }
            Json(json!({
                "access_token": "access-refreshed",
                "expires_in": 1800,
                "token_type": "Bearer",
            }))
            .into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn provider_userinfo(headers: HeaderMap) -> axum::response::Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer access-"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "id": 1001,
        "email": "trader@example.com",
        "name": "Trader",
        "picture": "https://example.com/a.png",
        "wallet_address": "0xabc",
        "permissions": ["swap:execute", "read:wallet"],
    }))
    .into_response()
}

pub async fn spawn_provider() -> String {
    let router = Router::new()
        .route("/token", post(provider_token))
        .route("/userinfo", get(provider_userinfo));
    spawn_server(router).await
}

// ── App state ───────────────────────────────────────────────────────────

pub fn test_config(upstream_url: &str, provider_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream_url = upstream_url.to_string();
    config.oauth.provider_url = provider_url.to_string();
    config
}

/// Fully bootstrapped state (default services + built-in modules).
pub fn test_state(upstream_url: &str, provider_url: &str) -> AppState {
    AppState::new(test_config(upstream_url, provider_url))
}

/// State whose upstream and provider point at a closed port.
pub fn offline_state() -> AppState {
    test_state("http://127.0.0.1:9/api", "http://127.0.0.1:9")
}
