pub mod auth;
pub mod config;
pub mod handlers;
pub mod ids;
pub mod mcp;
pub mod models;
pub mod modules;
pub mod oauth;
pub mod session;
pub mod state;
pub mod watchdog;

use axum::routing::{get, post};
use axum::{middleware, Router};

use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    // Registry mutations sit behind ADMIN_TOKEN (open when unset).
    let admin = Router::new()
        .route("/api/modules/{id}/toggle", post(handlers::toggle_module))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        // MCP call gateway
        .route("/api/mcp/call", post(mcp::server::mcp_call).get(mcp::server::mcp_status))
        // OAuth redirect flow
        .route("/api/oauth/authorize", post(oauth::oauth_authorize))
        .route("/api/oauth/callback", get(oauth::oauth_callback))
        .route("/api/oauth/refresh", post(oauth::oauth_refresh))
        // Module registry
        .route("/api/modules", get(handlers::list_modules))
        .route("/api/modules/enabled", get(handlers::list_enabled_modules))
        .route("/api/modules/routes", get(handlers::list_module_routes))
        .route("/api/modules/{id}", get(handlers::get_module))
        .route("/api/modules/{id}/dependencies", get(handlers::check_module_dependencies))
        .merge(admin)
        // Shared state
        .with_state(state)
}
