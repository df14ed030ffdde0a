// ---------------------------------------------------------------------------
// handlers/system.rs: Health and readiness
// ---------------------------------------------------------------------------

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::HealthResponse;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.is_ready() { "ok" } else { "starting" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app: "SwapGate".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        services: state.services.service_count(),
        modules: state.modules.len(),
        in_flight_calls: state.services.in_flight_count(),
    })
}

/// GET /api/health/ready: lightweight readiness probe.
pub async fn readiness(State(state): State<AppState>) -> axum::response::Response {
    let ready = state.is_ready();
    let body = json!({ "ready": ready, "uptime_seconds": state.start_time.elapsed().as_secs() });

    if ready {
        (StatusCode::OK, Json(body)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}
