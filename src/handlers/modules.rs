// ---------------------------------------------------------------------------
// handlers/modules.rs: Module registry endpoints
// ---------------------------------------------------------------------------

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::modules::{DependencyReport, ModuleCategory, ModuleDescriptor, RouteEntry};
use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// GET /api/modules[?category=]
pub async fn list_modules(
    State(state): State<AppState>,
    Query(q): Query<CategoryQuery>,
) -> Result<Json<Vec<ModuleDescriptor>>, ApiError> {
    let modules = match q.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => {
            let category = ModuleCategory::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown module category '{}'", raw)))?;
            state.modules.modules_by_category(category)
        }
        None => state.modules.all_modules(),
    };
    Ok(Json(modules))
}

/// GET /api/modules/enabled
pub async fn list_enabled_modules(State(state): State<AppState>) -> Json<Vec<ModuleDescriptor>> {
    Json(state.modules.enabled_modules())
}

/// GET /api/modules/routes: routes of enabled modules only.
pub async fn list_module_routes(State(state): State<AppState>) -> impl IntoResponse {
    let routes: Vec<RouteEntry> = state.modules.all_routes();
    (
        [(axum::http::header::CACHE_CONTROL, "no-cache")],
        Json(routes),
    )
}

// ---------------------------------------------------------------------------
// Single module
// ---------------------------------------------------------------------------

pub async fn get_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModuleDescriptor>, ApiError> {
    state
        .modules
        .get_module(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Module '{}' is not registered", id)))
}

pub async fn check_module_dependencies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<DependencyReport> {
    Json(state.modules.check_dependencies(&id))
}

/// POST /api/modules/{id}/toggle: admin-guarded when ADMIN_TOKEN is set.
pub async fn toggle_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ToggleRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.modules.toggle_module(&id, body.enabled) {
        return Err(ApiError::NotFound(format!("Module '{}' is not registered", id)));
    }

    // Dependents of a disabled module are reported, not cascaded.
    let broken: Vec<String> = state
        .modules
        .all_modules()
        .into_iter()
        .filter(|m| m.enabled && m.dependencies.iter().any(|d| d == &id))
        .filter(|m| !state.modules.check_dependencies(&m.id).satisfied)
        .map(|m| m.id)
        .collect();

    Ok(Json(json!({
        "id": id,
        "enabled": body.enabled,
        "unsatisfiedDependents": broken,
    })))
}
