// SwapGate - Health endpoint integration test
//
// AppState::new() needs no external services, so these run against the real
// router with the default service table and built-in modules.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{body_json, offline_state};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_starting_until_ready() {
    let state = offline_state();
    let router = swapgate_backend::create_router(state.clone());

    let json = body_json(router.clone().oneshot(get("/api/health")).await.unwrap()).await;
    assert_eq!(json["status"], "starting");

    state.mark_ready();
    let response = router.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["app"], "SwapGate");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["services"], 4);
    assert_eq!(json["modules"], 3);
    assert_eq!(json["in_flight_calls"], 0);
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn readiness_is_503_before_ready() {
    let state = offline_state();
    let router = swapgate_backend::create_router(state.clone());

    let response = router.clone().oneshot(get("/api/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["ready"], false);

    state.mark_ready();
    let response = router.oneshot(get("/api/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn nonexistent_route_returns_404() {
    let response = swapgate_backend::create_router(offline_state())
        .oneshot(get("/api/does-not-exist"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
