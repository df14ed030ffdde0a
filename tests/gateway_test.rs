// Call gateway against a fake upstream: dedup, rate limiting, timeouts and
// response normalization.

mod common;

use std::time::Duration;

use reqwest::Client;
use serde_json::json;

use swapgate_backend::mcp::{ErrorKind, McpRequest, McpServiceManager, RateLimitPolicy, ServiceDescriptor};

use common::spawn_upstream;

fn manager_with(descriptor: ServiceDescriptor) -> McpServiceManager {
    let manager = McpServiceManager::new(Client::new());
    manager.register_service(descriptor);
    manager
}

fn swap_service(base: &str) -> ServiceDescriptor {
    ServiceDescriptor::new("swap", base, &["getTokens", "getRates", "fail", "garbage"])
        .with_version("2.1.0")
}

#[tokio::test]
async fn identical_concurrent_calls_share_one_request() {
    let (base, upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let params = json!({ "delay_ms": 150, "pair": "ETH/USDC" });
    let calls = (0..5).map(|_| manager.call_service(McpRequest::new("swap", "getRates", params.clone())));
    let results = futures_util::future::join_all(calls).await;

    assert_eq!(upstream.hits(), 1);
    assert!(results.iter().all(|r| r.success));
    let first_id = &results[0].request_id;
    assert!(results.iter().all(|r| &r.request_id == first_id));
    assert_eq!(manager.in_flight_count(), 0);
}

#[tokio::test]
async fn different_params_are_separate_calls() {
    let (base, upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let a = manager.call_service(McpRequest::new("swap", "getRates", json!({ "delay_ms": 50, "pair": "A" })));
    let b = manager.call_service(McpRequest::new("swap", "getRates", json!({ "delay_ms": 50, "pair": "B" })));
    let (a, b) = tokio::join!(a, b);

    assert!(a.success && b.success);
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn sequential_identical_calls_are_not_cached() {
    let (base, upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    for _ in 0..3 {
        let r = manager.call_service(McpRequest::new("swap", "getTokens", json!({}))).await;
        assert!(r.success);
    }
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn rate_limit_rejects_after_quota() {
    let (base, upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base).with_rate_limit(RateLimitPolicy::per_minute(3)));

    for i in 0..3 {
        let r = manager
            .call_service(McpRequest::new("swap", "getTokens", json!({ "i": i })))
            .await;
        assert!(r.success, "call {} should pass", i);
    }

    let rejected = manager
        .call_service(McpRequest::new("swap", "getTokens", json!({ "i": 3 })))
        .await;
    assert!(!rejected.success);
    assert_eq!(rejected.code, Some(ErrorKind::RateLimited));
    assert_eq!(upstream.hits(), 3);

    let status = manager.get_service_status("swap").rate_limit_status.unwrap();
    assert_eq!(status.count, 3);
    assert_eq!(status.limit, 3);
}

#[tokio::test]
async fn rate_limit_window_resets() {
    let (base, _upstream) = spawn_upstream().await;
    let policy = RateLimitPolicy { requests: 1, window_ms: 100 };
    let manager = manager_with(swap_service(&base).with_rate_limit(policy));

    let m = &manager;
    let call = move |i: u32| m.call_service(McpRequest::new("swap", "getTokens", json!({ "i": i })));

    assert!(call(0).await.success);
    assert_eq!(call(1).await.code, Some(ErrorKind::RateLimited));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(call(2).await.success);
}

#[tokio::test]
async fn joined_calls_do_not_consume_quota() {
    let (base, upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base).with_rate_limit(RateLimitPolicy::per_minute(1)));

    let params = json!({ "delay_ms": 100 });
    let (a, b) = tokio::join!(
        manager.call_service(McpRequest::new("swap", "getTokens", params.clone())),
        manager.call_service(McpRequest::new("swap", "getTokens", params.clone())),
    );
    assert!(a.success && b.success);
    assert_eq!(upstream.hits(), 1);
    assert_eq!(manager.get_service_status("swap").rate_limit_status.unwrap().count, 1);
}

#[tokio::test]
async fn unsupported_method_never_reaches_upstream() {
    let (base, upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let r = manager.call_service(McpRequest::new("swap", "drainWallet", json!({}))).await;
    assert!(!r.success);
    assert_eq!(r.code, Some(ErrorKind::Unsupported));
    let msg = r.error.unwrap();
    assert!(msg.contains("drainWallet") && msg.contains("swap"));
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn wire_format_carries_headers_and_body() {
    let (base, _upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let r = manager
        .call_service(
            McpRequest::new("swap", "getTokens", json!({ "chain": 1 })).with_module(Some("defi".to_string())),
        )
        .await;
    assert!(r.success);
    let data = r.data.unwrap();
    assert_eq!(data["service"], "swap");
    assert_eq!(data["method"], "getTokens");
    assert_eq!(data["params"], json!({ "chain": 1 }));
    assert_eq!(data["module"], "defi");
    assert_eq!(data["version"], "2.1.0");
    assert_eq!(data["requestId"], r.request_id.as_str());
    assert_eq!(data["bodyRequestId"], r.request_id.as_str());
}

#[tokio::test]
async fn upstream_error_status_is_transport_error() {
    let (base, _upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let r = manager.call_service(McpRequest::new("swap", "fail", json!({}))).await;
    assert!(!r.success);
    assert_eq!(r.code, Some(ErrorKind::TransportError));
    assert_eq!(r.error.as_deref(), Some("HTTP 500: Internal Server Error"));
}

#[tokio::test]
async fn invalid_json_is_unknown_error() {
    let (base, _upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let r = manager.call_service(McpRequest::new("swap", "garbage", json!({}))).await;
    assert!(!r.success);
    assert_eq!(r.code, Some(ErrorKind::Unknown));
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let (base, _upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let r = manager
        .call_service(
            McpRequest::new("swap", "getTokens", json!({ "delay_ms": 1000 }))
                .with_timeout(Duration::from_millis(50)),
        )
        .await;
    assert!(!r.success);
    assert_eq!(r.code, Some(ErrorKind::Timeout));
    assert_eq!(manager.in_flight_count(), 0);
}

#[tokio::test]
async fn unreachable_upstream_is_transport_error() {
    let manager = manager_with(swap_service("http://127.0.0.1:9"));
    let r = manager.call_service(McpRequest::new("swap", "getTokens", json!({}))).await;
    assert!(!r.success);
    assert_eq!(r.code, Some(ErrorKind::TransportError));
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    let (base, _upstream) = spawn_upstream().await;
    let manager = manager_with(swap_service(&base));

    let results = manager
        .call_services(vec![
            McpRequest::new("swap", "getTokens", json!({ "n": 1 })),
            McpRequest::new("swap", "fail", json!({})),
            McpRequest::new("ghost", "getTokens", json!({})),
            McpRequest::new("swap", "getRates", json!({ "n": 2 })),
        ])
        .await;

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].data.as_ref().unwrap()["method"], "getTokens");
    assert_eq!(results[1].code, Some(ErrorKind::TransportError));
    assert_eq!(results[2].code, Some(ErrorKind::NotFound));
    assert_eq!(results[3].data.as_ref().unwrap()["params"]["n"], 2);
}
